//! Process control blocks, the fixed-capacity process table, and the
//! round-robin scheduler. This kernel is single-hart and non-preemptive, so
//! there is exactly one process table, no locks, and no per-CPU indirection:
//! `current()` just names the slot the last `yield_now()` switched into.

pub mod context;

use crate::alloc::alloc_pages;
use crate::config::{KERNEL_STACK_SIZE, PROCS_MAX, USER_BASE, VIRTIO_BLK_PADDR};
use crate::kernel_panic;
use crate::memory_layout::{free_ram_end, kernel_base};
use crate::paging::{self, KERNEL_DATA, KERNEL_TEXT, USER_RWX};

use self::context::user_entry;

/// A process's lifecycle: an `Unused` slot holds no live resources,
/// `Runnable` slots compete for the CPU, and `Exited` slots are left in
/// place forever. This kernel never recycles a process control block once
/// it has held an exited process; there is no dynamic reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Unused,
    Runnable,
    Exited,
}

/// One process control block, embedding its own kernel stack. `pid == 0`
/// marks an unused slot; `pid == -1` is reserved for the idle process;
/// positive pids are `slot_index + 1`, assigned once at creation and never
/// reused.
#[repr(C)]
pub struct Process {
    pub pid: i32,
    pub state: ProcessState,
    pub sp: u32,
    pub page_table: u32,
    pub stack: [u8; KERNEL_STACK_SIZE],
}

impl Process {
    const fn unused() -> Self {
        Self {
            pid: 0,
            state: ProcessState::Unused,
            sp: 0,
            page_table: 0,
            stack: [0; KERNEL_STACK_SIZE],
        }
    }

    /// Address one past the end of this process's kernel stack: the value
    /// loaded into `sscratch` so the trap vector's first instruction finds
    /// the right stack no matter which process was running.
    fn stack_top(&self) -> u32 {
        self.stack.as_ptr() as u32 + KERNEL_STACK_SIZE as u32
    }
}

static mut PROCS: [Process; PROCS_MAX] = [const { Process::unused() }; PROCS_MAX];
static mut CURRENT: usize = 0;
static mut IDLE: usize = 0;

/// Returns a mutable reference to the process table slot backing `pid`,
/// panicking if asked for a pid that was never assigned. Only used
/// internally; callers work through [`current`] and [`yield_now`].
fn slot_mut(index: usize) -> &'static mut Process {
    unsafe { &mut PROCS[index] }
}

/// The process the scheduler most recently switched into.
pub fn current() -> &'static mut Process {
    unsafe { slot_mut(CURRENT) }
}

/// Finds an unused process table slot, builds a fresh address space for it
/// (kernel identity map + virtio MMIO + the user image), and arranges for
/// its first context switch to land in [`context::user_entry`], which in
/// turn drops to U-mode at `USER_BASE`. `image` is the flat, already
/// position-independent user binary to copy in page by page; an empty
/// image (used for the idle process) maps nothing at `USER_BASE`.
///
/// Panics if every slot is already in use. There is no way to recover from
/// exhausting the fixed-size process table.
pub fn create_process(image: &[u8]) -> &'static mut Process {
    let index = unsafe { PROCS.iter().position(|p| p.state == ProcessState::Unused) };
    let Some(index) = index else {
        kernel_panic!("no free process slots");
    };

    let proc = slot_mut(index);

    // Lay out the initial callee-saved register frame switch_context()
    // expects to pop: ra = user_entry, s0..s11 = 0. The stack grows down,
    // so this sits at the very top of the process's kernel stack.
    let mut sp = proc.stack_top();
    sp -= 4 * 13;
    let frame = sp as *mut u32;
    unsafe {
        frame.add(0).write(user_entry as usize as u32); // ra
        for i in 1..13 {
            frame.add(i).write(0); // s0..s11
        }
    }

    let page_table = alloc_pages(1);

    // Identity-map the kernel image and the bump allocator's free-RAM
    // window, R/W/X, so the kernel can still run and allocate after this
    // process's address space becomes active.
    let mut paddr = kernel_base();
    while paddr < free_ram_end() {
        paging::map_page(page_table, paddr, paddr, KERNEL_TEXT | KERNEL_DATA)
            .unwrap_or_else(|e| kernel_panic!("{}", e));
        paddr += 4096;
    }

    // The virtio-blk MMIO page, so trap handlers running under this
    // process's page table can still poke the device.
    paging::map_page(page_table, VIRTIO_BLK_PADDR, VIRTIO_BLK_PADDR, KERNEL_DATA)
        .unwrap_or_else(|e| kernel_panic!("{}", e));

    // Copy the user image in page by page; sharing physical pages across
    // processes running the same binary would defeat address-space
    // isolation, so every process gets its own copy.
    let mut off = 0usize;
    while off < image.len() {
        let page = alloc_pages(1);
        let remaining = image.len() - off;
        let copy_len = remaining.min(4096);
        unsafe {
            core::ptr::copy_nonoverlapping(image.as_ptr().add(off), page as *mut u8, copy_len);
        }
        paging::map_page(page_table, USER_BASE + off as u32, page, USER_RWX)
            .unwrap_or_else(|e| kernel_panic!("{}", e));
        off += 4096;
    }

    proc.pid = index as i32 + 1;
    proc.state = ProcessState::Runnable;
    proc.sp = sp;
    proc.page_table = page_table;
    proc
}

/// Creates the idle process: an empty image, then overrides its pid to the
/// reserved `-1` so [`yield_now`]'s `pid > 0` filter never selects it and
/// `current()` points at it until the first real switch. Must be called
/// exactly once, before the first [`yield_now`].
pub fn init_idle() -> &'static mut Process {
    let idle = create_process(&[]);
    idle.pid = -1;
    let index = index_of(idle);
    unsafe {
        IDLE = index;
        CURRENT = index;
    }
    idle
}

/// Recovers a process's table slot from its address; used where a
/// `&'static mut Process` is already in hand and its slot index is needed
/// too (avoids re-borrowing `PROCS` to search for it).
fn index_of(proc: &Process) -> usize {
    let base = unsafe { PROCS.as_ptr() as usize };
    (proc as *const Process as usize - base) / core::mem::size_of::<Process>()
}

/// Picks the next runnable process after the current one (wrapping around
/// the table) and switches to it. A no-op if the current process is the
/// only runnable one. Falls back to the idle process if nothing else is
/// runnable.
///
/// Scanning starts at `current.pid mod PROCS_MAX` rather than at slot 0, so
/// that among several runnable processes each gets a turn before any one of
/// them runs twice. Since `pid == slot_index + 1`, this lands the scan one
/// slot past the current process and sweeps the rest of the table before
/// wrapping back onto it.
pub fn yield_now() {
    let current_index = unsafe { CURRENT };
    let current_pid = slot_mut(current_index).pid;

    let start = current_pid.rem_euclid(PROCS_MAX as i32) as usize;
    let mut next_index = unsafe { IDLE };
    for offset in 0..PROCS_MAX {
        let idx = (start + offset) % PROCS_MAX;
        let candidate = slot_mut(idx);
        if candidate.state == ProcessState::Runnable && candidate.pid > 0 {
            next_index = idx;
            break;
        }
    }

    if next_index == current_index {
        return;
    }

    let next_stack_top = slot_mut(next_index).stack_top();
    paging::activate(slot_mut(next_index).page_table);
    unsafe {
        core::arch::asm!("csrw sscratch, {0}", in(reg) next_stack_top);
    }

    unsafe {
        CURRENT = next_index;
    }
    let prev_sp = &mut slot_mut(current_index).sp as *mut u32;
    let next_sp = &mut slot_mut(next_index).sp as *mut u32;
    unsafe { context::switch_context(prev_sp, next_sp) };
}

#[cfg(test)]
mod tests {
    // `yield_now`'s candidate search is pure index arithmetic over process
    // state; exercise that in isolation without the real process table,
    // since the real one embeds 8 KiB kernel stacks per slot and owns live
    // page tables that only make sense under the MMU.
    fn next_runnable(states: &[(i32, bool)], current_pid: i32) -> Option<usize> {
        let n = states.len();
        let start = current_pid.rem_euclid(n as i32) as usize;
        for offset in 0..n {
            let idx = (start + offset) % n;
            let (pid, runnable) = states[idx];
            if runnable && pid > 0 {
                return Some(idx);
            }
        }
        None
    }

    #[test]
    fn round_robin_among_three_runnable_processes() {
        // slots 0,1,2 hold pids 1,2,3, all runnable.
        let states = [(1, true), (2, true), (3, true)];
        assert_eq!(next_runnable(&states, 1), Some(1)); // from P1, P2 runs
        assert_eq!(next_runnable(&states, 2), Some(2)); // from P2, P3 runs
        assert_eq!(next_runnable(&states, 3), Some(0)); // from P3, P1 runs
    }

    #[test]
    fn exited_process_is_skipped() {
        let states = [(1, true), (2, false), (3, true)];
        assert_eq!(next_runnable(&states, 1), Some(2)); // P2 exited, P3 runs
        assert_eq!(next_runnable(&states, 3), Some(0)); // back to P1
    }

    #[test]
    fn idle_pid_never_matches() {
        // slot 0 holds pid 3, slot 1 holds the current process (pid 2), slot
        // 2 holds idle (pid -1). Scanning from pid 2 lands first on idle's
        // slot, which must be skipped since its pid is not positive.
        let states = [(3, true), (2, true), (-1, true)];
        assert_eq!(next_runnable(&states, 2), Some(0));
        // Scanning from idle itself (as the bootstrap `current` before the
        // first real switch) must not select idle's own slot either.
        assert_eq!(next_runnable(&states, -1), Some(0));
    }
}
