//! Trap entry/exit. A single vector handles every exception on this
//! single-hart, non-preemptive kernel: there are no device interrupts to
//! demultiplex, and nothing to route between user and kernel traps across
//! multiple harts. The full integer register file is saved to a
//! fixed-layout frame and a pointer to it is handed to a plain Rust
//! function.

use core::arch::global_asm;

use crate::kernel_panic;
use crate::riscv::{read_csr, scause, write_csr};
use crate::syscall;

/// Saved integer register file, laid out to match the offsets `kernel_entry`
/// uses when it spills registers with `sw`. `sp` is last because it is read
/// out of `sscratch` rather than off the stack itself.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TrapFrame {
    pub ra: u32,
    pub gp: u32,
    pub tp: u32,
    pub t0: u32,
    pub t1: u32,
    pub t2: u32,
    pub t3: u32,
    pub t4: u32,
    pub t5: u32,
    pub t6: u32,
    pub a0: u32,
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub a4: u32,
    pub a5: u32,
    pub a6: u32,
    pub a7: u32,
    pub s0: u32,
    pub s1: u32,
    pub s2: u32,
    pub s3: u32,
    pub s4: u32,
    pub s5: u32,
    pub s6: u32,
    pub s7: u32,
    pub s8: u32,
    pub s9: u32,
    pub s10: u32,
    pub s11: u32,
    pub sp: u32,
}

/// Installs `kernel_entry` as the trap vector for this hart. Called once
/// during boot and again every time a process is resumed, since `stvec`
/// never changes but `sscratch` must always point at the *current*
/// process's kernel stack top before the next trap can fire safely.
pub fn init() {
    write_csr!("stvec", kernel_entry as usize as u32);
}

extern "C" {
    fn kernel_entry();
}

global_asm!(
    ".align 4",
    ".global kernel_entry",
    "kernel_entry:",
    "csrrw sp, sscratch, sp",
    "addi sp, sp, -4 * 31",
    "sw ra,  4 * 0(sp)",
    "sw gp,  4 * 1(sp)",
    "sw tp,  4 * 2(sp)",
    "sw t0,  4 * 3(sp)",
    "sw t1,  4 * 4(sp)",
    "sw t2,  4 * 5(sp)",
    "sw t3,  4 * 6(sp)",
    "sw t4,  4 * 7(sp)",
    "sw t5,  4 * 8(sp)",
    "sw t6,  4 * 9(sp)",
    "sw a0,  4 * 10(sp)",
    "sw a1,  4 * 11(sp)",
    "sw a2,  4 * 12(sp)",
    "sw a3,  4 * 13(sp)",
    "sw a4,  4 * 14(sp)",
    "sw a5,  4 * 15(sp)",
    "sw a6,  4 * 16(sp)",
    "sw a7,  4 * 17(sp)",
    "sw s0,  4 * 18(sp)",
    "sw s1,  4 * 19(sp)",
    "sw s2,  4 * 20(sp)",
    "sw s3,  4 * 21(sp)",
    "sw s4,  4 * 22(sp)",
    "sw s5,  4 * 23(sp)",
    "sw s6,  4 * 24(sp)",
    "sw s7,  4 * 25(sp)",
    "sw s8,  4 * 26(sp)",
    "sw s9,  4 * 27(sp)",
    "sw s10, 4 * 28(sp)",
    "sw s11, 4 * 29(sp)",
    "csrr a0, sscratch",
    "sw a0,  4 * 30(sp)",
    "addi a0, sp, 4 * 31",
    "csrw sscratch, a0",
    "mv a0, sp",
    "call handle_trap",
    "lw ra,  4 * 0(sp)",
    "lw gp,  4 * 1(sp)",
    "lw tp,  4 * 2(sp)",
    "lw t0,  4 * 3(sp)",
    "lw t1,  4 * 4(sp)",
    "lw t2,  4 * 5(sp)",
    "lw t3,  4 * 6(sp)",
    "lw t4,  4 * 7(sp)",
    "lw t5,  4 * 8(sp)",
    "lw t6,  4 * 9(sp)",
    "lw a0,  4 * 10(sp)",
    "lw a1,  4 * 11(sp)",
    "lw a2,  4 * 12(sp)",
    "lw a3,  4 * 13(sp)",
    "lw a4,  4 * 14(sp)",
    "lw a5,  4 * 15(sp)",
    "lw a6,  4 * 16(sp)",
    "lw a7,  4 * 17(sp)",
    "lw s0,  4 * 18(sp)",
    "lw s1,  4 * 19(sp)",
    "lw s2,  4 * 20(sp)",
    "lw s3,  4 * 21(sp)",
    "lw s4,  4 * 22(sp)",
    "lw s5,  4 * 23(sp)",
    "lw s6,  4 * 24(sp)",
    "lw s7,  4 * 25(sp)",
    "lw s8,  4 * 26(sp)",
    "lw s9,  4 * 27(sp)",
    "lw s10, 4 * 28(sp)",
    "lw s11, 4 * 29(sp)",
    "lw sp,  4 * 30(sp)",
    "sret",
);

/// Reached from [`kernel_entry`] with `a0` pointing at the saved register
/// file on the faulting process's kernel stack.
#[no_mangle]
extern "C" fn handle_trap(frame: *mut TrapFrame) {
    let scause = read_csr!("scause");
    let stval = read_csr!("stval");
    let mut sepc = read_csr!("sepc");

    if scause == scause::ECALL_U {
        syscall::dispatch(unsafe { &mut *frame });
        sepc += 4; // ecall is always 4 bytes; resume after it.
        write_csr!("sepc", sepc);
    } else {
        kernel_panic!("unexpected trap scause={:#x}, stval={:#x}, sepc={:#x}", scause, stval, sepc);
    }
}
