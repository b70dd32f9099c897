//! Supervisor-call dispatch. Five calls, fixed menu, ABI fixed by
//! `common::syscall`: call number in `a3`, up to three arguments in
//! `a0..a2`, return value left in `a0`.

use crate::config::{FILE_DATA_MAX, FILE_NAME_MAX};
use crate::fs;
use crate::kernel_panic;
use crate::println;
use crate::process::{self, ProcessState};
use crate::riscv::{read_csr, sstatus, write_csr};
use crate::sbi;
use crate::trap::TrapFrame;
use common::syscall;

/// Sets the SUM bit in `sstatus` for its lifetime, letting supervisor code
/// dereference U-mode pages; clears it again on drop, on every exit path.
/// This is the only place in the kernel that touches a user-virtual
/// address.
struct UserAccess;

impl UserAccess {
    fn enable() -> Self {
        let bits = read_csr!("sstatus");
        write_csr!("sstatus", bits | sstatus::SUM);
        UserAccess
    }
}

impl Drop for UserAccess {
    fn drop(&mut self) {
        let bits = read_csr!("sstatus");
        write_csr!("sstatus", bits & !sstatus::SUM);
    }
}

/// Reads a NUL-terminated user string of at most `FILE_NAME_MAX - 1` bytes
/// into a fixed local buffer. Caller must already hold a [`UserAccess`]
/// guard; this does not set SUM itself since it is always used alongside
/// other user-pointer accesses in the same call.
unsafe fn read_user_cstr(ptr: u32) -> arrayvec::ArrayVec<u8, FILE_NAME_MAX> {
    let mut name = arrayvec::ArrayVec::new();
    let src = ptr as *const u8;
    for i in 0..FILE_NAME_MAX - 1 {
        let byte = src.add(i).read();
        if byte == 0 {
            break;
        }
        name.push(byte);
    }
    name
}

/// Reached from [`crate::trap::handle_trap`] with the saved register file
/// of the process that trapped. Never called for anything but an
/// ECALL-from-U trap.
pub fn dispatch(frame: &mut TrapFrame) {
    match frame.a3 as i32 {
        syscall::EXIT => {
            println!("process {} exited", process::current().pid);
            process::current().state = ProcessState::Exited;
            process::yield_now();
            kernel_panic!("unreachable");
        }

        syscall::PUTCHAR => {
            sbi::console_put(frame.a0 as u8);
            frame.a0 = 0;
        }

        syscall::GETCHAR => loop {
            match sbi::console_get() {
                Some(ch) => {
                    frame.a0 = ch as u32;
                    break;
                }
                None => process::yield_now(),
            }
        },

        syscall::READFILE => {
            let name_ptr = frame.a0;
            let buf_ptr = frame.a1;
            let len = frame.a2 as usize;

            let _guard = UserAccess::enable();
            let name = unsafe { read_user_cstr(name_ptr) };
            let copied = match fs::lookup(core::str::from_utf8(&name).unwrap_or("")) {
                Some(file) => {
                    let n = len.min(file.size);
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            file.data.as_ptr(),
                            buf_ptr as *mut u8,
                            n,
                        );
                    }
                    n
                }
                None => 0,
            };
            frame.a0 = copied as u32;
        }

        syscall::WRITEFILE => {
            let name_ptr = frame.a0;
            let buf_ptr = frame.a1;
            let len = (frame.a2 as usize).min(FILE_DATA_MAX);

            let _guard = UserAccess::enable();
            let name = unsafe { read_user_cstr(name_ptr) };
            let copied = match fs::lookup_or_create(core::str::from_utf8(&name).unwrap_or("")) {
                Some(file) => {
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            buf_ptr as *const u8,
                            file.data.as_mut_ptr(),
                            len,
                        );
                    }
                    file.size = len;
                    len
                }
                None => 0,
            };
            frame.a0 = copied as u32;
        }

        other => kernel_panic!("unexpected syscall a3={:#x}", other),
    }
}
