//! Kernel library: every subsystem lives here so that the pieces which do
//! not need the MMU or a real virtio device (page-table bit math, tar
//! parsing, round-robin selection, virtqueue descriptor layout) can be
//! exercised with a plain host `cargo test`. `main.rs` stays a thin
//! `#![no_main]` shim: the naked-asm boot stub and the `#[panic_handler]`,
//! both of which only make sense in the final bare-metal binary, not in a
//! host test build.

#![no_std]

mod alloc;
mod config;
mod console;
mod fs;
mod memory_layout;
mod paging;
mod print;
mod process;
mod riscv;
mod sbi;
mod syscall;
mod trap;
mod user_image;
mod virtio;

use core::panic::PanicInfo;

/// Zeroes `.bss` by hand: nothing has run yet that would have done it for
/// us, and Rust statics without an initializer are assumed to start zeroed.
unsafe fn clear_bss() {
    let start = memory_layout::bss_start();
    let end = memory_layout::bss_end();
    core::ptr::write_bytes(start as *mut u8, 0, (end - start) as usize);
}

#[no_mangle]
extern "C" fn kernel_main() -> ! {
    unsafe { clear_bss() };

    println!("booting");

    trap::init();
    virtio::blk::init();
    fs::init();

    process::init_idle();
    process::create_process(user_image::shell_image());

    process::yield_now();

    kernel_panic!("switched to idle process");
}

/// Powers the machine off through the platform gateway. Not reached by the
/// normal boot path (the scheduler falls back to the idle process forever
/// once the shell exits) but kept as the kernel's one clean-shutdown entry
/// point, alongside the panic path.
#[allow(dead_code)]
pub fn shutdown() -> ! {
    println!("shutting down");
    sbi::shutdown();
}

/// Prints a panic diagnostic and halts through the platform gateway.
/// `main.rs`'s `#[panic_handler]` forwards straight into this so the only
/// thing living in the bin crate's root is the one-line `#[panic_handler]`
/// attribute itself.
pub fn panic_halt(info: &PanicInfo) -> ! {
    println!("PANIC: {}", info);
    sbi::shutdown();
}
