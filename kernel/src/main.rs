#![no_std]
#![no_main]

use core::arch::global_asm;
use core::panic::PanicInfo;

global_asm!(
    ".section \".text.boot\"",
    ".global boot",
    "boot:",
    "la sp, __stack_top",
    "j kernel_main",
);

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel::panic_halt(info)
}
