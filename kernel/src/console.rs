//! A `core::fmt::Write` front end over the platform gateway, used by the
//! `print!`/`println!` macros in [`crate::print`]. There is no line buffer
//! and no interrupt handler here: every byte is pushed through one `ecall`
//! the moment it is written, since this system has no interrupts to drive
//! a buffer with.

use core::fmt;

use crate::sbi;

pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &b in s.as_bytes() {
            sbi::console_put(b);
        }
        Ok(())
    }
}

/// Global console writer, used only through the `print!`/`println!` macros.
pub static mut CONSOLE: Console = Console;
