//! Access to the embedded shell binary. The object file exporting these two
//! symbols is linked into the kernel image by the build glue; this module
//! just names the interface and hands back a slice over it.
extern "C" {
    static _binary_shell_bin_start: u8;
    static _binary_shell_bin_size: u8;
}

/// The flat shell binary, as a slice the process table can copy page by
/// page into a fresh address space.
pub fn shell_image() -> &'static [u8] {
    unsafe {
        let start = core::ptr::addr_of!(_binary_shell_bin_start);
        let size = core::ptr::addr_of!(_binary_shell_bin_size) as usize;
        core::slice::from_raw_parts(start, size)
    }
}
