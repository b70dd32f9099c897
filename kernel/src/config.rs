//! Build-time tunables, collected in one place so every other module
//! refers to them by name instead of repeating literals.

pub use common::{FILES_MAX, FILE_DATA_MAX, FILE_NAME_MAX, PROCS_MAX, SECTOR_SIZE, USER_BASE};

/// Bytes reserved for each process's kernel stack.
pub const KERNEL_STACK_SIZE: usize = 8192;

/// Page size of the Sv32 MMU.
pub const PAGE_SIZE: usize = 4096;

/// Number of descriptors in the single virtio-blk request virtqueue.
pub const VIRTQ_ENTRY_NUM: usize = 16;

/// Physical base address of the virtio-blk legacy MMIO device on the
/// qemu "virt" machine.
pub const VIRTIO_BLK_PADDR: u32 = 0x1000_1000;

/// virtio device-id for a block device.
pub const VIRTIO_DEVICE_BLK: u32 = 2;
