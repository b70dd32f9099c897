//! The concrete virtio-blk driver: one request virtqueue, one in-flight
//! request, polled completion. Every request builds a 3-descriptor chain
//! (header, data, status) and spins on the used ring until it advances;
//! this kernel has no interrupts to wait on, so there is no completion IRQ
//! to sleep until.

use core::mem::size_of;

use crate::alloc::alloc_pages;
use crate::config::{PAGE_SIZE, SECTOR_SIZE, VIRTIO_DEVICE_BLK, VIRTQ_ENTRY_NUM};
use crate::kernel_panic;
use crate::paging::pg_roundup;
use crate::println;

use super::{reg, reg32, reg32_write, reg64, status, status_or, LEGACY_VERSION, MAGIC};

const DESC_NEXT: u16 = 1;
const DESC_WRITE: u16 = 2;

const BLK_T_IN: u32 = 0; // read from disk
const BLK_T_OUT: u32 = 1; // write to disk

/// One entry of the descriptor table, exactly as the virtio standard lays
/// it out: `addr`/`len`/`flags`/`next`, no padding.
#[repr(C)]
struct Descriptor {
    addr: u64,
    len: u32,
    flags: u16,
    next: u16,
}

/// The driver-owned available ring: the driver publishes descriptor chain
/// heads here for the device to consume.
#[repr(C)]
struct Avail {
    flags: u16,
    index: u16,
    ring: [u16; VIRTQ_ENTRY_NUM],
    _unused: u16,
}

#[repr(C)]
struct UsedElem {
    id: u32,
    len: u32,
}

/// The device-owned used ring: the device publishes completed chain heads
/// here.
#[repr(C)]
struct Used {
    flags: u16,
    index: u16,
    ring: [UsedElem; VIRTQ_ENTRY_NUM],
}

/// The virtio-blk request template: header (type + reserved + sector),
/// data buffer, and a status byte the device writes on completion. One
/// instance is reused for every request since only one is ever in flight.
#[repr(C)]
struct BlkRequest {
    kind: u32,
    reserved: u32,
    sector: u64,
    data: [u8; SECTOR_SIZE],
    status: u8,
}

/// A split virtqueue backing the single request queue (index 0). The
/// descriptor table and available ring share the queue's first page; the
/// used ring starts at the second page, matching the layout the legacy
/// virtio-mmio device computes for a 16-entry queue.
struct Virtqueue {
    base: u32,
    last_used_index: u16,
}

impl Virtqueue {
    fn desc_ptr(&self, index: usize) -> *mut Descriptor {
        (self.base as *mut Descriptor).wrapping_add(index)
    }

    fn avail_ptr(&self) -> *mut Avail {
        (self.base + (VIRTQ_ENTRY_NUM * size_of::<Descriptor>()) as u32) as *mut Avail
    }

    fn used_ptr(&self) -> *mut Used {
        (self.base + PAGE_SIZE as u32) as *mut Used
    }
}

static mut QUEUE: Virtqueue = Virtqueue {
    base: 0,
    last_used_index: 0,
};
static mut REQUEST_PADDR: u32 = 0;
static mut CAPACITY_BYTES: u32 = 0;

fn request() -> *mut BlkRequest {
    unsafe { REQUEST_PADDR as *mut BlkRequest }
}

/// Disk capacity in bytes, cached at [`init`] time.
pub fn capacity_bytes() -> u32 {
    unsafe { CAPACITY_BYTES }
}

/// Probes the device, walks it through the virtio bring-up sequence, and
/// allocates the queue and the request template. Any mismatch in the
/// probe or a feature the device refuses is fatal: this kernel has no
/// fallback driver.
pub fn init() {
    if reg32(reg::MAGIC_VALUE) != MAGIC {
        kernel_panic!("virtio: invalid magic value");
    }
    if reg32(reg::VERSION) != LEGACY_VERSION {
        kernel_panic!("virtio: invalid version");
    }
    if reg32(reg::DEVICE_ID) != VIRTIO_DEVICE_BLK {
        kernel_panic!("virtio: invalid device id");
    }

    reg32_write(reg::DEVICE_STATUS, 0);
    status_or(status::ACKNOWLEDGE);
    status_or(status::DRIVER);
    status_or(status::FEATURES_OK);

    let queue_paddr = alloc_pages(2);
    unsafe {
        QUEUE = Virtqueue {
            base: queue_paddr,
            last_used_index: 0,
        };
    }
    reg32_write(reg::QUEUE_SEL, 0);
    reg32_write(reg::QUEUE_NUM, VIRTQ_ENTRY_NUM as u32);
    reg32_write(reg::QUEUE_ALIGN, 0);
    reg32_write(reg::QUEUE_PFN, queue_paddr / PAGE_SIZE as u32);

    reg32_write(reg::DEVICE_STATUS, status::DRIVER_OK);

    let capacity = reg64(reg::DEVICE_CONFIG) as u32 * SECTOR_SIZE as u32;
    unsafe { CAPACITY_BYTES = capacity };
    println!("virtio-blk: capacity is {} bytes", capacity);

    let req_pages = pg_roundup(size_of::<BlkRequest>() as u32) / PAGE_SIZE as u32;
    unsafe { REQUEST_PADDR = alloc_pages(req_pages) };
}

/// Publishes descriptor 0 (the head of the chain built by
/// [`read_write_disk`]) into the available ring and notifies the device.
fn kick(queue_index: u32) {
    unsafe {
        let avail = QUEUE.avail_ptr();
        let slot = (*avail).index % VIRTQ_ENTRY_NUM as u16;
        (*avail).ring[slot as usize] = 0;
        (*avail).index = (*avail).index.wrapping_add(1);
        core::sync::atomic::fence(core::sync::atomic::Ordering::Release);
        reg32_write(reg::QUEUE_NOTIFY, queue_index);
        QUEUE.last_used_index = QUEUE.last_used_index.wrapping_add(1);
    }
}

fn is_busy() -> bool {
    unsafe {
        let used = QUEUE.used_ptr();
        QUEUE.last_used_index != (*used).index
    }
}

/// Reads or writes one 512-byte sector. Builds a three-descriptor chain
/// (header, data, status), kicks the device, and spins until the used
/// ring advances; there are no interrupts to wait on instead. Requests
/// past the end of the disk are logged and ignored rather than sent to
/// the device.
pub fn read_write_disk(buf: &mut [u8; SECTOR_SIZE], sector: u32, is_write: bool) {
    let capacity_sectors = capacity_bytes() / SECTOR_SIZE as u32;
    if sector >= capacity_sectors {
        println!(
            "virtio: tried to read/write sector={}, but capacity is {}",
            sector, capacity_sectors
        );
        return;
    }

    let req = request();
    unsafe {
        (*req).sector = sector as u64;
        (*req).kind = if is_write { BLK_T_OUT } else { BLK_T_IN };
        if is_write {
            (*req).data.copy_from_slice(buf);
        }
    }

    let req_paddr = req as u32;
    let header_len = (size_of::<u32>() * 2 + size_of::<u64>()) as u32;
    let data_offset = core::mem::offset_of!(BlkRequest, data) as u32;
    let status_offset = core::mem::offset_of!(BlkRequest, status) as u32;

    unsafe {
        let d0 = QUEUE.desc_ptr(0);
        (*d0).addr = req_paddr as u64;
        (*d0).len = header_len;
        (*d0).flags = DESC_NEXT;
        (*d0).next = 1;

        let d1 = QUEUE.desc_ptr(1);
        (*d1).addr = (req_paddr + data_offset) as u64;
        (*d1).len = SECTOR_SIZE as u32;
        (*d1).flags = DESC_NEXT | if is_write { 0 } else { DESC_WRITE };
        (*d1).next = 2;

        let d2 = QUEUE.desc_ptr(2);
        (*d2).addr = (req_paddr + status_offset) as u64;
        (*d2).len = 1;
        (*d2).flags = DESC_WRITE;
    }

    kick(0);
    while is_busy() {}

    let status_byte = unsafe { (*req).status };
    if status_byte != 0 {
        println!(
            "virtio: warn: failed to read/write sector={} status={}",
            sector, status_byte
        );
        return;
    }

    if !is_write {
        unsafe { buf.copy_from_slice(&(*req).data) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_op_data_descriptor_is_device_writable() {
        // d1 carries the data buffer: header is d0 (NEXT, next=1), status
        // is d2 (WRITE). A read asks the device to fill the buffer, so d1
        // must also carry WRITE; a write does not.
        let is_write = false;
        let d1_flags = DESC_NEXT | if is_write { 0 } else { DESC_WRITE };
        assert_eq!(d1_flags, DESC_NEXT | DESC_WRITE);
    }

    #[test]
    fn write_op_data_descriptor_is_device_readonly() {
        let is_write = true;
        let d1_flags = DESC_NEXT | if is_write { 0 } else { DESC_WRITE };
        assert_eq!(d1_flags, DESC_NEXT);
    }

    #[test]
    fn header_length_is_two_words_plus_a_doubleword() {
        let header_len = (size_of::<u32>() * 2 + size_of::<u64>()) as u32;
        assert_eq!(header_len, 16);
    }
}
