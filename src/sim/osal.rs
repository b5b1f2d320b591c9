use alloc::{
    alloc::{Layout, alloc_zeroed, dealloc},
    collections::BTreeMap,
    string::String,
    sync::Arc,
    vec::Vec,
};
use core::{
    ptr::NonNull,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use spin::Mutex;

use crate::osal::{DmaSyncDirection, MemoryBuffer, MemoryFlags, Osal, OsalError, TimeStamp};

use super::SimDevice;

/// Base of the fake device address space handed out by [`SimOsal::dma_alloc`].
pub const SIM_DVA_BASE: u64 = 0x4000_0000;

/// Something the driver asked the OS or the hardware to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Alloc { dva: u64, size: usize },
    Free { dva: u64 },
    Sync { dva: u64, len: usize, dir: DmaSyncDirection },
    /// A mailbox command consumed by the simulated firmware.
    Command(u32),
}

struct Allocation {
    dva: u64,
    ptr: NonNull<u8>,
    layout: Layout,
}

struct Inner {
    now_us: AtomicU64,
    ticking: AtomicBool,
    devices: Mutex<Vec<Arc<dyn SimDevice>>>,
    events: Mutex<Vec<SimEvent>>,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    allocations: Mutex<Vec<Allocation>>,
    next_dva: Mutex<u64>,
}

// Allocations are only touched under their lock.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

impl Drop for Inner {
    fn drop(&mut self) {
        for allocation in self.allocations.get_mut().drain(..) {
            unsafe { dealloc(allocation.ptr.as_ptr(), allocation.layout) };
        }
    }
}

/// OSAL with a virtual clock. Every delay advances the clock and ticks the
/// registered simulated devices, which is how the hardware "runs".
#[derive(Clone)]
pub struct SimOsal {
    inner: Arc<Inner>,
}

impl Default for SimOsal {
    fn default() -> Self {
        Self::new()
    }
}

impl SimOsal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                now_us: AtomicU64::new(0),
                ticking: AtomicBool::new(false),
                devices: Mutex::new(Vec::new()),
                events: Mutex::new(Vec::new()),
                files: Mutex::new(BTreeMap::new()),
                allocations: Mutex::new(Vec::new()),
                next_dva: Mutex::new(SIM_DVA_BASE),
            }),
        }
    }

    pub fn register(&self, device: Arc<dyn SimDevice>) {
        self.inner.devices.lock().push(device);
    }

    pub fn add_firmware(&self, name: &str, data: Vec<u8>) {
        self.inner.files.lock().insert(name.into(), data);
    }

    pub fn remove_firmware(&self, name: &str) {
        self.inner.files.lock().remove(name);
    }

    /// Run every device once. Nested calls from inside a tick are ignored.
    pub fn tick(&self) {
        if self.inner.ticking.swap(true, Ordering::AcqRel) {
            return;
        }
        let devices = self.inner.devices.lock().clone();
        for device in devices {
            device.tick();
        }
        self.inner.ticking.store(false, Ordering::Release);
    }

    pub fn advance(&self, us: u64) {
        self.inner.now_us.fetch_add(us, Ordering::AcqRel);
        self.tick();
    }

    pub fn record(&self, event: SimEvent) {
        self.inner.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.inner.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.inner.events.lock().clear();
    }

    /// Live DMA allocations.
    pub fn allocations(&self) -> usize {
        self.inner.allocations.lock().len()
    }

    /// CPU pointer for `len` bytes at device address `dva`.
    pub fn translate(&self, dva: u32, len: usize) -> Option<NonNull<u8>> {
        let dva = dva as u64;
        let allocations = self.inner.allocations.lock();
        allocations
            .iter()
            .find(|a| dva >= a.dva && dva + len as u64 <= a.dva + a.layout.size() as u64)
            .map(|a| unsafe { a.ptr.add((dva - a.dva) as usize) })
    }
}

impl Osal for SimOsal {
    fn get_time_us(&self) -> TimeStamp {
        self.inner.now_us.load(Ordering::Acquire)
    }

    fn udelay(&self, us: u32) {
        self.advance(us as u64);
    }

    fn msleep(&self, ms: u32) {
        self.advance(ms as u64 * 1000);
    }

    fn dma_alloc(&self, size: usize, flags: MemoryFlags) -> Result<MemoryBuffer, OsalError> {
        let align = flags.align.max(8);
        let layout =
            Layout::from_size_align(size.max(1), align).map_err(|_| OsalError::InvalidParameter)?;
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(OsalError::OutOfMemory)?;

        let dva = {
            let mut next = self.inner.next_dva.lock();
            let align = align as u64;
            let dva = (*next + align - 1) & !(align - 1);
            *next = dva + layout.size() as u64;
            dva
        };
        self.inner
            .allocations
            .lock()
            .push(Allocation { dva, ptr, layout });
        self.record(SimEvent::Alloc { dva, size });

        Ok(MemoryBuffer {
            virt_addr: ptr,
            phys_addr: dva,
            dma_addr: dva,
            size,
            flags,
        })
    }

    fn dma_free(&self, buffer: &MemoryBuffer) {
        let mut allocations = self.inner.allocations.lock();
        if let Some(pos) = allocations.iter().position(|a| a.dva == buffer.dma_addr) {
            let allocation = allocations.swap_remove(pos);
            unsafe { dealloc(allocation.ptr.as_ptr(), allocation.layout) };
            drop(allocations);
            self.record(SimEvent::Free {
                dva: buffer.dma_addr,
            });
        }
    }

    fn dma_sync(&self, buffer: &MemoryBuffer, offset: usize, len: usize, dir: DmaSyncDirection) {
        self.record(SimEvent::Sync {
            dva: buffer.dma_addr + offset as u64,
            len,
            dir,
        });
    }

    fn request_firmware(&self, name: &str) -> Result<Vec<u8>, OsalError> {
        self.inner
            .files
            .lock()
            .get(name)
            .cloned()
            .ok_or(OsalError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_translated() {
        let osal = SimOsal::new();
        let flags = MemoryFlags {
            align: 0x1000,
            ..Default::default()
        };
        let a = osal.dma_alloc(100, flags).unwrap();
        let b = osal.dma_alloc(100, flags).unwrap();
        assert_eq!(a.dma_addr % 0x1000, 0);
        assert_eq!(b.dma_addr % 0x1000, 0);
        assert_ne!(a.dma_addr, b.dma_addr);

        let ptr = osal.translate(b.dma_addr as u32 + 8, 4).unwrap();
        assert_eq!(ptr.as_ptr(), unsafe { b.virt_addr.as_ptr().add(8) });
        assert!(osal.translate(b.dma_addr as u32 + 98, 4).is_none());

        osal.dma_free(&a);
        osal.dma_free(&b);
        assert_eq!(osal.allocations(), 0);
    }

    #[test]
    fn delays_move_the_clock() {
        let osal = SimOsal::new();
        osal.udelay(10);
        osal.msleep(2);
        assert_eq!(osal.get_time_us(), 2010);
        assert!(osal.timeout_check(0, 2000));
        assert!(!osal.timeout_check(1000, 2000));
    }
}
