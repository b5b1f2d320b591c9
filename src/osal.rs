//! Operating System Abstraction Layer (OSAL) for the FIMC-IS driver
//!
//! Everything the driver needs from the host kernel goes through [`Osal`]:
//! a monotonic clock, delays, DMA-capable memory for the ISP core, cache
//! maintenance of that memory and access to firmware files.

use alloc::vec::Vec;
use core::ptr::NonNull;

/// Physical address type
pub type PhysAddr = u64;

/// DMA address type
pub type DmaAddr = u64;

/// Time type for timestamps
pub type TimeStamp = u64;

/// Error types for OSAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsalError {
    OutOfMemory,
    InvalidParameter,
    NotFound,
    DeviceError,
}

/// Memory allocation flags
#[derive(Debug, Clone, Copy)]
pub struct MemoryFlags {
    pub cacheable: bool,
    pub contiguous: bool,
    pub zeroing: bool,
    /// Required alignment of the allocation in bytes.
    pub align: usize,
}

impl Default for MemoryFlags {
    fn default() -> Self {
        Self {
            cacheable: true,
            contiguous: true,
            zeroing: true,
            align: 0x1000,
        }
    }
}

/// Memory buffer descriptor
#[derive(Debug)]
pub struct MemoryBuffer {
    pub virt_addr: NonNull<u8>,
    pub phys_addr: PhysAddr,
    pub dma_addr: DmaAddr,
    pub size: usize,
    pub flags: MemoryFlags,
}

// The buffer is plain DMA memory; ownership is tracked by whoever holds the
// descriptor.
unsafe impl Send for MemoryBuffer {}
unsafe impl Sync for MemoryBuffer {}

/// DMA synchronization direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaSyncDirection {
    /// Clean: CPU writes become visible to the ISP core.
    ToDevice,
    /// Invalidate: ISP core writes become visible to the CPU.
    FromDevice,
    Bidirectional,
}

/// OSAL trait for platform-specific implementations
pub trait Osal: Clone + Send + Sync {
    /// Get current timestamp in microseconds
    fn get_time_us(&self) -> TimeStamp;

    /// Busy-wait for specified microseconds
    fn udelay(&self, us: u32);

    /// Sleep for specified milliseconds
    fn msleep(&self, ms: u32);

    /// Check if timeout occurred
    fn timeout_check(&self, start_time: TimeStamp, timeout_us: u64) -> bool {
        let elapsed = self.get_time_us().saturating_sub(start_time);
        elapsed >= timeout_us
    }

    /// Allocate physically contiguous memory visible to the ISP core.
    fn dma_alloc(&self, size: usize, flags: MemoryFlags) -> Result<MemoryBuffer, OsalError>;

    /// Release memory obtained from [`Osal::dma_alloc`].
    fn dma_free(&self, buffer: &MemoryBuffer);

    /// Cache maintenance on `len` bytes at `offset` inside `buffer`.
    fn dma_sync(&self, buffer: &MemoryBuffer, offset: usize, len: usize, dir: DmaSyncDirection);

    /// Read a firmware file (`/lib/firmware` on Linux) into memory.
    fn request_firmware(&self, name: &str) -> Result<Vec<u8>, OsalError>;
}
