//! ISP memory, firmware and setfile loading, and A5 power sequencing.
//!
//! The ISP core sees one physically contiguous window. From the bottom:
//!
//! ```text
//! +------------------+ 0
//! | firmware image   |
//! |   ... setfile    |  (offset reported by the firmware)
//! +------------------+ fw_area_size
//! | IsRegion         |  page aligned
//! +------------------+
//! | shot slots       |  one per frame slot
//! +------------------+
//! | DIS buffers      |
//! | 3DNR buffers     |
//! +------------------+
//! ```

use alloc::{string::String, vec::Vec};
use core::{mem::size_of, ptr::NonNull};

use tock_registers::interfaces::{ReadWriteable, Writeable};

use crate::{
    config::FimcIsConfig,
    err::{FimcIsError, FirmwareError, Result},
    osal::{DmaSyncDirection, MemoryBuffer, MemoryFlags, Osal, OsalError},
    platform::PlatformOps,
    region::IsRegion,
    registers::{
        MailboxRegisters,
        consts::BBOAR_SHIFT,
        mailbox::MCUCTL,
    },
    shot::ShotExt,
};

/// Bytes of the version string at the very end of the image.
pub const FW_VERSION_LEN: usize = 7;
/// Bytes of the info string right before the version.
pub const FW_INFO_LEN: usize = 32;

const PAGE_SIZE: usize = 0x1000;
const SHOT_ALIGN: usize = 64;

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

fn trailer_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect::<String>()
        .trim()
        .into()
}

/// Strings the firmware build embeds at fixed negative offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub info: String,
    pub version: String,
    pub size: usize,
}

impl FirmwareInfo {
    /// Read the trailer. The content is not validated.
    pub fn parse(image: &[u8]) -> core::result::Result<Self, FirmwareError> {
        let size = image.len();
        if size < FW_INFO_LEN + FW_VERSION_LEN {
            return Err(FirmwareError::Truncated);
        }
        let version = &image[size - FW_VERSION_LEN..];
        let info = &image[size - FW_VERSION_LEN - FW_INFO_LEN..size - FW_VERSION_LEN];
        Ok(Self {
            info: trailer_str(info),
            version: trailer_str(version),
            size,
        })
    }
}

/// Byte offsets of every area inside ISP memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub fw_size: usize,
    pub region_offset: usize,
    pub shot_offset: usize,
    pub shot_stride: usize,
    pub shot_count: usize,
    pub dis_offset: usize,
    pub dis_size: usize,
    pub dis_count: usize,
    pub tdnr_offset: usize,
    pub tdnr_size: usize,
    pub tdnr_count: usize,
    pub total: usize,
}

impl MemoryLayout {
    pub fn new(config: &FimcIsConfig) -> Self {
        let mem = &config.memory;
        let region_offset = align_up(mem.fw_area_size, PAGE_SIZE);
        let shot_offset = align_up(region_offset + size_of::<IsRegion>(), PAGE_SIZE);
        let shot_stride = align_up(size_of::<ShotExt>(), SHOT_ALIGN);
        let shot_count = config.frame_count;
        let dis_offset = align_up(shot_offset + shot_stride * shot_count, PAGE_SIZE);
        let tdnr_offset = dis_offset + mem.dis_buffer_size * mem.dis_buffer_count;
        let total = align_up(
            tdnr_offset + mem.tdnr_buffer_size * mem.tdnr_buffer_count,
            PAGE_SIZE,
        );
        Self {
            fw_size: mem.fw_area_size,
            region_offset,
            shot_offset,
            shot_stride,
            shot_count,
            dis_offset,
            dis_size: mem.dis_buffer_size,
            dis_count: mem.dis_buffer_count,
            tdnr_offset,
            tdnr_size: mem.tdnr_buffer_size,
            tdnr_count: mem.tdnr_buffer_count,
            total,
        }
    }
}

/// The ISP core's private memory window.
pub struct IsMemory<O: Osal> {
    osal: O,
    buffer: MemoryBuffer,
    layout: MemoryLayout,
}

impl<O: Osal> IsMemory<O> {
    pub fn alloc(osal: O, config: &FimcIsConfig) -> Result<Self> {
        let layout = MemoryLayout::new(config);
        let flags = MemoryFlags {
            cacheable: true,
            contiguous: true,
            zeroing: true,
            align: PAGE_SIZE,
        };
        let buffer = osal.dma_alloc(layout.total, flags).map_err(|err| {
            error!("cannot allocate {:#x} bytes of ISP memory: {:?}", layout.total, err);
            FimcIsError::NoMemory
        })?;
        if buffer.dma_addr > u32::MAX as u64 {
            error!("ISP memory at {:#x} is outside the core's 32-bit window", buffer.dma_addr);
            osal.dma_free(&buffer);
            return Err(FimcIsError::NoMemory);
        }
        info!(
            "ISP memory: {:#x} bytes at dva {:#x} (region +{:#x}, shots +{:#x})",
            layout.total, buffer.dma_addr, layout.region_offset, layout.shot_offset
        );
        Ok(Self {
            osal,
            buffer,
            layout,
        })
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn base_dva(&self) -> u32 {
        self.buffer.dma_addr as u32
    }

    fn dva(&self, offset: usize) -> u32 {
        self.base_dva() + offset as u32
    }

    fn ptr(&self, offset: usize) -> NonNull<u8> {
        // `offset` always comes from the layout, which fits in the buffer.
        unsafe { self.buffer.virt_addr.add(offset) }
    }

    pub fn region_dva(&self) -> u32 {
        self.dva(self.layout.region_offset)
    }

    /// Device address of `shared[word]`.
    pub fn shared_dva(&self, word: usize) -> u32 {
        self.region_dva() + IsRegion::shared_offset(word) as u32
    }

    pub fn region(&self) -> &IsRegion {
        unsafe { self.ptr(self.layout.region_offset).cast::<IsRegion>().as_ref() }
    }

    pub fn region_mut(&mut self) -> &mut IsRegion {
        unsafe { self.ptr(self.layout.region_offset).cast::<IsRegion>().as_mut() }
    }

    /// Make CPU writes to the whole region visible to the core.
    pub fn flush_region(&self) {
        self.osal.dma_sync(
            &self.buffer,
            self.layout.region_offset,
            size_of::<IsRegion>(),
            DmaSyncDirection::ToDevice,
        );
    }

    /// Pick up what the core wrote into the region (error words, shared data).
    pub fn invalidate_region(&self) {
        self.osal.dma_sync(
            &self.buffer,
            self.layout.region_offset,
            size_of::<IsRegion>(),
            DmaSyncDirection::FromDevice,
        );
    }

    pub fn shot_dva(&self, slot: usize) -> Option<u32> {
        (slot < self.layout.shot_count)
            .then(|| self.dva(self.layout.shot_offset + slot * self.layout.shot_stride))
    }

    /// Copy a shot into its slot and flush it.
    pub fn write_shot(&mut self, slot: usize, shot: &ShotExt) -> Result<u32> {
        let dva = self.shot_dva(slot).ok_or(FimcIsError::InvalidArgument)?;
        let offset = self.layout.shot_offset + slot * self.layout.shot_stride;
        unsafe { self.ptr(offset).cast::<ShotExt>().write(*shot) };
        self.osal.dma_sync(
            &self.buffer,
            offset,
            size_of::<ShotExt>(),
            DmaSyncDirection::ToDevice,
        );
        Ok(dva)
    }

    /// Invalidate a shot slot and read back what the core wrote.
    pub fn read_shot(&self, slot: usize) -> Result<ShotExt> {
        if slot >= self.layout.shot_count {
            return Err(FimcIsError::InvalidArgument);
        }
        let offset = self.layout.shot_offset + slot * self.layout.shot_stride;
        self.osal.dma_sync(
            &self.buffer,
            offset,
            size_of::<ShotExt>(),
            DmaSyncDirection::FromDevice,
        );
        Ok(unsafe { self.ptr(offset).cast::<ShotExt>().read() })
    }

    pub fn dis_buffers(&self) -> Vec<u32> {
        (0..self.layout.dis_count)
            .map(|i| self.dva(self.layout.dis_offset + i * self.layout.dis_size))
            .collect()
    }

    pub fn tdnr_buffers(&self) -> Vec<u32> {
        (0..self.layout.tdnr_count)
            .map(|i| self.dva(self.layout.tdnr_offset + i * self.layout.tdnr_size))
            .collect()
    }

    fn copy_in(&mut self, offset: usize, data: &[u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr(offset).as_ptr(), data.len());
        }
        self.osal
            .dma_sync(&self.buffer, offset, data.len(), DmaSyncDirection::ToDevice);
    }

    /// Copy the firmware image to the bottom of ISP memory.
    pub fn load_firmware(&mut self, name: &str) -> Result<FirmwareInfo> {
        let image = self.osal.request_firmware(name).map_err(|err| {
            error!("request_firmware({}) failed: {:?}", name, err);
            match err {
                OsalError::NotFound => FirmwareError::NotFound.into(),
                _ => FimcIsError::NoMemory,
            }
        })?;
        if image.len() > self.layout.fw_size {
            error!("{} is {} bytes, firmware area is {}", name, image.len(), self.layout.fw_size);
            return Err(FirmwareError::TooLarge {
                size: image.len(),
                limit: self.layout.fw_size,
            }
            .into());
        }
        let info = FirmwareInfo::parse(&image)?;
        self.copy_in(0, &image);
        info!("firmware {} loaded, {} bytes", name, info.size);
        info!("firmware info: {}", info.info);
        info!("firmware version: {}", info.version);
        Ok(info)
    }

    /// Copy a setfile to the offset the firmware asked for.
    pub fn load_setfile(&mut self, name: &str, offset: u32) -> Result<usize> {
        let data = self.osal.request_firmware(name).map_err(|err| {
            error!("request_firmware({}) failed: {:?}", name, err);
            FimcIsError::from(FirmwareError::NotFound)
        })?;
        let start = offset as usize;
        if start >= self.layout.fw_size || data.len() > self.layout.fw_size - start {
            error!(
                "setfile {} ({} bytes) at {:#x} overruns the firmware area",
                name,
                data.len(),
                offset
            );
            return Err(FirmwareError::BadSetfileOffset { offset }.into());
        }
        self.copy_in(start, &data);
        info!("setfile {} loaded at {:#x}, {} bytes", name, offset, data.len());
        Ok(data.len())
    }
}

impl<O: Osal> Drop for IsMemory<O> {
    fn drop(&mut self) {
        self.osal.dma_free(&self.buffer);
    }
}

/// Point the core at its firmware and release it from reset.
pub fn boot_a5(
    regs: &MailboxRegisters,
    platform: &impl PlatformOps,
    fw_dva: u32,
) -> Result<()> {
    regs.bboar.set(fw_dva >> BBOAR_SHIFT);
    platform.a5_power(true)?;
    regs.mcuctl.modify(MCUCTL::RUN::SET);
    info!("A5 released, boot base {:#x}", fw_dva);
    Ok(())
}

/// Stop the core and cut its power domain.
pub fn halt_a5(regs: &MailboxRegisters, platform: &impl PlatformOps) -> Result<()> {
    regs.mcuctl.modify(MCUCTL::RUN::CLEAR);
    platform.a5_power(false)?;
    info!("A5 halted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn image(info: &str, version: &str, body: usize) -> Vec<u8> {
        let mut image = vec![0xAAu8; body];
        let mut info_bytes = [0u8; FW_INFO_LEN];
        info_bytes[..info.len()].copy_from_slice(info.as_bytes());
        let mut version_bytes = [0u8; FW_VERSION_LEN];
        version_bytes[..version.len()].copy_from_slice(version.as_bytes());
        image.extend_from_slice(&info_bytes);
        image.extend_from_slice(&version_bytes);
        image
    }

    #[test]
    fn trailer_strings_are_extracted() {
        let fw = image("hudson 2013-07-01 build", "F20A", 1024);
        let info = FirmwareInfo::parse(&fw).unwrap();
        assert_eq!(info.info, "hudson 2013-07-01 build");
        assert_eq!(info.version, "F20A");
        assert_eq!(info.size, 1024 + FW_INFO_LEN + FW_VERSION_LEN);
    }

    #[test]
    fn short_image_is_truncated() {
        assert_eq!(FirmwareInfo::parse(&[0; 10]), Err(FirmwareError::Truncated));
    }

    #[test]
    fn layout_areas_do_not_overlap() {
        let config = FimcIsConfig::new(crate::config::Board::Universal5420);
        let layout = MemoryLayout::new(&config);
        assert!(layout.region_offset >= layout.fw_size);
        assert_eq!(layout.region_offset % PAGE_SIZE, 0);
        assert!(layout.shot_offset >= layout.region_offset + size_of::<IsRegion>());
        assert!(layout.dis_offset >= layout.shot_offset + layout.shot_stride * layout.shot_count);
        assert!(layout.tdnr_offset >= layout.dis_offset + layout.dis_size * layout.dis_count);
        assert!(layout.total >= layout.tdnr_offset + layout.tdnr_size * layout.tdnr_count);
        assert_eq!(layout.shot_stride % SHOT_ALIGN, 0);
    }
}
