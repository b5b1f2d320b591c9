use core::{ops::Deref, ptr::NonNull};

use tock_registers::{
    register_bitfields, register_structs,
    registers::ReadWrite,
};

register_structs! {
    /// FIMC-LITE capture block.
    pub FliteRegs {
        (0x00 => pub cisrcsize: ReadWrite<u32, CISRCSIZE::Register>),
        (0x04 => pub cigctrl: ReadWrite<u32, CIGCTRL::Register>),
        (0x08 => _reserved0),
        (0x10 => pub cistatus: ReadWrite<u32, CISTATUS::Register>),
        (0x14 => pub cistatus2: ReadWrite<u32, CISTATUS2::Register>),
        (0x18 => pub ciimgcpt: ReadWrite<u32, CIIMGCPT::Register>),
        (0x1C => pub cicptseq: ReadWrite<u32>),
        (0x20 => pub ciodmafmt: ReadWrite<u32>),
        (0x24 => pub ciocan: ReadWrite<u32, CISRCSIZE::Register>),
        (0x28 => _reserved1),
        (0x30 => pub ciosa: [ReadWrite<u32>; 2]),
        (0x38 => pub cifcntseq: ReadWrite<u32>),
        (0x3C => _reserved2),
        (0x40 => @END),
    }
}

register_bitfields! {u32,
    pub CISRCSIZE [
        VSIZE OFFSET(0) NUMBITS(14) [],
        HSIZE OFFSET(16) NUMBITS(14) []
    ],
    pub CIGCTRL [
        SELCAM_MIPI OFFSET(3) NUMBITS(1) [],
        IRQ_START_EN OFFSET(19) NUMBITS(1) [],
        IRQ_END_EN OFFSET(20) NUMBITS(1) [],
        IRQ_LASTCAP_EN OFFSET(21) NUMBITS(1) [],
        IRQ_OVF_EN OFFSET(22) NUMBITS(1) [],
        SWRST OFFSET(31) NUMBITS(1) []
    ],
    pub CISTATUS [
        FRAME_END OFFSET(4) NUMBITS(1) [],
        FRAME_START OFFSET(5) NUMBITS(1) [],
        LAST_CAPTURE_END OFFSET(6) NUMBITS(1) [],
        OVERFLOW OFFSET(7) NUMBITS(1) []
    ],
    pub CISTATUS2 [
        /// Output slot the DMA engine wrote the last completed frame into.
        PRESENT OFFSET(0) NUMBITS(2) []
    ],
    pub CIIMGCPT [
        IMGCPTEN OFFSET(31) NUMBITS(1) []
    ]
}

/// Size of one FIMC-LITE register window in bytes.
pub const FLITE_REGS_SIZE: usize = 0x40;

/// Number of DMA output slots the block alternates between.
pub const FLITE_BUF_SLOTS: usize = 2;

pub struct FliteRegisters {
    base: NonNull<FliteRegs>,
}

unsafe impl Send for FliteRegisters {}
unsafe impl Sync for FliteRegisters {}

impl FliteRegisters {
    /// # Safety
    ///
    /// `base` must map one FIMC-LITE register window for the lifetime of the
    /// returned value.
    pub const unsafe fn new(base: NonNull<u8>) -> Self {
        Self { base: base.cast() }
    }
}

impl Deref for FliteRegisters {
    type Target = FliteRegs;

    fn deref(&self) -> &Self::Target {
        unsafe { self.base.as_ref() }
    }
}
