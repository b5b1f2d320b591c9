use core::{ops::Deref, ptr::NonNull};

use tock_registers::{
    register_bitfields, register_structs,
    registers::ReadWrite,
};

register_structs! {
    /// MIPI-CSI2 receiver with its D-PHY control word.
    pub CsisRegs {
        (0x00 => pub ctrl: ReadWrite<u32, CSIS_CTRL::Register>),
        (0x04 => pub dphyctrl: ReadWrite<u32, CSIS_DPHYCTRL::Register>),
        (0x08 => pub config: ReadWrite<u32, CSIS_CONFIG::Register>),
        (0x0C => pub resol: ReadWrite<u32>),
        (0x10 => @END),
    }
}

register_bitfields! {u32,
    pub CSIS_CTRL [
        ENABLE OFFSET(0) NUMBITS(1) [],
        SW_RESET OFFSET(1) NUMBITS(1) [],
        LANE_NUMBER OFFSET(8) NUMBITS(2) []
    ],
    pub CSIS_DPHYCTRL [
        ENABLE_CLK OFFSET(0) NUMBITS(1) [],
        ENABLE_DAT OFFSET(1) NUMBITS(4) [],
        HSSETTLE OFFSET(27) NUMBITS(5) []
    ],
    pub CSIS_CONFIG [
        DATAFORMAT OFFSET(2) NUMBITS(6) [
            Raw8 = 0x2a,
            Raw10 = 0x2b,
            Raw12 = 0x2c
        ]
    ]
}

pub const CSIS_REGS_SIZE: usize = 0x10;

pub struct CsisRegisters {
    base: NonNull<CsisRegs>,
}

unsafe impl Send for CsisRegisters {}
unsafe impl Sync for CsisRegisters {}

impl CsisRegisters {
    /// # Safety
    ///
    /// `base` must map one MIPI-CSIS register window for the lifetime of the
    /// returned value.
    pub const unsafe fn new(base: NonNull<u8>) -> Self {
        Self { base: base.cast() }
    }
}

impl Deref for CsisRegisters {
    type Target = CsisRegs;

    fn deref(&self) -> &Self::Target {
        unsafe { self.base.as_ref() }
    }
}
