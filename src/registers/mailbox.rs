use core::{ops::Deref, ptr::NonNull};

use tock_registers::{
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

register_structs! {
    /// ISP core control and shared ISSR registers.
    ///
    /// The host writes commands into the `hic_*` words and rings `intgr0`;
    /// the ISP core answers through `ihc_*` (general) or one of the fast
    /// path sets (`scc_*`, `scp_*`, `meta_*`) and raises the matching bit in
    /// `intsr1`.
    pub IsRegs {
        (0x000 => pub mcuctl: ReadWrite<u32, MCUCTL::Register>),
        (0x004 => pub bboar: ReadWrite<u32>),
        (0x008 => pub intgr0: ReadWrite<u32, INTGR0::Register>),
        (0x00C => pub intcr0: ReadWrite<u32>),
        (0x010 => pub intmr0: ReadWrite<u32>),
        (0x014 => pub intsr0: ReadOnly<u32>),
        (0x018 => pub intmsr0: ReadOnly<u32>),
        (0x01C => pub intgr1: ReadWrite<u32>),
        (0x020 => pub intcr1: ReadWrite<u32, INTSR1::Register>),
        (0x024 => pub intmr1: ReadWrite<u32, INTSR1::Register>),
        (0x028 => pub intsr1: ReadWrite<u32, INTSR1::Register>),
        (0x02C => pub intmsr1: ReadOnly<u32>),
        (0x030 => _reserved0),
        (0x080 => pub hicmd: ReadWrite<u32>),
        (0x084 => pub hic_sensorid: ReadWrite<u32>),
        (0x088 => pub hic_param1: ReadWrite<u32>),
        (0x08C => pub hic_param2: ReadWrite<u32>),
        (0x090 => pub hic_param3: ReadWrite<u32>),
        (0x094 => pub hic_param4: ReadWrite<u32>),
        (0x098 => _reserved1),
        (0x0A0 => pub ihcmd: ReadWrite<u32>),
        (0x0A4 => pub ihc_sensorid: ReadWrite<u32>),
        (0x0A8 => pub ihc_param1: ReadWrite<u32>),
        (0x0AC => pub ihc_param2: ReadWrite<u32>),
        (0x0B0 => pub ihc_param3: ReadWrite<u32>),
        (0x0B4 => pub ihc_param4: ReadWrite<u32>),
        (0x0B8 => _reserved2),
        (0x0C0 => pub scc_sensorid: ReadWrite<u32>),
        (0x0C4 => pub scc_param1: ReadWrite<u32>),
        (0x0C8 => pub scc_param2: ReadWrite<u32>),
        (0x0CC => pub scc_param3: ReadWrite<u32>),
        (0x0D0 => pub scp_sensorid: ReadWrite<u32>),
        (0x0D4 => pub scp_param1: ReadWrite<u32>),
        (0x0D8 => pub scp_param2: ReadWrite<u32>),
        (0x0DC => pub scp_param3: ReadWrite<u32>),
        (0x0E0 => pub meta_sensorid: ReadWrite<u32>),
        (0x0E4 => pub meta_param1: ReadWrite<u32>),
        (0x0E8 => pub meta_param2: ReadWrite<u32>),
        (0x0EC => pub meta_param3: ReadWrite<u32>),
        (0x0F0 => pub fcount: ReadWrite<u32>),
        (0x0F4 => _reserved3),
        (0x100 => @END),
    }
}

register_bitfields! {u32,
    pub MCUCTL [
        /// Release the ISP ARM core from reset.
        RUN OFFSET(0) NUMBITS(1) [],
        /// Route the core's bus accesses through the boot base offset.
        MSWRST OFFSET(1) NUMBITS(1) []
    ],
    pub INTGR0 [
        /// Host-to-core doorbell. Cleared by the core once the command
        /// registers have been consumed.
        INTGD0 OFFSET(0) NUMBITS(1) []
    ],
    pub INTSR1 [
        GENERAL OFFSET(0) NUMBITS(1) [],
        SCC_DONE OFFSET(1) NUMBITS(1) [],
        SCP_DONE OFFSET(2) NUMBITS(1) [],
        META_DONE OFFSET(3) NUMBITS(1) []
    ]
}

/// Size of the mailbox register file in bytes.
pub const MAILBOX_REGS_SIZE: usize = 0x100;

/// Handle to the mailbox register file.
pub struct MailboxRegisters {
    base: NonNull<IsRegs>,
}

unsafe impl Send for MailboxRegisters {}
unsafe impl Sync for MailboxRegisters {}

impl MailboxRegisters {
    /// # Safety
    ///
    /// `base` must map the ISP control/ISSR registers (or memory standing in
    /// for them) for the lifetime of the returned value.
    pub const unsafe fn new(base: NonNull<u8>) -> Self {
        Self { base: base.cast() }
    }
}

impl Deref for MailboxRegisters {
    type Target = IsRegs;

    fn deref(&self) -> &Self::Target {
        unsafe { self.base.as_ref() }
    }
}
