//! Raw values written into the register blocks.

/// Boot base offset register takes the firmware address in 4 KiB units.
pub const BBOAR_SHIFT: u32 = 12;

/// Every IRQ class bit in `INTSR1`.
pub const INTSR1_ALL: u32 = 0xF;

/// Output DMA format code for 10-bit bayer packed into 16-bit words.
pub const FLITE_ODMA_BAYER10: u32 = 0x2b;

/// Lowest legal D-PHY HS settle count.
pub const CSIS_SETTLE_MIN: u32 = 6;
