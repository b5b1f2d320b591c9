//! MIPI D-PHY HS settle counts per sensor mode.

use crate::registers::consts::CSIS_SETTLE_MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleEntry {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub settle: u32,
}

const fn entry(width: u32, height: u32, fps: u32, settle: u32) -> SettleEntry {
    SettleEntry {
        width,
        height,
        fps,
        settle,
    }
}

pub const IMX135_SETTLE: &[SettleEntry] = &[
    entry(4128, 3096, 15, 18),
    entry(4128, 3096, 24, 20),
    entry(4128, 3096, 30, 23),
    entry(4128, 2322, 30, 23),
    entry(2064, 1548, 30, 14),
    entry(2064, 1548, 60, 20),
    entry(1936, 1090, 30, 14),
    entry(1936, 1090, 60, 20),
    entry(1024, 576, 120, 17),
];

pub const S5K6B2_SETTLE: &[SettleEntry] = &[
    entry(1936, 1090, 15, 8),
    entry(1936, 1090, 24, 10),
    entry(1936, 1090, 30, 12),
];

pub const S5K3L2_SETTLE: &[SettleEntry] = &[
    entry(4144, 3106, 24, 19),
    entry(4144, 3106, 30, 22),
    entry(2072, 1554, 30, 13),
    entry(2072, 1554, 60, 18),
    entry(1936, 1090, 60, 18),
];

/// How a settle value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMatch {
    Exact,
    /// Same resolution at the closest higher frame rate.
    HigherFps,
    /// Largest value of the table.
    TableMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settle {
    pub value: u32,
    pub matched: SettleMatch,
}

/// Settle count for a mode. Always yields a value; a warning is logged when
/// the exact mode is not in the table.
pub fn lookup(table: &[SettleEntry], width: u32, height: u32, fps: u32) -> Settle {
    if let Some(entry) = table
        .iter()
        .find(|e| e.width == width && e.height == height && e.fps == fps)
    {
        return Settle {
            value: entry.settle,
            matched: SettleMatch::Exact,
        };
    }

    if let Some(entry) = table
        .iter()
        .filter(|e| e.width == width && e.height == height && e.fps > fps)
        .min_by_key(|e| e.fps)
    {
        warn!(
            "no settle for {}x{}@{}, using the {}fps entry ({})",
            width, height, fps, entry.fps, entry.settle
        );
        return Settle {
            value: entry.settle,
            matched: SettleMatch::HigherFps,
        };
    }

    let value = table
        .iter()
        .map(|e| e.settle)
        .max()
        .unwrap_or(CSIS_SETTLE_MIN);
    warn!(
        "no settle for {}x{}@{}, falling back to table max {}",
        width, height, fps, value
    );
    Settle {
        value,
        matched: SettleMatch::TableMax,
    }
}
