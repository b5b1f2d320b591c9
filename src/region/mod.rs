//! The parameter region shared between the AP and the ISP core.
//!
//! The region lives in ISP memory and is read asynchronously by the
//! firmware. Any write to a parameter block has to be recorded in a
//! [`ParamSet`], the region flushed, and only then may the mailbox command
//! telling the firmware to read those indexes be sent. `Ischain` is the only
//! writer and enforces that order.

pub mod param;

use core::mem::offset_of;

use param::*;

/// Words in the raw shared scratch area.
pub const MAX_SHARED_COUNT: usize = 500;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalParam {
    pub shotmode: ParamGlobalShotMode,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorParam {
    pub control: ParamControl,
    pub otf_output: ParamOtfOutput,
    pub config: ParamSensorConfig,
    pub dma_output: ParamDmaOutput,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IspParam {
    pub control: ParamControl,
    pub otf_input: ParamOtfInput,
    pub dma1_input: ParamDmaInput,
    pub dma2_input: ParamDmaInput,
    pub aa: ParamIspAa,
    pub flash: ParamCmd,
    pub awb: ParamCmd,
    pub effect: ParamCmd,
    pub iso: ParamCmd,
    pub adjust: ParamIspAdjust,
    pub metering: ParamIspMetering,
    pub afc: ParamCmd,
    pub otf_output: ParamOtfOutput,
    pub dma1_output: ParamDmaOutput,
    pub dma2_output: ParamDmaOutput,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrcParam {
    pub control: ParamControl,
    pub otf_input: ParamOtfInput,
    pub dma_input: ParamDmaInput,
    pub otf_output: ParamOtfOutput,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalercParam {
    pub control: ParamControl,
    pub otf_input: ParamOtfInput,
    pub effect: ParamCmd,
    pub input_crop: ParamInputCrop,
    pub output_crop: ParamOutputCrop,
    pub otf_output: ParamOtfOutput,
    pub dma_output: ParamDmaOutput,
}

/// ODC and DIS share a layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OtfStageParam {
    pub control: ParamControl,
    pub otf_input: ParamOtfInput,
    pub otf_output: ParamOtfOutput,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TdnrParam {
    pub control: ParamControl,
    pub otf_input: ParamOtfInput,
    pub frame: ParamCmd,
    pub otf_output: ParamOtfOutput,
    pub dma_output: ParamDmaOutput,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalerpParam {
    pub control: ParamControl,
    pub otf_input: ParamOtfInput,
    pub effect: ParamCmd,
    pub input_crop: ParamInputCrop,
    pub output_crop: ParamOutputCrop,
    pub rotation: ParamCmd,
    pub flip: ParamCmd,
    pub otf_output: ParamOtfOutput,
    pub dma_output: ParamDmaOutput,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FdParam {
    pub control: ParamControl,
    pub otf_input: ParamOtfInput,
    pub dma_input: ParamDmaInput,
    pub config: ParamFdConfig,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsParamRegion {
    pub global: GlobalParam,
    pub sensor: SensorParam,
    pub isp: IspParam,
    pub drc: DrcParam,
    pub scalerc: ScalercParam,
    pub odc: OtfStageParam,
    pub dis: OtfStageParam,
    pub tdnr: TdnrParam,
    pub scalerp: ScalerpParam,
    pub fd: FdParam,
}

#[repr(C)]
pub struct IsRegion {
    pub parameter: IsParamRegion,
    pub shared: [u32; MAX_SHARED_COUNT],
}

const _: () = assert!(
    core::mem::size_of::<IsParamRegion>() == PARAM_END as usize * PARAMETER_MAX_SIZE
);

impl IsRegion {
    /// Byte offset of `shared[word]` from the start of the region.
    pub const fn shared_offset(word: usize) -> usize {
        offset_of!(IsRegion, shared) + word * 4
    }

    pub fn reset(&mut self) {
        self.parameter = IsParamRegion::default();
        self.shared = [0; MAX_SHARED_COUNT];
    }
}

/// Index of one parameter block, in region order.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    GlobalShotMode = 0,
    SensorControl,
    SensorOtfOutput,
    SensorConfig,
    SensorDmaOutput,
    IspControl,
    IspOtfInput,
    IspDma1Input,
    IspDma2Input,
    IspAa,
    IspFlash,
    IspAwb,
    IspImageEffect,
    IspIso,
    IspAdjust,
    IspMetering,
    IspAfc,
    IspOtfOutput,
    IspDma1Output,
    IspDma2Output,
    DrcControl,
    DrcOtfInput,
    DrcDmaInput,
    DrcOtfOutput,
    ScalercControl,
    ScalercOtfInput,
    ScalercImageEffect,
    ScalercInputCrop,
    ScalercOutputCrop,
    ScalercOtfOutput,
    ScalercDmaOutput,
    OdcControl,
    OdcOtfInput,
    OdcOtfOutput,
    DisControl,
    DisOtfInput,
    DisOtfOutput,
    TdnrControl,
    TdnrOtfInput,
    Tdnr1stFrame,
    TdnrOtfOutput,
    TdnrDmaOutput,
    ScalerpControl,
    ScalerpOtfInput,
    ScalerpImageEffect,
    ScalerpInputCrop,
    ScalerpOutputCrop,
    ScalerpRotation,
    ScalerpFlip,
    ScalerpOtfOutput,
    ScalerpDmaOutput,
    FdControl,
    FdOtfInput,
    FdDmaInput,
    FdConfig,
}

/// One past the last parameter index.
pub const PARAM_END: u32 = ParamId::FdConfig as u32 + 1;

/// Parameter indexes touched since the last `HIC_SET_PARAMETER`.
///
/// `lindex` covers indexes 0..32, `hindex` 32..64 and `indexes` counts the
/// set bits; the three words are sent to the firmware as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamSet {
    pub lindex: u32,
    pub hindex: u32,
    pub indexes: u32,
}

impl ParamSet {
    pub const fn new() -> Self {
        Self {
            lindex: 0,
            hindex: 0,
            indexes: 0,
        }
    }

    /// Every index of the region.
    pub fn all() -> Self {
        let mut set = Self::new();
        for index in 0..PARAM_END {
            set.mark_index(index);
        }
        set
    }

    fn mark_index(&mut self, index: u32) {
        let word = if index < 32 {
            &mut self.lindex
        } else {
            &mut self.hindex
        };
        let bit = 1 << (index % 32);
        if *word & bit == 0 {
            *word |= bit;
            self.indexes += 1;
        }
    }

    pub fn mark(&mut self, id: ParamId) {
        self.mark_index(id as u32);
    }

    pub fn contains(&self, id: ParamId) -> bool {
        let index = id as u32;
        if index < 32 {
            self.lindex & (1 << index) != 0
        } else {
            self.hindex & (1 << (index - 32)) != 0
        }
    }

    pub fn merge(&mut self, other: &ParamSet) {
        for index in 0..PARAM_END {
            let word = if index < 32 { other.lindex } else { other.hindex };
            if word & (1 << (index % 32)) != 0 {
                self.mark_index(index);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indexes == 0
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_blocks_sit_at_their_index() {
        assert_eq!(offset_of!(IsParamRegion, sensor), ParamId::SensorControl as usize * 64);
        assert_eq!(offset_of!(IsParamRegion, isp), ParamId::IspControl as usize * 64);
        assert_eq!(offset_of!(IsParamRegion, drc), ParamId::DrcControl as usize * 64);
        assert_eq!(offset_of!(IsParamRegion, scalerc), ParamId::ScalercControl as usize * 64);
        assert_eq!(offset_of!(IsParamRegion, odc), ParamId::OdcControl as usize * 64);
        assert_eq!(offset_of!(IsParamRegion, dis), ParamId::DisControl as usize * 64);
        assert_eq!(offset_of!(IsParamRegion, tdnr), ParamId::TdnrControl as usize * 64);
        assert_eq!(offset_of!(IsParamRegion, scalerp), ParamId::ScalerpControl as usize * 64);
        assert_eq!(offset_of!(IsParamRegion, fd), ParamId::FdControl as usize * 64);
    }

    #[test]
    fn marking_twice_counts_once() {
        let mut set = ParamSet::new();
        set.mark(ParamId::IspOtfOutput);
        set.mark(ParamId::IspOtfOutput);
        set.mark(ParamId::ScalerpDmaOutput);
        assert_eq!(set.indexes, 2);
        assert_eq!(set.lindex, 1 << ParamId::IspOtfOutput as u32);
        assert_eq!(set.hindex, 1 << (ParamId::ScalerpDmaOutput as u32 - 32));
        assert!(set.contains(ParamId::ScalerpDmaOutput));
        assert!(!set.contains(ParamId::FdConfig));
    }

    #[test]
    fn merge_unions_and_recounts() {
        let mut a = ParamSet::new();
        a.mark(ParamId::DisControl);
        a.mark(ParamId::IspAa);
        let mut b = ParamSet::new();
        b.mark(ParamId::DisControl);
        b.mark(ParamId::FdConfig);
        a.merge(&b);
        assert_eq!(a.indexes, 3);
        assert!(a.contains(ParamId::FdConfig));
    }

    #[test]
    fn all_covers_every_index() {
        let set = ParamSet::all();
        assert_eq!(set.indexes, PARAM_END);
        assert_eq!(set.lindex, u32::MAX);
        assert_eq!(set.hindex, (1 << (PARAM_END - 32)) - 1);
    }

    #[test]
    fn shared_offsets_are_word_addressed() {
        let base = IsRegion::shared_offset(0);
        assert_eq!(base, core::mem::size_of::<IsParamRegion>());
        assert_eq!(IsRegion::shared_offset(447) - base, 447 * 4);
    }
}
