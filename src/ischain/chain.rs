//! Size setters for the four chain stages.
//!
//! ```text
//! chain0  sensor / ISP input (bayer)
//!   |  center crop to chain1 aspect, scale
//! chain1  scaler-C output, ODC, DIS input
//!   |
//! chain2  DIS output, 3DNR, scaler-P input
//!   |  center crop to chain3 aspect, scale
//! chain3  scaler-P output, FD input
//! ```
//!
//! Each setter writes the parameter blocks its stage owns and marks them in
//! the caller's [`ParamSet`]; nothing is sent to the firmware here.

use crate::{
    err::{FimcIsError, Result},
    geometry::{DMA_ALIGN, Rect, Size, align_down, center_crop},
    region::{IsParamRegion, ParamId, ParamSet, param::consts::*},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainSizes {
    pub chain0: Size,
    pub chain1: Size,
    pub chain2: Size,
    pub chain3: Size,
}

impl ChainSizes {
    /// Every stage at the sensor size, the DMA stages rounded down to what a
    /// scaler can write.
    pub fn uniform(size: Size) -> Self {
        let dma = Size::new(
            align_down(size.width, DMA_ALIGN),
            align_down(size.height, DMA_ALIGN),
        );
        Self {
            chain0: size,
            chain1: dma,
            chain2: dma,
            chain3: dma,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain0.is_empty() || self.chain2.is_empty() {
            error!("empty chain size {:?}", self);
            return Err(FimcIsError::InvalidArgument);
        }
        self.chain1.check_dma()?;
        self.chain3.check_dma()?;
        // DIS only crops, it never scales up.
        if self.chain2.width > self.chain1.width || self.chain2.height > self.chain1.height {
            error!(
                "chain2 {}x{} larger than chain1 {}x{}",
                self.chain2.width, self.chain2.height, self.chain1.width, self.chain1.height
            );
            return Err(FimcIsError::InvalidArgument);
        }
        Ok(())
    }
}

/// ISP input and everything up to the scaler-C input.
pub fn s_chain0_size(region: &mut IsParamRegion, size: Size, set: &mut ParamSet) {
    let isp = &mut region.isp;

    isp.otf_input.cmd = OTF_INPUT_COMMAND_DISABLE;
    isp.otf_input.width = size.width;
    isp.otf_input.height = size.height;

    isp.dma1_input.cmd = DMA_INPUT_COMMAND_ENABLE;
    isp.dma1_input.width = size.width;
    isp.dma1_input.height = size.height;
    isp.dma1_input.format = DMA_INPUT_FORMAT_BAYER;
    isp.dma1_input.bitwidth = OTF_INPUT_BIT_WIDTH_10BIT;
    isp.dma1_input.plane = 1;

    isp.dma2_input.cmd = DMA_INPUT_COMMAND_DISABLE;

    isp.otf_output.cmd = OTF_OUTPUT_COMMAND_ENABLE;
    isp.otf_output.width = size.width;
    isp.otf_output.height = size.height;
    isp.otf_output.format = OTF_OUTPUT_FORMAT_YUV444;
    isp.otf_output.bitwidth = OTF_OUTPUT_BIT_WIDTH_12BIT;

    isp.dma1_output.cmd = DMA_OUTPUT_COMMAND_DISABLE;
    isp.dma2_output.cmd = DMA_OUTPUT_COMMAND_DISABLE;

    let drc = &mut region.drc;
    drc.otf_input.cmd = OTF_INPUT_COMMAND_ENABLE;
    drc.otf_input.width = size.width;
    drc.otf_input.height = size.height;
    drc.otf_input.format = OTF_INPUT_FORMAT_YUV444;
    drc.otf_input.bitwidth = OTF_INPUT_BIT_WIDTH_12BIT;
    drc.otf_output.cmd = OTF_OUTPUT_COMMAND_ENABLE;
    drc.otf_output.width = size.width;
    drc.otf_output.height = size.height;
    drc.otf_output.format = OTF_OUTPUT_FORMAT_YUV444;
    drc.otf_output.bitwidth = OTF_OUTPUT_BIT_WIDTH_12BIT;

    let scc = &mut region.scalerc;
    scc.otf_input.cmd = OTF_INPUT_COMMAND_ENABLE;
    scc.otf_input.width = size.width;
    scc.otf_input.height = size.height;
    scc.otf_input.format = OTF_INPUT_FORMAT_YUV444;
    scc.otf_input.bitwidth = OTF_INPUT_BIT_WIDTH_12BIT;

    for id in [
        ParamId::IspOtfInput,
        ParamId::IspDma1Input,
        ParamId::IspDma2Input,
        ParamId::IspOtfOutput,
        ParamId::IspDma1Output,
        ParamId::IspDma2Output,
        ParamId::DrcOtfInput,
        ParamId::DrcOtfOutput,
        ParamId::ScalercOtfInput,
    ] {
        set.mark(id);
    }
}

/// Scaler-C input crop taking `crop` out of an `input` sized frame.
pub fn s_scalerc_crop(region: &mut IsParamRegion, input: Size, crop: Rect, output: Size, set: &mut ParamSet) {
    let scc = &mut region.scalerc;
    scc.input_crop.cmd = SCALER_CROP_COMMAND_ENABLE;
    scc.input_crop.pos_x = crop.x;
    scc.input_crop.pos_y = crop.y;
    scc.input_crop.crop_width = crop.width;
    scc.input_crop.crop_height = crop.height;
    scc.input_crop.in_width = input.width;
    scc.input_crop.in_height = input.height;
    scc.input_crop.out_width = output.width;
    scc.input_crop.out_height = output.height;
    set.mark(ParamId::ScalercInputCrop);
}

/// Scaler-C output, ODC and the DIS input.
pub fn s_chain1_size(region: &mut IsParamRegion, input: Size, size: Size, set: &mut ParamSet) {
    let crop = center_crop(input, size);
    debug!(
        "chain1 {}x{} <- crop ({}, {}) {}x{} of {}x{}",
        size.width, size.height, crop.x, crop.y, crop.width, crop.height, input.width, input.height
    );
    s_scalerc_crop(region, input, crop, size, set);

    let scc = &mut region.scalerc;
    scc.output_crop.cmd = SCALER_CROP_COMMAND_DISABLE;
    scc.output_crop.pos_x = 0;
    scc.output_crop.pos_y = 0;
    scc.output_crop.crop_width = size.width;
    scc.output_crop.crop_height = size.height;
    scc.output_crop.format = DMA_OUTPUT_FORMAT_YUV422;

    scc.otf_output.cmd = OTF_OUTPUT_COMMAND_ENABLE;
    scc.otf_output.width = size.width;
    scc.otf_output.height = size.height;
    scc.otf_output.format = OTF_OUTPUT_FORMAT_YUV444;
    scc.otf_output.bitwidth = OTF_OUTPUT_BIT_WIDTH_8BIT;

    scc.dma_output.width = size.width;
    scc.dma_output.height = size.height;
    scc.dma_output.format = DMA_OUTPUT_FORMAT_YUV422;
    scc.dma_output.bitwidth = DMA_OUTPUT_BIT_WIDTH_8BIT;

    let odc = &mut region.odc;
    odc.otf_input.cmd = OTF_INPUT_COMMAND_ENABLE;
    odc.otf_input.width = size.width;
    odc.otf_input.height = size.height;
    odc.otf_input.format = OTF_INPUT_FORMAT_YUV444;
    odc.otf_output.cmd = OTF_OUTPUT_COMMAND_ENABLE;
    odc.otf_output.width = size.width;
    odc.otf_output.height = size.height;
    odc.otf_output.format = OTF_OUTPUT_FORMAT_YUV422;

    let dis = &mut region.dis;
    dis.otf_input.cmd = OTF_INPUT_COMMAND_ENABLE;
    dis.otf_input.width = size.width;
    dis.otf_input.height = size.height;
    dis.otf_input.format = OTF_INPUT_FORMAT_YUV444;

    for id in [
        ParamId::ScalercOutputCrop,
        ParamId::ScalercOtfOutput,
        ParamId::ScalercDmaOutput,
        ParamId::OdcOtfInput,
        ParamId::OdcOtfOutput,
        ParamId::DisOtfInput,
    ] {
        set.mark(id);
    }
}

/// DIS output, 3DNR and the scaler-P input.
pub fn s_chain2_size(region: &mut IsParamRegion, size: Size, set: &mut ParamSet) {
    let dis = &mut region.dis;
    dis.otf_output.cmd = OTF_OUTPUT_COMMAND_ENABLE;
    dis.otf_output.width = size.width;
    dis.otf_output.height = size.height;
    dis.otf_output.format = OTF_OUTPUT_FORMAT_YUV422;

    let tdnr = &mut region.tdnr;
    tdnr.otf_input.cmd = OTF_INPUT_COMMAND_ENABLE;
    tdnr.otf_input.width = size.width;
    tdnr.otf_input.height = size.height;
    tdnr.otf_input.format = OTF_INPUT_FORMAT_YUV444;
    tdnr.otf_output.cmd = OTF_OUTPUT_COMMAND_ENABLE;
    tdnr.otf_output.width = size.width;
    tdnr.otf_output.height = size.height;
    tdnr.otf_output.format = OTF_OUTPUT_FORMAT_YUV444;
    tdnr.dma_output.width = size.width;
    tdnr.dma_output.height = size.height;
    tdnr.dma_output.format = DMA_OUTPUT_FORMAT_YUV420;
    tdnr.dma_output.bitwidth = DMA_OUTPUT_BIT_WIDTH_8BIT;

    let scp = &mut region.scalerp;
    scp.otf_input.cmd = OTF_INPUT_COMMAND_ENABLE;
    scp.otf_input.width = size.width;
    scp.otf_input.height = size.height;
    scp.otf_input.format = OTF_INPUT_FORMAT_YUV444;

    for id in [
        ParamId::DisOtfOutput,
        ParamId::TdnrOtfInput,
        ParamId::TdnrOtfOutput,
        ParamId::TdnrDmaOutput,
        ParamId::ScalerpOtfInput,
    ] {
        set.mark(id);
    }
}

/// Scaler-P output and the FD input.
pub fn s_chain3_size(region: &mut IsParamRegion, input: Size, size: Size, set: &mut ParamSet) {
    let crop = center_crop(input, size);
    debug!(
        "chain3 {}x{} <- crop ({}, {}) {}x{} of {}x{}",
        size.width, size.height, crop.x, crop.y, crop.width, crop.height, input.width, input.height
    );

    let scp = &mut region.scalerp;
    scp.input_crop.cmd = SCALER_CROP_COMMAND_ENABLE;
    scp.input_crop.pos_x = crop.x;
    scp.input_crop.pos_y = crop.y;
    scp.input_crop.crop_width = crop.width;
    scp.input_crop.crop_height = crop.height;
    scp.input_crop.in_width = input.width;
    scp.input_crop.in_height = input.height;
    scp.input_crop.out_width = size.width;
    scp.input_crop.out_height = size.height;

    scp.output_crop.cmd = SCALER_CROP_COMMAND_DISABLE;
    scp.output_crop.crop_width = size.width;
    scp.output_crop.crop_height = size.height;
    scp.output_crop.format = DMA_OUTPUT_FORMAT_YUV420;

    scp.otf_output.cmd = OTF_OUTPUT_COMMAND_ENABLE;
    scp.otf_output.width = size.width;
    scp.otf_output.height = size.height;
    scp.otf_output.format = OTF_OUTPUT_FORMAT_YUV444;
    scp.otf_output.bitwidth = OTF_OUTPUT_BIT_WIDTH_8BIT;

    scp.dma_output.width = size.width;
    scp.dma_output.height = size.height;
    scp.dma_output.format = DMA_OUTPUT_FORMAT_YUV420;
    scp.dma_output.bitwidth = DMA_OUTPUT_BIT_WIDTH_8BIT;

    let fd = &mut region.fd;
    fd.otf_input.cmd = OTF_INPUT_COMMAND_ENABLE;
    fd.otf_input.width = size.width;
    fd.otf_input.height = size.height;
    fd.otf_input.format = OTF_INPUT_FORMAT_YUV444;
    fd.dma_input.cmd = DMA_INPUT_COMMAND_DISABLE;

    for id in [
        ParamId::ScalerpInputCrop,
        ParamId::ScalerpOutputCrop,
        ParamId::ScalerpOtfOutput,
        ParamId::ScalerpDmaOutput,
        ParamId::FdOtfInput,
        ParamId::FdDmaInput,
    ] {
        set.mark(id);
    }
}

/// Apply all four stages.
pub fn s_chain_sizes(region: &mut IsParamRegion, sizes: &ChainSizes) -> Result<ParamSet> {
    sizes.validate()?;
    let mut set = ParamSet::new();
    s_chain0_size(region, sizes.chain0, &mut set);
    s_chain1_size(region, sizes.chain0, sizes.chain1, &mut set);
    s_chain2_size(region, sizes.chain2, &mut set);
    s_chain3_size(region, sizes.chain2, sizes.chain3, &mut set);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> ChainSizes {
        ChainSizes {
            chain0: Size::new(1920, 1080),
            chain1: Size::new(1280, 960),
            chain2: Size::new(1280, 960),
            chain3: Size::new(640, 360),
        }
    }

    #[test]
    fn scaler_c_crops_to_output_aspect() {
        let mut region = IsParamRegion::default();
        s_chain_sizes(&mut region, &sizes()).unwrap();

        let crop = region.scalerc.input_crop;
        assert_eq!((crop.pos_x, crop.pos_y), (240, 0));
        assert_eq!((crop.crop_width, crop.crop_height), (1440, 1080));
        assert_eq!((crop.out_width, crop.out_height), (1280, 960));
        assert_eq!(region.dis.otf_input.width, 1280);
        assert_eq!(region.scalerc.dma_output.height, 960);
    }

    #[test]
    fn scaler_p_crops_from_chain2() {
        let mut region = IsParamRegion::default();
        s_chain_sizes(&mut region, &sizes()).unwrap();

        let crop = region.scalerp.input_crop;
        // 1280x960 to 16:9 keeps the width.
        assert_eq!((crop.crop_width, crop.crop_height), (1280, 720));
        assert_eq!((crop.pos_x, crop.pos_y), (0, 120));
        assert_eq!(region.fd.otf_input.width, 640);
        assert_eq!(region.scalerp.otf_output.height, 360);
    }

    #[test]
    fn marks_every_stage_block() {
        let mut region = IsParamRegion::default();
        let set = s_chain_sizes(&mut region, &sizes()).unwrap();
        for id in [
            ParamId::IspDma1Input,
            ParamId::ScalercInputCrop,
            ParamId::DisOtfOutput,
            ParamId::ScalerpDmaOutput,
            ParamId::FdOtfInput,
        ] {
            assert!(set.contains(id), "{:?} not marked", id);
        }
        assert!(!set.contains(ParamId::IspAa));
    }

    #[test]
    fn uniform_sizes_round_dma_stages() {
        let sizes = ChainSizes::uniform(Size::new(1936, 1090));
        assert_eq!(sizes.chain0, Size::new(1936, 1090));
        assert_eq!(sizes.chain3, Size::new(1936, 1088));
        assert!(sizes.validate().is_ok());
    }

    #[test]
    fn unaligned_dma_output_is_rejected() {
        let mut region = IsParamRegion::default();
        let mut bad = sizes();
        bad.chain3 = Size::new(642, 360);
        assert_eq!(s_chain_sizes(&mut region, &bad), Err(FimcIsError::InvalidArgument));
        assert_eq!(region, IsParamRegion::default());

        let mut bad = sizes();
        bad.chain2 = Size::new(1920, 1080);
        assert!(s_chain_sizes(&mut region, &bad).is_err());
    }
}
