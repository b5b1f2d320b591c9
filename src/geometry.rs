//! Crop and scale geometry of the processing chain.

use crate::err::{FimcIsError, Result};

/// Scaler DMA outputs need both dimensions on this boundary.
pub const DMA_ALIGN: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const fn is_aligned(&self, align: u32) -> bool {
        self.width % align == 0 && self.height % align == 0
    }

    /// Reject sizes a DMA output cannot write.
    pub fn check_dma(&self) -> Result<()> {
        if self.is_empty() || !self.is_aligned(DMA_ALIGN) {
            error!(
                "{}x{} is not a valid DMA size (must be {}-aligned)",
                self.width, self.height, DMA_ALIGN
            );
            return Err(FimcIsError::InvalidArgument);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn full(size: Size) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub const fn fits_in(&self, outer: Size) -> bool {
        self.x + self.width <= outer.width && self.y + self.height <= outer.height
    }
}

/// Round down to a multiple of `align`, leaving values smaller than `align`
/// untouched.
pub const fn align_down(value: u32, align: u32) -> u32 {
    if value < align {
        value
    } else {
        value - value % align
    }
}

const fn centered(outer: u32, inner: u32) -> u32 {
    ((outer - inner) / 2) & !1
}

/// Largest rectangle with the consumer's aspect ratio centered in the
/// producer frame.
///
/// When the producer is relatively wider the full height is kept and the
/// width follows the consumer ratio, otherwise the full width is kept. Both
/// sides end up 8-aligned and the offsets are even. A side never shrinks
/// below one alignment block, so extreme ratios lose aspect accuracy instead.
pub fn center_crop(producer: Size, consumer: Size) -> Rect {
    if producer.is_empty() || consumer.is_empty() {
        return Rect::full(producer);
    }

    let (pw, ph) = (producer.width as u64, producer.height as u64);
    let (cw, ch) = (consumer.width as u64, consumer.height as u64);

    let (crop_w, crop_h) = if pw * ch > ph * cw {
        ((ph * cw / ch) as u32, producer.height)
    } else {
        (producer.width, (pw * ch / cw) as u32)
    };

    let width = align_down(crop_w.max(DMA_ALIGN).min(producer.width), DMA_ALIGN);
    let height = align_down(crop_h.max(DMA_ALIGN).min(producer.height), DMA_ALIGN);

    Rect {
        x: centered(producer.width, width),
        y: centered(producer.height, height),
        width,
        height,
    }
}

/// Digital zoom window. `ratio` is in hundredths (100 = no zoom).
pub fn zoom_crop(input: Size, ratio: u32) -> Result<Rect> {
    if ratio < 100 || input.is_empty() {
        return Err(FimcIsError::InvalidArgument);
    }
    let width = align_down(input.width * 100 / ratio, DMA_ALIGN);
    let height = align_down(input.height * 100 / ratio, DMA_ALIGN);
    Ok(Rect {
        x: centered(input.width, width),
        y: centered(input.height, height),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fhd_to_vga_ratio() {
        let crop = center_crop(Size::new(1920, 1080), Size::new(1280, 960));
        assert_eq!(
            crop,
            Rect {
                x: 240,
                y: 0,
                width: 1440,
                height: 1080
            }
        );
    }

    #[test]
    fn taller_consumer_keeps_width() {
        let crop = center_crop(Size::new(1600, 1200), Size::new(1920, 1080));
        assert_eq!(crop.width, 1600);
        assert_eq!(crop.height, 896);
        assert_eq!(crop.x, 0);
        assert_eq!(crop.y, 152);
    }

    #[test]
    fn same_ratio_is_identity() {
        let crop = center_crop(Size::new(4128, 3096), Size::new(2064, 1548));
        assert_eq!(crop, Rect::full(Size::new(4128, 3096)));
    }

    #[test]
    fn crop_properties_hold_over_a_grid() {
        let sizes = [
            (1920, 1080),
            (1280, 960),
            (640, 480),
            (4128, 3096),
            (1000, 1000),
            (320, 240),
            (176, 144),
            (2560, 1440),
            (8, 4096),
            (4096, 8),
            (16, 8),
        ];
        for &(pw, ph) in &sizes {
            for &(cw, ch) in &sizes {
                let producer = Size::new(pw, ph);
                let crop = center_crop(producer, Size::new(cw, ch));
                assert!(crop.fits_in(producer), "{:?} in {:?}", crop, producer);
                assert_eq!(crop.width % 8, 0);
                assert_eq!(crop.height % 8, 0);
                assert_eq!(crop.x, ((pw - crop.width) / 2) & !1);
                assert_eq!(crop.y, ((ph - crop.height) / 2) & !1);

                assert!(crop.width >= 8 && crop.height >= 8);

                // Aspect ratio within one alignment step on either side,
                // unless a side was held at the one-block minimum.
                if crop.width == 8 || crop.height == 8 {
                    continue;
                }
                let lhs = crop.width as i64 * ch as i64;
                let rhs = crop.height as i64 * cw as i64;
                let slack = 8 * (cw.max(ch) as i64);
                assert!((lhs - rhs).abs() <= slack, "{}x{} -> {}x{}", pw, ph, cw, ch);
            }
        }
    }

    #[test]
    fn extreme_aspect_keeps_one_aligned_block() {
        let crop = center_crop(Size::new(1920, 1080), Size::new(8, 4096));
        assert_eq!(crop, Rect { x: 956, y: 0, width: 8, height: 1080 });

        let crop = center_crop(Size::new(16, 8), Size::new(8, 4096));
        assert_eq!(crop, Rect { x: 4, y: 0, width: 8, height: 8 });
    }

    #[test]
    fn empty_consumer_keeps_producer() {
        let producer = Size::new(640, 480);
        assert_eq!(center_crop(producer, Size::new(0, 480)), Rect::full(producer));
    }

    #[test]
    fn zoom_two_x() {
        let crop = zoom_crop(Size::new(1920, 1080), 200).unwrap();
        assert_eq!(crop, Rect { x: 480, y: 272, width: 960, height: 536 });
        assert!(zoom_crop(Size::new(1920, 1080), 50).is_err());
    }

    #[test]
    fn dma_sizes_must_be_aligned() {
        assert!(Size::new(1280, 720).check_dma().is_ok());
        assert_eq!(Size::new(1278, 720).check_dma(), Err(FimcIsError::InvalidArgument));
        assert!(Size::new(0, 720).check_dma().is_err());
    }
}
