//! Segmentation mask tinting for the raster layer.

use image::{DynamicImage, Pixel, Rgba, RgbaImage};

use crate::palette::Rgb;

/// Red-channel values above this count as foreground.
pub const MASK_THRESHOLD: u8 = 128;
pub const MASK_ALPHA: u8 = 128;

/// Paints `tint` over every pixel of `base` whose mask pixel is foreground.
///
/// The mask is sampled nearest-neighbor when its size differs from the base.
pub fn composite_mask(base: &RgbaImage, mask: &DynamicImage, tint: Rgb) -> RgbaImage {
    let mask = mask.to_rgba8();
    let mut out = base.clone();
    let (w, h) = base.dimensions();
    let (mw, mh) = mask.dimensions();
    if mw == 0 || mh == 0 {
        return out;
    }

    let tint = Rgba([tint.r, tint.g, tint.b, MASK_ALPHA]);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let mx = scale(x, mw, w);
        let my = scale(y, mh, h);
        if mask.get_pixel(mx, my)[0] > MASK_THRESHOLD {
            px.blend(&tint);
        }
    }
    out
}

/// `floor(i * to / from)`, clamped into `0..to`.
#[allow(clippy::cast_possible_truncation)]
fn scale(i: u32, to: u32, from: u32) -> u32 {
    let scaled = u64::from(i) * u64::from(to) / u64::from(from.max(1));
    (scaled as u32).min(to - 1)
}
