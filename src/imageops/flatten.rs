use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use super::color::{Background, WHITE};

/// Composite `buffer` over the chosen background.
///
/// A transparent background stays transparent only when the target format can carry
/// alpha; otherwise opaque white is painted underneath.
pub fn flatten(buffer: &RgbaImage, background: Background, supports_alpha: bool) -> RgbaImage {
    let backdrop = match background {
        Background::Transparent if supports_alpha => return buffer.clone(),
        Background::Transparent => WHITE,
        Background::Color(color) => color,
    };

    let mut output = buffer.clone();
    output
        .par_chunks_exact_mut(4)
        .for_each(|pixel| source_over(pixel, backdrop));
    output
}

/// Straight-alpha source-over of `pixel` onto `backdrop`, in place.
fn source_over(pixel: &mut [u8], backdrop: Rgba<u8>) {
    let src_alpha = f32::from(pixel[3]) / 255.0;
    let dst_alpha = f32::from(backdrop[3]) / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);

    if out_alpha <= 0.0 {
        pixel.copy_from_slice(&[0, 0, 0, 0]);
        return;
    }

    for channel in 0..3 {
        let src = f32::from(pixel[channel]) * src_alpha;
        let dst = f32::from(backdrop[channel]) * dst_alpha * (1.0 - src_alpha);
        pixel[channel] = ((src + dst) / out_alpha).round().clamp(0.0, 255.0) as u8;
    }
    pixel[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}
