use std::fmt;

use image::{imageops, imageops::FilterType, RgbaImage};
use rayon::prelude::*;

use crate::errors::{EraserError, Result};

/// Something that can render itself as an RGBA mask buffer.
pub trait MaskAdapter: Send + Sync + fmt::Debug {
    fn to_rgba(&self) -> Option<RgbaImage>;
}

/// Interleaved 8-bit pixel data with an explicit channel count, as produced by
/// tensor post-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMask {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

/// Everything a segmentation model may hand back.
#[derive(Debug)]
pub enum MaskResult {
    /// Final RGBA output; background pixels already carry alpha 0.
    Composited(RgbaImage),
    /// A mask drawn into an RGBA buffer; only alpha is meaningful.
    Canvas(RgbaImage),
    Raw(RawMask),
    Adapter(Box<dyn MaskAdapter>),
    /// One result per input image; only the first entry is used.
    Batch(Vec<MaskResult>),
}

impl MaskResult {
    /// Short human-readable description of the shape, for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            MaskResult::Composited(img) => format!("composited {}x{}", img.width(), img.height()),
            MaskResult::Canvas(img) => format!("canvas {}x{}", img.width(), img.height()),
            MaskResult::Raw(raw) => raw.describe(),
            MaskResult::Adapter(adapter) => format!("adapter {adapter:?}"),
            MaskResult::Batch(items) => format!("batch of {}", items.len()),
        }
    }
}

/// A model result after classification.
#[derive(Debug)]
pub enum Resolved {
    /// Publish as is.
    Composited(RgbaImage),
    /// Canonical RGBA mask at the mask's native resolution; its alpha must still be
    /// transferred onto the source.
    Mask(RgbaImage),
}

fn unrecognized(shape: impl Into<String>) -> EraserError {
    let shape = shape.into();
    tracing::error!(%shape, "unrecognized mask result");
    EraserError::UnrecognizedMask { shape }
}

fn first_of(items: Vec<MaskResult>) -> Result<MaskResult> {
    items
        .into_iter()
        .next()
        .ok_or_else(|| unrecognized("empty batch"))
}

/// Decide which finishing branch a model result takes.
pub fn resolve(result: MaskResult) -> Result<Resolved> {
    match result {
        MaskResult::Batch(items) => resolve(first_of(items)?),
        MaskResult::Composited(image) => Ok(Resolved::Composited(image)),
        other => extract_alpha_mask(other).map(Resolved::Mask),
    }
}

/// Normalize any mask shape into a canonical RGBA buffer whose alpha is the opacity.
pub fn extract_alpha_mask(result: MaskResult) -> Result<RgbaImage> {
    match result {
        MaskResult::Composited(image) | MaskResult::Canvas(image) => Ok(image),
        MaskResult::Raw(raw) => raw.into_rgba(),
        MaskResult::Adapter(adapter) => adapter
            .to_rgba()
            .ok_or_else(|| unrecognized(format!("adapter {adapter:?} produced no buffer"))),
        MaskResult::Batch(items) => extract_alpha_mask(first_of(items)?),
    }
}

impl RawMask {
    fn describe(&self) -> String {
        format!(
            "raw {}x{}x{} ({} bytes)",
            self.width,
            self.height,
            self.channels,
            self.data.len()
        )
    }

    pub fn into_rgba(self) -> Result<RgbaImage> {
        let shape = self.describe();
        let pixels = self.width as usize * self.height as usize;
        if self.data.len() != pixels * usize::from(self.channels) {
            return Err(unrecognized(shape));
        }

        let data = match self.channels {
            1 => self.data.iter().flat_map(|&v| [v, v, v, v]).collect(),
            2 => self
                .data
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
            4 => self.data,
            _ => return Err(unrecognized(shape)),
        };

        RgbaImage::from_raw(self.width, self.height, data).ok_or_else(|| unrecognized(shape))
    }
}

/// Render `mask` at `width`x`height` so it lines up with the resized source.
pub fn fit_mask(mask: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if mask.dimensions() == (width, height) {
        mask
    } else {
        imageops::resize(&mask, width, height, FilterType::Triangle)
    }
}

/// Copy the mask's alpha channel onto `source`, leaving colour untouched.
pub fn apply_alpha(source: &RgbaImage, mask: &RgbaImage) -> Result<RgbaImage> {
    if source.dimensions() != mask.dimensions() {
        return Err(EraserError::DimensionMismatch {
            expected: source.dimensions(),
            actual: mask.dimensions(),
        });
    }

    let mut output = source.clone();
    output
        .par_chunks_exact_mut(4)
        .zip(mask.as_raw().par_chunks_exact(4))
        .for_each(|(pixel, mask_pixel)| pixel[3] = mask_pixel[3]);
    Ok(output)
}
