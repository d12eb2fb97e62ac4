use std::fmt;
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};

use crate::errors::{BoxError, EraserError, Result};
use crate::imageops::{flatten, Background};

/// Download formats offered for the processed image.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpg,
    Webp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Png, OutputFormat::Jpg, OutputFormat::Webp];

    pub const fn mime(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub const fn supports_alpha(self) -> bool {
        matches!(self, OutputFormat::Png)
    }

    /// Encoder quality in `0.0..=1.0`; `None` for the lossless format.
    pub const fn quality(self) -> Option<f32> {
        match self {
            OutputFormat::Png => None,
            OutputFormat::Jpg | OutputFormat::Webp => Some(0.92),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = EraserError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpg),
            "webp" => Ok(OutputFormat::Webp),
            other => Err(EraserError::validation(
                "format",
                format!("`{other}` is not one of png, jpg, webp"),
            )),
        }
    }
}

/// Encoded download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Decode `source`, flatten it over `background` as `format` requires, and encode.
#[tracing::instrument(skip(source), fields(bytes = source.len()))]
pub fn compose(source: &[u8], format: OutputFormat, background: Background) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(source).map_err(|e| EraserError::UnsupportedSource {
        reason: e.to_string(),
    })?;
    let flattened = flatten(&decoded.into_rgba8(), background, format.supports_alpha());
    let (width, height) = flattened.dimensions();
    tracing::debug!(width, height, "composed export");

    let encoded = if format.supports_alpha() {
        encode(format, flattened.as_raw(), width, height, ExtendedColorType::Rgba8)
    } else {
        let rgb = DynamicImage::ImageRgba8(flattened).into_rgb8();
        encode(format, rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
    };
    encoded.map_err(|source| EraserError::Encode {
        format: format.to_string(),
        source,
    })
}

/// Quality on the encoders' `0..=100` scale.
fn percent(format: OutputFormat) -> f32 {
    format.quality().map_or(100.0, |q| (q * 100.0).round())
}

fn encode(
    format: OutputFormat,
    pixels: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
) -> std::result::Result<Vec<u8>, BoxError> {
    let mut out = Vec::new();
    match format {
        OutputFormat::Png => PngEncoder::new(&mut out).write_image(pixels, width, height, color)?,
        OutputFormat::Jpg => JpegEncoder::new_with_quality(&mut out, percent(format) as u8)
            .write_image(pixels, width, height, color)?,
        // Only reached with RGB pixels, since WebP exports are flattened.
        OutputFormat::Webp => {
            let memory = webp::Encoder::from_rgb(pixels, width, height)
                .encode_simple(false, percent(format))
                .map_err(|e| format!("webp encoding failed: {e:?}"))?;
            out.extend_from_slice(&memory);
        }
    }
    Ok(out)
}
