use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::ModelKind;
use crate::export::OutputFormat;
use crate::imageops::{Background, DEFAULT_MAX_DIMENSION};
use crate::onnx::MaskOutput;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Image to remove the background from.
    pub input: PathBuf,

    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Defaults to the last model used, then rmbg.
    #[arg(short, long, value_enum)]
    pub model: Option<ModelKind>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Png)]
    pub format: OutputFormat,

    /// `transparent`, a hex value, rgb()/rgba(), or a CSS color name.
    #[arg(short, long, default_value = "transparent", value_parser = check_background)]
    pub background: Background,

    #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_dimension: u32,

    /// Load `{model}.onnx` from this directory instead of downloading it.
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Defaults to the platform data directory.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(long)]
    pub no_cache: bool,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, value_enum, default_value_t = MaskOutput::Composited)]
    pub mask_output: MaskOutput,
}

impl Config {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            max_dimension: self.max_dimension,
            ..PipelineOptions::default()
        }
    }
}

fn check_background(s: &str) -> Result<Background, String> {
    s.parse::<Background>().map_err(|e| e.to_string())
}

/// Tunables of the processing pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Longest side an image is scaled down to before inference.
    pub max_dimension: u32,
    pub animation_interval: Duration,
    /// Time the synthetic progress takes to reach its cap.
    pub animation_duration: Duration,
    pub animation_cap: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            animation_interval: Duration::from_millis(50),
            animation_duration: Duration::from_secs(5),
            animation_cap: 90.0,
        }
    }
}
