use std::sync::Arc;

use async_trait::async_trait;
use image::{imageops, imageops::FilterType, GrayImage, RgbImage, RgbaImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::{builder::SessionBuilder, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;

use crate::catalog::{Device, ModelInfo, ModelKind};
use crate::errors::{EraserError, Result};
use crate::imageops::{apply_alpha, fit_mask, MaskResult, RawMask};
use crate::traits::{MaskModel, ModelBackend};

/// How an ONNX model shapes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MaskOutput {
    /// Apply the mask inside the model step and return the finished RGBA image.
    #[default]
    Composited,
    /// Return the bare single-channel mask at model resolution.
    Alpha,
}

/// Per-model input normalization: `(x / 255 - mean) / std`.
#[derive(Debug, Clone, Copy)]
struct Normalization {
    mean: f32,
    std: f32,
    /// Square input side used when the graph has a dynamic shape.
    default_size: u32,
}

const fn normalization(kind: ModelKind) -> Normalization {
    match kind {
        ModelKind::Rmbg => Normalization {
            mean: 0.5,
            std: 1.0,
            default_size: 1024,
        },
        ModelKind::Modnet => Normalization {
            mean: 0.5,
            std: 0.5,
            default_size: 512,
        },
    }
}

/// Builds ONNX Runtime sessions. TensorRT and CUDA are tried on the accelerated device.
#[derive(Debug, Clone)]
pub struct OnnxBackend {
    device_id: i32,
    output: MaskOutput,
    accelerated: bool,
}

impl OnnxBackend {
    pub fn new(device_id: i32, output: MaskOutput) -> Self {
        let accelerated = CUDAExecutionProvider::default()
            .with_device_id(device_id)
            .is_available()
            .unwrap_or(false);
        tracing::debug!(device_id, accelerated, "probed execution providers");
        Self {
            device_id,
            output,
            accelerated,
        }
    }

    fn execution_providers(&self, device: Device) -> Vec<ExecutionProviderDispatch> {
        match device {
            Device::Accelerated => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
            ],
            Device::Portable => vec![CPUExecutionProvider::default().build()],
        }
    }
}

#[async_trait]
impl ModelBackend for OnnxBackend {
    fn accelerated_available(&self) -> bool {
        self.accelerated
    }

    async fn construct(
        &self,
        info: &ModelInfo,
        weights: Vec<u8>,
        device: Device,
    ) -> Result<Arc<dyn MaskModel>> {
        let providers = self.execution_providers(device);
        let kind = info.kind;
        let output = self.output;

        let runner = tokio::task::spawn_blocking(move || {
            OnnxRunner::new(kind, &weights, providers)
        })
        .await
        .map_err(|e| EraserError::model("model construction task", e))??;

        Ok(Arc::new(OnnxModel {
            runner: Arc::new(runner),
            output,
        }))
    }
}

struct OnnxRunner {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    image_size: u32,
    normalization: Normalization,
}

impl OnnxRunner {
    fn new(
        kind: ModelKind,
        weights: &[u8],
        providers: Vec<ExecutionProviderDispatch>,
    ) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| EraserError::model("session builder initialization", e))?
            .with_execution_providers(providers)
            .map_err(|e| EraserError::model("execution provider registration", e))?
            .with_memory_pattern(true)
            .map_err(|e| EraserError::model("memory pattern configuration", e))?
            .commit_from_memory(weights)
            .map_err(|e| EraserError::model(format!("loading {kind} weights"), e))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| EraserError::model("model input lookup", "graph has no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| EraserError::model("model output lookup", "graph has no outputs"))?;

        let normalization = normalization(kind);
        let image_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|side| *side > 0)
            .map_or(normalization.default_size, |side| side as u32);
        let input_name = input.name.clone();

        let runner = Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            image_size,
            normalization,
        };

        // A zero tensor warms up the session before it is reported ready.
        let side = image_size as usize;
        runner.run(Array4::<f32>::zeros((1, 3, side, side)))?;
        Ok(runner)
    }

    fn run(&self, tensor: Array4<f32>) -> Result<Array4<f32>> {
        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor)?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }

    fn preprocess(&self, image: &RgbaImage) -> Array4<f32> {
        let rgb: RgbImage = image::DynamicImage::ImageRgba8(image.clone()).into_rgb8();
        let resized = imageops::resize(&rgb, self.image_size, self.image_size, FilterType::Triangle);
        let Normalization { mean, std, .. } = self.normalization;
        resized
            .as_ndarray3()
            .map(|v| (f32::from(*v) / 255.0 - mean) / std)
            .insert_axis(Axis(0))
    }

    /// Min-max normalize the prediction into an 8-bit mask at model resolution.
    fn postprocess(&self, prediction: Array4<f32>) -> Result<GrayImage> {
        let plane = prediction.index_axis_move(Axis(0), 0).index_axis_move(Axis(0), 0);
        let (min, max) = plane
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = if max > min { max - min } else { 1.0 };
        let (height, width) = plane.dim();
        let pixels = plane
            .iter()
            .map(|&v| (((v - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
            EraserError::model("mask post-processing", "prediction does not fit its shape")
        })
    }

    fn segment(&self, image: &RgbaImage, output: MaskOutput) -> Result<MaskResult> {
        let prediction = self.run(self.preprocess(image))?;
        let mask = self.postprocess(prediction)?;

        match output {
            MaskOutput::Alpha => Ok(MaskResult::Raw(RawMask {
                width: mask.width(),
                height: mask.height(),
                channels: 1,
                data: mask.into_raw(),
            })),
            MaskOutput::Composited => {
                let (width, height) = image.dimensions();
                let mask = RawMask {
                    width: mask.width(),
                    height: mask.height(),
                    channels: 1,
                    data: mask.into_raw(),
                }
                .into_rgba()?;
                let composited = apply_alpha(image, &fit_mask(mask, width, height))?;
                Ok(MaskResult::Batch(vec![MaskResult::Composited(composited)]))
            }
        }
    }
}

pub struct OnnxModel {
    runner: Arc<OnnxRunner>,
    output: MaskOutput,
}

#[async_trait]
impl MaskModel for OnnxModel {
    async fn infer(&self, image: &RgbaImage) -> Result<MaskResult> {
        let runner = Arc::clone(&self.runner);
        let output = self.output;
        let image = image.clone();
        tokio::task::spawn_blocking(move || runner.segment(&image, output))
            .await
            .map_err(|e| EraserError::model("inference task", e))?
    }
}
