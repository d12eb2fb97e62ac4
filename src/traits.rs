use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;

use crate::catalog::{Device, ModelInfo};
use crate::errors::Result;
use crate::imageops::MaskResult;

/// Progress sink: `(percent in [0, 100], status)`. Percent is scoped to one phase.
pub type ProgressFn<'a> = &'a (dyn Fn(f32, &str) + Send + Sync);

/// A constructed, ready-to-run background-removal model.
///
/// Callers classify the result with [`crate::imageops::resolve`].
#[async_trait]
pub trait MaskModel: Send + Sync {
    async fn infer(&self, image: &RgbaImage) -> Result<MaskResult>;
}

/// Builds model instances from weights for a compute device.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Whether the environment advertises an accelerated compute device.
    fn accelerated_available(&self) -> bool;

    async fn construct(
        &self,
        info: &ModelInfo,
        weights: Vec<u8>,
        device: Device,
    ) -> Result<Arc<dyn MaskModel>>;
}

/// Where model weights come from when the cache has no fresh copy.
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn fetch(&self, info: &ModelInfo) -> Result<Vec<u8>>;

    /// Whether fetched weights should be written to the model cache.
    fn cacheable(&self) -> bool {
        true
    }
}
