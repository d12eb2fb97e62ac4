//! Test doubles for the model seams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::catalog::{Device, ModelInfo, ModelKind};
use crate::errors::{EraserError, Result};
use crate::imageops::{MaskResult, RawMask};
use crate::traits::{MaskModel, ModelBackend, ModelSource};

/// What a [`MockModel`] returns. Foreground is the left half of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// `Batch([Composited])`, like a background-removal pipeline.
    Composited,
    /// A single-channel mask at half resolution, which must be fitted and applied.
    AlphaMask,
    /// An empty batch.
    Unrecognized,
    Fail,
}

/// Opacity of the mock foreground at column `x` of a `width` wide image.
pub fn mock_alpha(x: u32, width: u32) -> u8 {
    if x < width / 2 {
        255
    } else {
        0
    }
}

/// Opens a gate that needs explicit permits, so tests can hold a call at its
/// suspension point.
#[derive(Debug)]
struct Hold {
    enabled: AtomicBool,
    permits: Arc<Semaphore>,
}

impl Default for Hold {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            permits: Arc::new(Semaphore::new(0)),
        }
    }
}

impl Hold {
    async fn pass(&self) {
        if self.enabled.load(Ordering::SeqCst) {
            if let Ok(permit) = self.permits.acquire().await {
                permit.forget();
            }
        }
    }
}

#[derive(Debug)]
pub struct MockModel {
    pub kind: ModelKind,
    behavior: Mutex<MockBehavior>,
    hold: Hold,
    pub inferences: AtomicUsize,
}

impl MockModel {
    pub fn new(kind: ModelKind, behavior: MockBehavior) -> Self {
        Self {
            kind,
            behavior: Mutex::new(behavior),
            hold: Hold::default(),
            inferences: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Block every following `infer` until [`MockModel::release`] grants a permit.
    pub fn hold(&self) {
        self.hold.enabled.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, calls: usize) {
        self.hold.permits.add_permits(calls);
    }
}

#[async_trait]
impl MaskModel for MockModel {
    async fn infer(&self, image: &RgbaImage) -> Result<MaskResult> {
        self.inferences.fetch_add(1, Ordering::SeqCst);
        self.hold.pass().await;

        let (width, height) = image.dimensions();
        let behavior = *self.behavior.lock();
        match behavior {
            MockBehavior::Composited => {
                let mut output = image.clone();
                for (x, _, pixel) in output.enumerate_pixels_mut() {
                    pixel[3] = mock_alpha(x, width);
                }
                Ok(MaskResult::Batch(vec![MaskResult::Composited(output)]))
            }
            MockBehavior::AlphaMask => {
                let (mask_width, mask_height) = ((width / 2).max(1), (height / 2).max(1));
                let data = (0..mask_height)
                    .flat_map(|_| (0..mask_width).map(move |x| mock_alpha(x, mask_width)))
                    .collect();
                Ok(MaskResult::Raw(RawMask {
                    width: mask_width,
                    height: mask_height,
                    channels: 1,
                    data,
                }))
            }
            MockBehavior::Unrecognized => Ok(MaskResult::Batch(Vec::new())),
            MockBehavior::Fail => Err(EraserError::model(
                "mock inference",
                "inference exploded",
            )),
        }
    }
}

#[derive(Debug)]
pub struct MockBackend {
    accelerated: bool,
    behavior: MockBehavior,
    hold: Hold,
    pub fail_construct: AtomicBool,
    pub constructed: AtomicUsize,
    pub devices: Mutex<Vec<Device>>,
    pub weights: Mutex<Vec<Vec<u8>>>,
    last_model: Mutex<Option<Arc<MockModel>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            accelerated: false,
            behavior: MockBehavior::Composited,
            hold: Hold::default(),
            fail_construct: AtomicBool::new(false),
            constructed: AtomicUsize::new(0),
            devices: Mutex::new(Vec::new()),
            weights: Mutex::new(Vec::new()),
            last_model: Mutex::new(None),
        }
    }

    pub fn with_accelerated(mut self, accelerated: bool) -> Self {
        self.accelerated = accelerated;
        self
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn hold_construct(&self) {
        self.hold.enabled.store(true, Ordering::SeqCst);
    }

    pub fn release_construct(&self, calls: usize) {
        self.hold.permits.add_permits(calls);
    }

    pub fn last_model(&self) -> Option<Arc<MockModel>> {
        self.last_model.lock().clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn accelerated_available(&self) -> bool {
        self.accelerated
    }

    async fn construct(
        &self,
        info: &ModelInfo,
        weights: Vec<u8>,
        device: Device,
    ) -> Result<Arc<dyn MaskModel>> {
        self.hold.pass().await;
        if self.fail_construct.load(Ordering::SeqCst) {
            return Err(EraserError::model("mock construct", "no such model"));
        }

        self.constructed.fetch_add(1, Ordering::SeqCst);
        self.devices.lock().push(device);
        self.weights.lock().push(weights);
        let model = Arc::new(MockModel::new(info.kind, self.behavior));
        *self.last_model.lock() = Some(Arc::clone(&model));
        Ok(model)
    }
}

#[derive(Debug, Default)]
pub struct MockSource {
    pub fail: AtomicBool,
    pub fetches: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelSource for MockSource {
    async fn fetch(&self, info: &ModelInfo) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EraserError::Network {
                url: info.remote.to_string(),
                source: "connection refused".into(),
            });
        }
        Ok(format!("weights:{}", info.kind).into_bytes())
    }
}

/// An image whose every pixel is `color`, encoded as PNG.
pub fn png_bytes(width: u32, height: u32, color: Rgba<u8>) -> Result<Vec<u8>> {
    let image = RgbaImage::from_pixel(width, height, color);
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_model_alpha_mask_shape() -> Result<()> {
        let model = MockModel::new(ModelKind::Rmbg, MockBehavior::AlphaMask);
        let result = model.infer(&RgbaImage::new(8, 4)).await?;
        match result {
            MaskResult::Raw(raw) => {
                assert_eq!((raw.width, raw.height, raw.channels), (4, 2, 1));
                assert_eq!(raw.data, vec![255, 255, 0, 0, 255, 255, 0, 0]);
            }
            other => panic!("Expected raw mask, got {}", other.describe()),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_mock_backend_records_device() -> Result<()> {
        let backend = MockBackend::new();
        backend
            .construct(ModelKind::Rmbg.info(), Vec::new(), Device::Portable)
            .await?;
        assert_eq!(*backend.devices.lock(), vec![Device::Portable]);
        assert_eq!(backend.last_model().unwrap().kind, ModelKind::Rmbg);
        Ok(())
    }
}
