use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;

use crate::cache::ModelCache;
use crate::catalog::{Device, ModelKind};
use crate::errors::{EraserError, Result};
use crate::imageops::MaskResult;
use crate::traits::{MaskModel, ModelBackend, ModelSource, ProgressFn};

struct Loaded {
    kind: ModelKind,
    instance: Arc<dyn MaskModel>,
}

#[derive(Default)]
struct Slot {
    current: Option<Loaded>,
    /// Bumped by `reset`; a load that started under an older epoch is discarded.
    epoch: u64,
}

/// Owns the single loaded model instance.
///
/// Loads and invocations are serialized through one async gate, so a second
/// `ensure_loaded` for the model already being loaded waits for that attempt and then
/// returns without doing any work.
pub struct ModelManager {
    backend: Arc<dyn ModelBackend>,
    source: Arc<dyn ModelSource>,
    cache: Option<ModelCache>,
    slot: Mutex<Slot>,
    gate: tokio::sync::Mutex<()>,
}

impl ModelManager {
    pub fn new(backend: Arc<dyn ModelBackend>, source: Arc<dyn ModelSource>) -> Self {
        Self {
            backend,
            source,
            cache: None,
            slot: Mutex::new(Slot::default()),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_cache(mut self, cache: ModelCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn accelerated_available(&self) -> bool {
        self.backend.accelerated_available()
    }

    pub fn current(&self) -> Option<ModelKind> {
        self.slot.lock().current.as_ref().map(|loaded| loaded.kind)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().current.is_some()
    }

    /// Make `kind` the loaded model. A no-op, without progress reports, when it already is.
    ///
    /// On failure nothing is left loaded and the error is returned.
    #[tracing::instrument(skip(self, on_progress), fields(model = %kind))]
    pub async fn ensure_loaded(&self, kind: ModelKind, on_progress: ProgressFn<'_>) -> Result<()> {
        if self.current() == Some(kind) {
            return Ok(());
        }

        let _gate = self.gate.lock().await;
        let epoch = {
            let mut slot = self.slot.lock();
            if slot.current.as_ref().map(|loaded| loaded.kind) == Some(kind) {
                return Ok(());
            }
            slot.current = None;
            slot.epoch
        };

        let instance = self.load(kind, on_progress).await.inspect_err(|e| {
            tracing::error!(error = %e, "model load failed");
        })?;

        {
            let mut slot = self.slot.lock();
            if slot.epoch != epoch {
                tracing::debug!("model reset during load, discarding instance");
                return Err(EraserError::model("model load", "superseded by reset"));
            }
            slot.current = Some(Loaded { kind, instance });
        }

        tracing::info!("model ready");
        on_progress(100.0, "Ready");
        Ok(())
    }

    async fn load(&self, kind: ModelKind, on_progress: ProgressFn<'_>) -> Result<Arc<dyn MaskModel>> {
        let info = kind.info();
        on_progress(0.0, "Loading model...");

        let cached = match &self.cache {
            Some(cache) if self.source.cacheable() => cache.get(kind).await,
            _ => None,
        };
        let weights = match cached {
            Some(weights) => {
                on_progress(10.0, &format!("Loading {} from cache...", info.name));
                weights
            }
            None => {
                on_progress(10.0, &format!("Downloading {}...", info.name));
                let weights = self.source.fetch(info).await?;
                if let (Some(cache), true) = (&self.cache, self.source.cacheable()) {
                    cache.put(kind, &weights).await;
                }
                weights
            }
        };

        let device = Device::select(self.backend.accelerated_available());
        tracing::debug!(?device, bytes = weights.len(), "constructing model");
        on_progress(30.0, "Initializing...");
        let instance = self.backend.construct(info, weights, device).await?;
        on_progress(50.0, "Optimizing...");
        Ok(instance)
    }

    /// Run the loaded model on `image`.
    pub async fn invoke(&self, image: &RgbaImage) -> Result<MaskResult> {
        let _gate = self.gate.lock().await;
        let instance = self
            .slot
            .lock()
            .current
            .as_ref()
            .map(|loaded| Arc::clone(&loaded.instance))
            .ok_or(EraserError::ModelNotLoaded)?;
        instance.infer(image).await
    }

    /// Forget the loaded model so the next `ensure_loaded` rebuilds it.
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        slot.current = None;
        slot.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockBackend, MockSource};
    use crate::source::LocalSource;
    use std::sync::atomic::Ordering;

    fn recorder() -> (Arc<Mutex<Vec<(f32, String)>>>, impl Fn(f32, &str) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |p: f32, s: &str| sink.lock().push((p, s.to_string())))
    }

    fn manager() -> (Arc<MockBackend>, Arc<MockSource>, ModelManager) {
        let backend = Arc::new(MockBackend::new());
        let source = Arc::new(MockSource::new());
        let manager = ModelManager::new(backend.clone(), source.clone());
        (backend, source, manager)
    }

    #[tokio::test]
    async fn test_load_reports_monotonic_progress() -> Result<()> {
        let (_, _, manager) = manager();
        let (events, progress) = recorder();

        manager.ensure_loaded(ModelKind::Rmbg, &progress).await?;

        let events = events.lock();
        let percents: Vec<f32> = events.iter().map(|(p, _)| *p).collect();
        assert_eq!(percents, vec![0.0, 10.0, 30.0, 50.0, 100.0]);
        assert_eq!(events[1].1, "Downloading RMBG-1.4...");
        assert_eq!(events.last().unwrap().1, "Ready");
        assert_eq!(manager.current(), Some(ModelKind::Rmbg));
        Ok(())
    }

    #[tokio::test]
    async fn test_same_identity_is_noop() -> Result<()> {
        let (backend, _, manager) = manager();
        manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {}).await?;
        let first = backend.last_model().unwrap();

        let (events, progress) = recorder();
        manager.ensure_loaded(ModelKind::Rmbg, &progress).await?;

        assert!(events.lock().is_empty());
        assert_eq!(backend.constructed.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &backend.last_model().unwrap()));
        Ok(())
    }

    #[tokio::test]
    async fn test_switching_identity_rebuilds() -> Result<()> {
        let (backend, _, manager) = manager();
        manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {}).await?;
        manager.ensure_loaded(ModelKind::Modnet, &|_, _| {}).await?;

        assert_eq!(backend.constructed.load(Ordering::SeqCst), 2);
        assert_eq!(manager.current(), Some(ModelKind::Modnet));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_load_leaves_nothing_loaded() {
        let (backend, _, manager) = manager();
        manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {}).await.unwrap();
        backend.fail_construct.store(true, Ordering::SeqCst);

        let result = manager.ensure_loaded(ModelKind::Modnet, &|_, _| {}).await;

        assert!(result.is_err());
        assert!(!manager.is_loaded());
        assert!(matches!(
            manager.invoke(&RgbaImage::new(1, 1)).await,
            Err(EraserError::ModelNotLoaded)
        ));
    }

    #[tokio::test]
    async fn test_invoke_without_model_is_precondition_error() {
        let (_, _, manager) = manager();
        assert!(matches!(
            manager.invoke(&RgbaImage::new(2, 2)).await,
            Err(EraserError::ModelNotLoaded)
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_identity() -> Result<()> {
        let (backend, _, manager) = manager();
        manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {}).await?;
        manager.reset();
        assert_eq!(manager.current(), None);

        manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {}).await?;
        assert_eq!(backend.constructed.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_loads_fold_into_one() -> Result<()> {
        let (backend, source, manager) = manager();
        backend.hold_construct();

        let first = manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {});
        let second = manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {});
        let release = async {
            tokio::task::yield_now().await;
            backend.release_construct(1);
        };
        let (a, b, ()) = tokio::join!(first, second, release);
        a?;
        b?;

        assert_eq!(backend.constructed.load(Ordering::SeqCst), 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_during_load_discards_instance() {
        let (backend, _, manager) = manager();
        backend.hold_construct();

        let load = manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {});
        let interrupt = async {
            tokio::task::yield_now().await;
            manager.reset();
            backend.release_construct(1);
        };
        let (result, ()) = tokio::join!(load, interrupt);

        assert!(result.is_err());
        assert!(!manager.is_loaded());
    }

    #[tokio::test]
    async fn test_cache_skips_fetch_on_repeat_load() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let backend = Arc::new(MockBackend::new());
        let source = Arc::new(MockSource::new());
        let manager = ModelManager::new(backend.clone(), source.clone())
            .with_cache(ModelCache::new(temp_dir.path()));

        manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {}).await?;
        manager.reset();

        let (events, progress) = recorder();
        manager.ensure_loaded(ModelKind::Rmbg, &progress).await?;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(events.lock()[1].1, "Loading RMBG-1.4 from cache...");
        Ok(())
    }

    #[tokio::test]
    async fn test_local_weights_bypass_cache() -> Result<()> {
        let cache_dir = tempfile::TempDir::new()?;
        let model_dir = tempfile::TempDir::new()?;
        std::fs::write(model_dir.path().join("rmbg.onnx"), b"local-weights")?;
        let cache = ModelCache::new(cache_dir.path());
        cache.put(ModelKind::Rmbg, b"hub-weights").await;

        let backend = Arc::new(MockBackend::new());
        let manager = ModelManager::new(backend.clone(), Arc::new(LocalSource::new(model_dir.path())))
            .with_cache(cache.clone());
        manager.ensure_loaded(ModelKind::Rmbg, &|_, _| {}).await?;

        assert_eq!(*backend.weights.lock(), vec![b"local-weights".to_vec()]);
        assert_eq!(cache.get(ModelKind::Rmbg).await, Some(b"hub-weights".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn test_device_follows_backend_capability() -> Result<()> {
        let backend = Arc::new(MockBackend::new().with_accelerated(true));
        let manager = ModelManager::new(backend.clone(), Arc::new(MockSource::new()));
        manager.ensure_loaded(ModelKind::Modnet, &|_, _| {}).await?;
        assert_eq!(*backend.devices.lock(), vec![Device::Accelerated]);
        Ok(())
    }
}
