use std::path::PathBuf;

use async_trait::async_trait;

use crate::catalog::ModelInfo;
use crate::errors::{EraserError, Result};
use crate::traits::ModelSource;

const HUB_BASE_URL: &str = "https://huggingface.co";
/// The 8-bit quantized export every catalog model ships with.
const QUANTIZED_WEIGHTS: &str = "onnx/model_quantized.onnx";

/// Downloads weights from the Hugging Face hub.
#[derive(Debug, Clone)]
pub struct HubSource {
    client: reqwest::Client,
    base_url: String,
}

impl HubSource {
    pub fn new() -> Self {
        Self::with_base_url(HUB_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn weights_url(&self, info: &ModelInfo) -> String {
        format!(
            "{}/{}/resolve/main/{}",
            self.base_url.trim_end_matches('/'),
            info.remote,
            QUANTIZED_WEIGHTS
        )
    }
}

impl Default for HubSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelSource for HubSource {
    #[tracing::instrument(skip(self), fields(model = %info.kind))]
    async fn fetch(&self, info: &ModelInfo) -> Result<Vec<u8>> {
        let url = self.weights_url(info);
        tracing::info!(%url, "downloading model weights");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| EraserError::Network {
                url: url.clone(),
                source: Box::new(e),
            })?;
        let bytes = response.bytes().await.map_err(|e| EraserError::Network {
            url,
            source: Box::new(e),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Reads `{id}.onnx` from a local directory; nothing is written to the cache.
#[derive(Debug, Clone)]
pub struct LocalSource {
    dir: PathBuf,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ModelSource for LocalSource {
    async fn fetch(&self, info: &ModelInfo) -> Result<Vec<u8>> {
        let path = self.dir.join(format!("{}.onnx", info.kind.id()));
        tokio::fs::read(&path)
            .await
            .map_err(|e| EraserError::FileSystem {
                path,
                operation: "model weights read".to_string(),
                source: e,
            })
    }

    fn cacheable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelKind;
    use tempfile::TempDir;

    #[test]
    fn test_hub_url_points_at_quantized_weights() {
        let source = HubSource::with_base_url("https://example.test/");
        assert_eq!(
            source.weights_url(ModelKind::Rmbg.info()),
            "https://example.test/briaai/RMBG-1.4/resolve/main/onnx/model_quantized.onnx"
        );
    }

    #[tokio::test]
    async fn test_local_source_reads_by_identity() -> Result<()> {
        let temp_dir = TempDir::new()?;
        std::fs::write(temp_dir.path().join("modnet.onnx"), b"onnx")?;

        let source = LocalSource::new(temp_dir.path());
        assert_eq!(source.fetch(ModelKind::Modnet.info()).await?, b"onnx");
        assert!(!source.cacheable());

        let missing = source.fetch(ModelKind::Rmbg.info()).await;
        assert!(matches!(missing, Err(EraserError::FileSystem { .. })));
        Ok(())
    }
}
