//! OCR engine loaded on first use.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use boleta_core::error::OcrError;
use boleta_core::models::config::OcrConfig;
use boleta_core::ocr::{PureOcrRecognizer, RawOcrText, ReceiptImage, TextRecognizer};

/// Defers model loading until an image is actually recognized, so
/// transcript-only runs work without model files.
pub struct LazyRecognizer {
    model_dir: PathBuf,
    config: OcrConfig,
    engine: OnceCell<PureOcrRecognizer>,
}

impl LazyRecognizer {
    pub fn new(config: &OcrConfig, model_dir: Option<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.unwrap_or_else(|| config.model_dir.clone()),
            config: config.clone(),
            engine: OnceCell::new(),
        }
    }

    async fn engine(&self) -> Result<&PureOcrRecognizer, OcrError> {
        self.engine
            .get_or_try_init(|| async {
                debug!("Loading OCR models from {}", self.model_dir.display());
                let model_dir = self.model_dir.clone();
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || PureOcrRecognizer::from_dir(&model_dir, &config))
                    .await
                    .map_err(|e| OcrError::ModelLoad(format!("model loading task failed: {}", e)))?
            })
            .await
    }
}

#[async_trait]
impl TextRecognizer for LazyRecognizer {
    async fn recognize(&self, image: ReceiptImage, language: &str) -> Result<RawOcrText, OcrError> {
        self.engine().await?.recognize(image, language).await
    }
}
