//! Recognizer backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

use super::{RawOcrText, ReceiptImage, TextRecognizer};

/// Vertical band (in pixels) within which boxes count as the same line.
const LINE_BAND: f64 = 20.0;

/// Text recognizer running PaddleOCR models through `pure-onnx-ocr`.
pub struct PureOcrRecognizer {
    engine: Arc<pure_onnx_ocr::engine::OcrEngine>,
    keep_unk: bool,
}

impl PureOcrRecognizer {
    /// Load detection, recognition and dictionary files from `config.model_dir`.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        Self::from_dir(&config.model_dir, config)
    }

    /// Load model files named by `config` from `model_dir`.
    pub fn from_dir(model_dir: &Path, config: &OcrConfig) -> Result<Self, OcrError> {
        let det_path = model_dir.join(&config.detection_model);
        let rec_path = model_dir.join(&config.recognition_model);
        let dict_path = model_dir.join(&config.dictionary);

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "missing model file {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", model_dir.display());

        Ok(Self {
            engine: Arc::new(engine),
            keep_unk: config.keep_unk,
        })
    }
}

#[async_trait]
impl TextRecognizer for PureOcrRecognizer {
    async fn recognize(&self, image: ReceiptImage, language: &str) -> Result<RawOcrText, OcrError> {
        debug!(
            "Recognizing {} bytes of {} (language hint {})",
            image.size(),
            image.media_type().mime(),
            language
        );

        let decoded = image.decode()?;
        let engine = Arc::clone(&self.engine);
        let keep_unk = self.keep_unk;

        tokio::task::spawn_blocking(move || run_engine(&engine, &decoded, keep_unk))
            .await
            .map_err(|e| OcrError::Recognition(format!("recognition task failed: {}", e)))?
    }
}

fn run_engine(
    engine: &pure_onnx_ocr::engine::OcrEngine,
    image: &DynamicImage,
    keep_unk: bool,
) -> Result<RawOcrText, OcrError> {
    let start = Instant::now();
    let (width, height) = image.dimensions();

    let results = engine
        .run_from_image(image)
        .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

    let mut lines: Vec<(f64, f64, String)> = results
        .iter()
        .map(|r| {
            let (x, y) = top_left(&r.bounding_box);
            let text = if keep_unk {
                r.text.clone()
            } else {
                r.text.replace("[UNK]", " ")
            };
            (x, y, text)
        })
        .collect();

    // Reading order: top-to-bottom by line band, then left-to-right
    lines.sort_by(|a, b| {
        let row_a = (a.1 / LINE_BAND) as i64;
        let row_b = (b.1 / LINE_BAND) as i64;
        row_a
            .cmp(&row_b)
            .then(a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
    });

    let text = lines
        .into_iter()
        .map(|(_, _, text)| text)
        .collect::<Vec<_>>()
        .join("\n");

    info!(
        "OCR complete on {}x{} image: {} characters in {}ms",
        width,
        height,
        text.len(),
        start.elapsed().as_millis()
    );

    Ok(RawOcrText::new(text))
}

/// Smallest x and y of the box's exterior ring.
fn top_left(polygon: &pure_onnx_ocr::Polygon<f64>) -> (f64, f64) {
    polygon
        .exterior()
        .coords()
        .fold((f64::INFINITY, f64::INFINITY), |(x, y), c| (x.min(c.x), y.min(c.y)))
}
