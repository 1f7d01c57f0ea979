//! Text extraction adapter.
//!
//! The recognition engine is an external collaborator: the pipeline only
//! depends on [`TextRecognizer`], which turns one [`ReceiptImage`] into one
//! [`RawOcrText`].

#[cfg(feature = "native")]
mod pure_engine;

#[cfg(feature = "native")]
pub use pure_engine::PureOcrRecognizer;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::OcrError;

/// Raster image types accepted for deposit slips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tiff,
    Gif,
}

impl MediaType {
    /// Parse a MIME type such as `image/jpeg; charset=binary`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::Webp),
            "image/bmp" | "image/x-ms-bmp" => Some(Self::Bmp),
            "image/tiff" => Some(Self::Tiff),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Infer the media type from a file name extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        ImageFormat::from_path(path).ok().and_then(Self::from_format)
    }

    pub fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::WebP => Some(Self::Webp),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Webp => ImageFormat::WebP,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
            Self::Gif => ImageFormat::Gif,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Gif => "image/gif",
        }
    }
}

/// An uploaded photograph of a deposit slip.
///
/// Consumed once by the recognizer and never persisted.
#[derive(Debug, Clone)]
pub struct ReceiptImage {
    bytes: Vec<u8>,
    media_type: MediaType,
}

impl ReceiptImage {
    /// Wrap an upload, rejecting empty payloads and non-raster media types.
    pub fn new(bytes: Vec<u8>, media_type: &str) -> Result<Self, OcrError> {
        let media_type = MediaType::from_mime(media_type)
            .ok_or_else(|| OcrError::UnsupportedMediaType(media_type.to_string()))?;
        Self::with_media_type(bytes, media_type)
    }

    pub fn with_media_type(bytes: Vec<u8>, media_type: MediaType) -> Result<Self, OcrError> {
        if bytes.is_empty() {
            return Err(OcrError::EmptyImage);
        }
        Ok(Self { bytes, media_type })
    }

    /// Read an image file, taking the media type from its extension.
    pub fn from_path(path: &std::path::Path) -> crate::Result<Self> {
        let media_type = MediaType::from_path(path).ok_or_else(|| {
            OcrError::UnsupportedMediaType(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_string(),
            )
        })?;
        let bytes = std::fs::read(path)?;
        Ok(Self::with_media_type(bytes, media_type)?)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Reject payloads larger than `limit` bytes. A limit of 0 disables the check.
    pub fn ensure_within(self, limit: usize) -> Result<Self, OcrError> {
        if limit > 0 && self.size() > limit {
            return Err(OcrError::TooLarge {
                size: self.size(),
                limit,
            });
        }
        Ok(self)
    }

    /// Decode the payload using the declared media type.
    pub fn decode(&self) -> Result<DynamicImage, OcrError> {
        image::load_from_memory_with_format(&self.bytes, self.media_type.image_format())
            .map_err(|e| OcrError::InvalidImage(format!("{}: {}", self.media_type.mime(), e)))
    }
}

/// Text produced by the recognizer for one image. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawOcrText(String);

impl RawOcrText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the recognizer produced no visible characters.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for RawOcrText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image-to-text recognition engine.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text printed on `image`.
    ///
    /// `language` is a hint such as `"spa"`; engines with a fixed dictionary
    /// may ignore it.
    async fn recognize(&self, image: ReceiptImage, language: &str) -> Result<RawOcrText, OcrError>;
}
