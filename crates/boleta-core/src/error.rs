//! Error types for the boleta-core library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the boleta library.
#[derive(Error, Debug)]
pub enum BoletaError {
    /// Text recognition error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Registration store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Approval commit error.
    #[error("approval error: {0}")]
    Approval(#[from] ApprovalError),

    /// Pipeline sequencing error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to receipt images and text recognition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OcrError {
    /// The declared media type is not a supported raster image.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The image payload is empty.
    #[error("image payload is empty")]
    EmptyImage,

    /// The payload exceeds the configured upload limit.
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    /// The payload could not be decoded as the declared image type.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Failed to load recognition models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The engine could not produce text.
    #[error("text recognition failed: {0}")]
    Recognition(String),
}

/// Errors raised while talking to the registration store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The store answered with a non-success status.
    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("failed to decode store response: {0}")]
    Decode(String),
}

/// Errors that prevent an approval from being attempted at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// The reconciliation outcome has no candidates or carries a search error.
    #[error("cannot approve receipt {code}: {reason}")]
    Precondition { code: String, reason: String },
}

/// Errors raised by the pipeline controller for out-of-order operator actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// `confirm` was called while no candidates are awaiting confirmation.
    #[error("nothing to confirm in state {0}")]
    NothingToConfirm(&'static str),

    /// `retry_search` was called outside of a failed lookup.
    #[error("nothing to retry in state {0}")]
    NothingToRetry(&'static str),
}

/// Operator-facing error taxonomy of the reconciliation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The recognizer could not produce text.
    RecognitionFailed,
    /// Text was produced but no receipt code matched.
    NoCodeExtracted,
    /// Transport or server error during reconciliation.
    LookupFailed,
    /// The lookup succeeded with an empty result.
    NoCandidatesFound,
    /// The commit was rejected for one or more candidates.
    ApprovalFailed,
    /// Parsed and expected amounts differ. Advisory only.
    AmountMismatch,
}

impl ErrorKind {
    /// Whether the operator may retry the same input.
    ///
    /// `NoCodeExtracted` and `NoCandidatesFound` need a different image instead.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RecognitionFailed | Self::LookupFailed)
    }

    /// Whether the condition blocks further progress in the run.
    pub fn is_blocking(self) -> bool {
        !matches!(self, Self::AmountMismatch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecognitionFailed => "recognition_failed",
            Self::NoCodeExtracted => "no_code_extracted",
            Self::LookupFailed => "lookup_failed",
            Self::NoCandidatesFound => "no_candidates_found",
            Self::ApprovalFailed => "approval_failed",
            Self::AmountMismatch => "amount_mismatch",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for the boleta library.
pub type Result<T> = std::result::Result<T, BoletaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_affordance() {
        assert!(ErrorKind::RecognitionFailed.is_retryable());
        assert!(ErrorKind::LookupFailed.is_retryable());
        assert!(!ErrorKind::NoCodeExtracted.is_retryable());
        assert!(!ErrorKind::NoCandidatesFound.is_retryable());
        assert!(!ErrorKind::AmountMismatch.is_blocking());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::LookupFailed).unwrap();
        assert_eq!(json, "\"lookup_failed\"");
        assert_eq!(ErrorKind::LookupFailed.to_string(), "lookup_failed");
    }
}
