//! Core library for reconciling bank deposit slips with pending registrations.
//!
//! This crate provides:
//! - Text extraction from receipt photographs (pure Rust OCR behind the `native` feature)
//! - Rule-based extraction of amount, receipt code and date from noisy OCR text
//! - Registration lookup and approval against a pluggable store
//! - Advisory cross-check of the paid amount against the order
//! - A cancellable pipeline controller sequencing all of the above

pub mod approval;
pub mod error;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod receipt;
pub mod reconcile;

pub use approval::{ApprovalCoordinator, ApprovalRejection, ApprovalResult, CandidateOutcome};
pub use error::{BoletaError, ErrorKind, Result};
pub use models::candidate::{Candidate, Offering, RegistrationStatus};
pub use models::config::BoletaConfig;
pub use models::receipt::{ParsedReceipt, ReceiptField};
pub use ocr::{MediaType, RawOcrText, ReceiptImage, TextRecognizer};
#[cfg(feature = "native")]
pub use ocr::PureOcrRecognizer;
pub use pipeline::{NotFoundReason, PipelineBuilder, PipelineController, PipelineState, RunOutcome, StateChange};
pub use receipt::{extract, ReceiptParser, RuleReceiptParser};
pub use reconcile::{
    AmountCheck, AmountCrossChecker, ExpectedAmountSource, InMemoryRegistrationStore,
    ReconciliationClient, ReconciliationOutcome, RegistrationStore, Verdict,
};
