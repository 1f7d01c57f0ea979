//! Reconciliation of receipt codes against pending registrations.

mod client;
pub mod cross_check;
mod memory;

pub use client::ReconciliationClient;
pub use cross_check::{compare, AmountCheck, AmountCrossChecker, ExpectedAmountSource, Verdict};
pub use memory::InMemoryRegistrationStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalRejection;
use crate::error::{ErrorKind, StoreError};
use crate::models::candidate::Candidate;

/// Registration backend the pipeline reads candidates from and commits
/// approvals to.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// All registrations referencing `code`. An empty list is not an error.
    async fn find_by_code(&self, code: &str) -> Result<Vec<Candidate>, StoreError>;

    /// Move one registration paid with `code` from pending to approved.
    async fn approve(&self, code: &str, candidate_id: &str) -> Result<(), ApprovalRejection>;
}

/// Result of looking up one receipt code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    /// Code that was searched.
    pub code: String,

    /// Registrations referencing the code, in store order.
    pub candidates: Vec<Candidate>,

    /// Set when the lookup itself failed.
    pub search_error: Option<ErrorKind>,
}

impl ReconciliationOutcome {
    pub fn found(code: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            code: code.into(),
            candidates,
            search_error: None,
        }
    }

    pub fn failed(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            candidates: Vec::new(),
            search_error: Some(ErrorKind::LookupFailed),
        }
    }

    /// Whether an approval may be requested for this outcome.
    pub fn is_approvable(&self) -> bool {
        self.search_error.is_none() && !self.candidates.is_empty()
    }
}
