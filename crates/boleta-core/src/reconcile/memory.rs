//! In-process registration store for fixtures and offline runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::approval::ApprovalRejection;
use crate::error::{BoletaError, StoreError};
use crate::models::candidate::{Candidate, RegistrationStatus};

use super::cross_check::ExpectedAmountSource;
use super::RegistrationStore;

/// Fixture file layout accepted by [`InMemoryRegistrationStore::from_json_file`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixtures {
    registrations: Vec<Candidate>,
    orders: HashMap<String, Decimal>,
}

/// Registration store kept in memory.
pub struct InMemoryRegistrationStore {
    registrations: RwLock<Vec<Candidate>>,
    orders: HashMap<String, Decimal>,
    committed: AtomicUsize,
}

impl InMemoryRegistrationStore {
    pub fn new(registrations: Vec<Candidate>) -> Self {
        Self {
            registrations: RwLock::new(registrations),
            orders: HashMap::new(),
            committed: AtomicUsize::new(0),
        }
    }

    /// Load registrations and expected order amounts from a JSON file:
    /// `{"registrations": [...], "orders": {"CODE": "45.50"}}`.
    pub fn from_json_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let fixtures: Fixtures = serde_json::from_str(&content)
            .map_err(|e| BoletaError::Config(format!("{}: {}", path.display(), e)))?;

        let mut store = Self::new(fixtures.registrations);
        store.orders = fixtures.orders;
        Ok(store)
    }

    /// Record the amount the order behind `code` is expected to pay.
    pub fn with_expected_amount(mut self, code: impl Into<String>, amount: Decimal) -> Self {
        self.orders.insert(code.into(), amount);
        self
    }

    /// Overwrite a registration's status, as another operator would.
    pub async fn set_status(&self, candidate_id: &str, status: RegistrationStatus) {
        let mut registrations = self.registrations.write().await;
        if let Some(c) = registrations.iter_mut().find(|c| c.id == candidate_id) {
            c.status = status;
        }
    }

    /// Number of pending-to-approved transitions this store has committed.
    pub fn committed_approvals(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Vec<Candidate> {
        self.registrations.read().await.clone()
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn find_by_code(&self, code: &str) -> Result<Vec<Candidate>, StoreError> {
        let registrations = self.registrations.read().await;
        Ok(registrations
            .iter()
            .filter(|c| c.receipt_code.eq_ignore_ascii_case(code))
            .cloned()
            .collect())
    }

    async fn approve(&self, code: &str, candidate_id: &str) -> Result<(), ApprovalRejection> {
        let mut registrations = self.registrations.write().await;
        let candidate = registrations
            .iter_mut()
            .find(|c| c.id == candidate_id)
            .ok_or(ApprovalRejection::NotFound)?;

        if !candidate.receipt_code.eq_ignore_ascii_case(code) {
            return Err(ApprovalRejection::CodeMismatch);
        }

        match candidate.status {
            RegistrationStatus::Pending => {
                candidate.status = RegistrationStatus::Approved;
                self.committed.fetch_add(1, Ordering::SeqCst);
                debug!("Approved registration {} for receipt {}", candidate_id, code);
                Ok(())
            }
            RegistrationStatus::Approved => Err(ApprovalRejection::AlreadyApproved),
            status => Err(ApprovalRejection::NotPending { status }),
        }
    }
}

#[async_trait]
impl ExpectedAmountSource for InMemoryRegistrationStore {
    async fn expected_amount(&self, code: &str) -> Result<Option<Decimal>, StoreError> {
        Ok(self
            .orders
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(code))
            .map(|(_, v)| *v))
    }
}
