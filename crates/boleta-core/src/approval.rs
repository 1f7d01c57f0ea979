//! Approval coordinator.
//!
//! Commits the approval of every registration matched by a receipt code.
//! The receipt code is the idempotency key: registrations already approved
//! through this coordinator under a code are never sent to the store again.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ApprovalError, ErrorKind};
use crate::models::candidate::RegistrationStatus;
use crate::reconcile::{ReconciliationOutcome, RegistrationStore};

/// Why the store refused to approve one registration.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalRejection {
    #[error("registration is already approved")]
    AlreadyApproved,

    #[error("registration is {status}, not pending")]
    NotPending { status: RegistrationStatus },

    #[error("registration not found")]
    NotFound,

    #[error("registration does not reference this receipt code")]
    CodeMismatch,

    #[error("store rejected the approval: {message}")]
    Store { message: String },
}

impl ApprovalRejection {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}

/// Per-registration result of an approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Approved,
    Failed { reason: ApprovalRejection },
}

impl CandidateOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Result of approving every registration matched by one receipt code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResult {
    /// Receipt code the approval was committed under.
    pub code: String,

    /// Outcome for each matched registration, keyed by registration id.
    pub per_candidate: BTreeMap<String, CandidateOutcome>,
}

impl ApprovalResult {
    /// Ids of the registrations that ended up approved.
    pub fn succeeded(&self) -> Vec<&str> {
        self.per_candidate
            .iter()
            .filter(|(_, o)| o.is_approved())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Ids and reasons of the registrations that could not be approved.
    pub fn failed(&self) -> Vec<(&str, &ApprovalRejection)> {
        self.per_candidate
            .iter()
            .filter_map(|(id, o)| match o {
                CandidateOutcome::Failed { reason } => Some((id.as_str(), reason)),
                CandidateOutcome::Approved => None,
            })
            .collect()
    }

    /// Every registration was approved.
    pub fn is_complete(&self) -> bool {
        self.per_candidate.values().all(CandidateOutcome::is_approved)
    }

    /// No registration was approved.
    pub fn is_total_failure(&self) -> bool {
        !self.per_candidate.values().any(CandidateOutcome::is_approved)
    }

    /// `ApprovalFailed` when at least one registration was refused.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        (!self.is_complete()).then_some(ErrorKind::ApprovalFailed)
    }
}

/// Commits approvals, at most once per registration and receipt code.
pub struct ApprovalCoordinator {
    store: Arc<dyn RegistrationStore>,
    /// Receipt code (upper-cased) -> registrations approved under it.
    ledger: Mutex<HashMap<String, HashSet<String>>>,
}

impl ApprovalCoordinator {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            store,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    /// Approve every registration in `outcome`.
    ///
    /// Trusts `outcome` as the latest lookup for its code and does not
    /// search again. Approvals are serialized across callers.
    pub async fn approve(
        &self,
        outcome: &ReconciliationOutcome,
    ) -> Result<ApprovalResult, ApprovalError> {
        let code = outcome.code.clone();

        if let Some(kind) = outcome.search_error {
            return Err(ApprovalError::Precondition {
                code,
                reason: format!("lookup did not complete ({})", kind),
            });
        }
        if outcome.candidates.is_empty() {
            return Err(ApprovalError::Precondition {
                code,
                reason: "no registrations reference this code".to_string(),
            });
        }

        let mut ledger = self.ledger.lock().await;
        let approved = ledger.entry(ledger_key(&code)).or_default();
        let mut per_candidate = BTreeMap::new();

        for candidate in &outcome.candidates {
            let result = if approved.contains(&candidate.id) {
                debug!(
                    "Registration {} already approved under receipt {}, skipping",
                    candidate.id, code
                );
                CandidateOutcome::Approved
            } else if candidate.status == RegistrationStatus::Approved {
                CandidateOutcome::Failed {
                    reason: ApprovalRejection::AlreadyApproved,
                }
            } else if !candidate.is_pending() {
                CandidateOutcome::Failed {
                    reason: ApprovalRejection::NotPending {
                        status: candidate.status,
                    },
                }
            } else {
                match self.store.approve(&code, &candidate.id).await {
                    Ok(()) => {
                        // Recorded per registration so an interrupted run
                        // never re-sends a committed approval.
                        approved.insert(candidate.id.clone());
                        CandidateOutcome::Approved
                    }
                    Err(reason) => {
                        warn!(
                            "Approval of registration {} under receipt {} refused: {}",
                            candidate.id, code, reason
                        );
                        CandidateOutcome::Failed { reason }
                    }
                }
            };

            per_candidate.insert(candidate.id.clone(), result);
        }

        let result = ApprovalResult {
            code,
            per_candidate,
        };

        info!(
            "Receipt {}: {} approved, {} refused",
            result.code,
            result.succeeded().len(),
            result.failed().len()
        );

        Ok(result)
    }

    /// Registrations approved through this coordinator under `code`.
    pub async fn approved_under(&self, code: &str) -> Vec<String> {
        let ledger = self.ledger.lock().await;
        let mut ids: Vec<String> = ledger
            .get(&ledger_key(code))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Stores match receipt codes case-insensitively, so the ledger does too.
fn ledger_key(code: &str) -> String {
    code.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::candidate::Candidate;
    use crate::reconcile::{InMemoryRegistrationStore, ReconciliationClient};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(id: &str, code: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            receipt_code: code.to_string(),
            status: RegistrationStatus::Pending,
            subject_name: format!("Estudiante {id}"),
            subject_identifier: format!("CI-{id}"),
            offerings: Vec::new(),
            amount_due: None,
        }
    }

    /// Counts every approval request that reaches the store.
    struct CountingStore {
        inner: InMemoryRegistrationStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RegistrationStore for CountingStore {
        async fn find_by_code(&self, code: &str) -> Result<Vec<Candidate>, StoreError> {
            self.inner.find_by_code(code).await
        }

        async fn approve(&self, code: &str, id: &str) -> Result<(), ApprovalRejection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.approve(code, id).await
        }
    }

    #[tokio::test]
    async fn test_second_approval_is_a_no_op() {
        let store = Arc::new(CountingStore {
            inner: InMemoryRegistrationStore::new(vec![candidate("1", "XYZ"), candidate("2", "XYZ")]),
            calls: AtomicUsize::new(0),
        });
        let client = ReconciliationClient::new(store.clone());
        let coordinator = ApprovalCoordinator::new(store.clone());

        let outcome = client.reconcile("XYZ").await;
        let first = coordinator.approve(&outcome).await.unwrap();
        assert!(first.is_complete());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);

        let second = coordinator.approve(&outcome).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.inner.committed_approvals(), 2);
        assert_eq!(coordinator.approved_under("XYZ").await, ["1", "2"]);
    }

    #[tokio::test]
    async fn test_ledger_ignores_code_case() {
        let store = Arc::new(CountingStore {
            inner: InMemoryRegistrationStore::new(vec![candidate("1", "AB12XZ")]),
            calls: AtomicUsize::new(0),
        });
        let client = ReconciliationClient::new(store.clone());
        let coordinator = ApprovalCoordinator::new(store.clone());

        let outcome = client.reconcile("AB12XZ").await;
        assert!(coordinator.approve(&outcome).await.unwrap().is_complete());

        // A later upload read the same code in lower case
        let rescanned = ReconciliationOutcome::found("ab12xz", outcome.candidates.clone());
        let result = coordinator.approve(&rescanned).await.unwrap();

        assert!(result.is_complete());
        assert_eq!(result.error_kind(), None);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.approved_under("ab12xz").await, ["1"]);
    }

    #[tokio::test]
    async fn test_partial_approval_reports_each_candidate() {
        let store = Arc::new(InMemoryRegistrationStore::new(vec![
            candidate("1", "XYZ"),
            candidate("2", "XYZ"),
        ]));
        let client = ReconciliationClient::new(store.clone());
        let coordinator = ApprovalCoordinator::new(store.clone());

        let outcome = client.reconcile("XYZ").await;
        assert_eq!(outcome.candidates.len(), 2);

        // Approved by someone else after the lookup
        store.set_status("2", RegistrationStatus::Approved).await;

        let result = coordinator.approve(&outcome).await.unwrap();

        assert_eq!(result.succeeded(), ["1"]);
        assert_eq!(result.failed(), [("2", &ApprovalRejection::AlreadyApproved)]);
        assert!(!result.is_total_failure());
        assert!(!result.is_complete());
        assert_eq!(result.error_kind(), Some(ErrorKind::ApprovalFailed));
    }

    #[tokio::test]
    async fn test_retry_only_resends_refused_candidates() {
        let store = Arc::new(CountingStore {
            inner: InMemoryRegistrationStore::new(vec![candidate("1", "XYZ"), candidate("2", "XYZ")]),
            calls: AtomicUsize::new(0),
        });
        let client = ReconciliationClient::new(store.clone());
        let coordinator = ApprovalCoordinator::new(store.clone());

        let outcome = client.reconcile("XYZ").await;
        store.inner.set_status("2", RegistrationStatus::Rejected).await;
        coordinator.approve(&outcome).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);

        store.inner.set_status("2", RegistrationStatus::Pending).await;
        let result = coordinator.approve(&outcome).await.unwrap();

        assert!(result.is_complete());
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_pending_candidates_are_not_sent() {
        let mut rejected = candidate("1", "XYZ");
        rejected.status = RegistrationStatus::Rejected;
        let store = Arc::new(CountingStore {
            inner: InMemoryRegistrationStore::new(vec![rejected.clone()]),
            calls: AtomicUsize::new(0),
        });
        let coordinator = ApprovalCoordinator::new(store.clone());

        let outcome = ReconciliationOutcome::found("XYZ", vec![rejected]);
        let result = coordinator.approve(&outcome).await.unwrap();

        assert!(result.is_total_failure());
        assert_eq!(
            result.failed(),
            [(
                "1",
                &ApprovalRejection::NotPending {
                    status: RegistrationStatus::Rejected
                }
            )]
        );
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preconditions() {
        let store = Arc::new(InMemoryRegistrationStore::new(Vec::new()));
        let coordinator = ApprovalCoordinator::new(store);

        let empty = ReconciliationOutcome::found("XYZ", Vec::new());
        assert!(matches!(
            coordinator.approve(&empty).await,
            Err(ApprovalError::Precondition { .. })
        ));

        let failed = ReconciliationOutcome::failed("XYZ");
        assert!(matches!(
            coordinator.approve(&failed).await,
            Err(ApprovalError::Precondition { .. })
        ));
    }

    #[test]
    fn test_result_serialization() {
        let mut per_candidate = BTreeMap::new();
        per_candidate.insert("1".to_string(), CandidateOutcome::Approved);
        per_candidate.insert(
            "2".to_string(),
            CandidateOutcome::Failed {
                reason: ApprovalRejection::AlreadyApproved,
            },
        );
        let result = ApprovalResult {
            code: "XYZ".to_string(),
            per_candidate,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["per_candidate"]["1"]["outcome"], "approved");
        assert_eq!(json["per_candidate"]["2"]["reason"]["kind"], "already_approved");
    }
}
