//! Reconciliation client.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::StoreError;
use crate::models::candidate::Candidate;

use super::{ReconciliationOutcome, RegistrationStore};

/// Looks up the registrations referencing a receipt code.
///
/// Performs no retries; retrying is an operator decision.
#[derive(Clone)]
pub struct ReconciliationClient {
    store: Arc<dyn RegistrationStore>,
}

impl ReconciliationClient {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// All registrations referencing `code`, in store order.
    pub async fn find_by_code(&self, code: &str) -> Result<Vec<Candidate>, StoreError> {
        let code = code.trim();
        let candidates = self.store.find_by_code(code).await?;

        let pending = candidates.iter().filter(|c| c.is_pending()).count();
        info!(
            "Receipt {} matched {} registrations ({} pending)",
            code,
            candidates.len(),
            pending
        );

        Ok(candidates)
    }

    /// Look up `code` and fold the result into a [`ReconciliationOutcome`].
    pub async fn reconcile(&self, code: &str) -> ReconciliationOutcome {
        match self.find_by_code(code).await {
            Ok(candidates) => ReconciliationOutcome::found(code.trim(), candidates),
            Err(e) => {
                warn!("Lookup for receipt {} failed: {}", code.trim(), e);
                ReconciliationOutcome::failed(code.trim())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalRejection;
    use crate::error::ErrorKind;
    use crate::models::candidate::RegistrationStatus;
    use crate::reconcile::InMemoryRegistrationStore;
    use async_trait::async_trait;

    struct DownStore;

    #[async_trait]
    impl RegistrationStore for DownStore {
        async fn find_by_code(&self, _code: &str) -> Result<Vec<Candidate>, StoreError> {
            Err(StoreError::Transport("connection refused".to_string()))
        }

        async fn approve(&self, _code: &str, _id: &str) -> Result<(), ApprovalRejection> {
            Err(ApprovalRejection::store("connection refused"))
        }
    }

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

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let store = InMemoryRegistrationStore::new(vec![candidate("1", "OTHER")]);
        let client = ReconciliationClient::new(Arc::new(store));

        let outcome = client.reconcile("XYZ").await;

        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.search_error, None);
        assert!(!outcome.is_approvable());
    }

    #[tokio::test]
    async fn test_multiple_matches_keep_store_order() {
        let store = InMemoryRegistrationStore::new(vec![
            candidate("1", "XYZ"),
            candidate("2", "ABC"),
            candidate("3", "XYZ"),
        ]);
        let client = ReconciliationClient::new(Arc::new(store));

        let found = client.find_by_code(" XYZ ").await.unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_recorded() {
        let client = ReconciliationClient::new(Arc::new(DownStore));

        assert!(client.find_by_code("XYZ").await.is_err());

        let outcome = client.reconcile("XYZ").await;
        assert_eq!(outcome.search_error, Some(ErrorKind::LookupFailed));
        assert!(!outcome.is_approvable());
    }
}
