//! Pipeline states and state-change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalResult;
use crate::error::ErrorKind;
use crate::models::receipt::ParsedReceipt;
use crate::reconcile::{AmountCheck, ReconciliationOutcome};

/// State of the current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    /// No run in progress.
    Idle,

    /// Waiting for the recognizer.
    Extracting,

    /// Fields extracted from the recognized text.
    Parsed { receipt: ParsedReceipt },

    /// Waiting for the registration lookup.
    Searching { receipt: ParsedReceipt, code: String },

    /// Registrations found; waiting for the operator to confirm.
    Found {
        receipt: ParsedReceipt,
        outcome: ReconciliationOutcome,
        amount_check: AmountCheck,
    },

    /// Nothing to approve for this image.
    NotFound {
        receipt: ParsedReceipt,
        reason: NotFoundReason,
    },

    /// The lookup failed; the operator may retry it.
    SearchError {
        receipt: ParsedReceipt,
        code: String,
        message: String,
    },

    /// Waiting for the approval commit.
    Approving { outcome: ReconciliationOutcome },

    /// At least one registration was approved.
    Approved { result: ApprovalResult },

    /// No registration could be approved.
    ApprovalError {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<ApprovalResult>,
    },

    /// The recognizer failed; the operator may resubmit.
    ExtractionError { message: String },
}

/// Why a run ended in [`PipelineState::NotFound`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotFoundReason {
    /// The text contained no receipt code to search with.
    NoCodeExtracted,
    /// The code was searched and no registration references it.
    NoCandidates { code: String },
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Parsed { .. } => "parsed",
            Self::Searching { .. } => "searching",
            Self::Found { .. } => "found",
            Self::NotFound { .. } => "not_found",
            Self::SearchError { .. } => "search_error",
            Self::Approving { .. } => "approving",
            Self::Approved { .. } => "approved",
            Self::ApprovalError { .. } => "approval_error",
            Self::ExtractionError { .. } => "extraction_error",
        }
    }

    /// Whether the run has ended and only a new submission moves it on.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::SearchError { .. }
                | Self::Approved { .. }
                | Self::ApprovalError { .. }
                | Self::ExtractionError { .. }
        )
    }

    /// Whether a suspended step is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Extracting | Self::Searching { .. } | Self::Approving { .. }
        )
    }

    /// The receipt parsed in this run, if parsing has happened.
    pub fn receipt(&self) -> Option<&ParsedReceipt> {
        match self {
            Self::Parsed { receipt }
            | Self::Searching { receipt, .. }
            | Self::Found { receipt, .. }
            | Self::NotFound { receipt, .. }
            | Self::SearchError { receipt, .. } => Some(receipt),
            _ => None,
        }
    }

    /// The condition to report to the operator, including advisory ones.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::ExtractionError { .. } => Some(ErrorKind::RecognitionFailed),
            Self::NotFound {
                reason: NotFoundReason::NoCodeExtracted,
                ..
            } => Some(ErrorKind::NoCodeExtracted),
            Self::NotFound {
                reason: NotFoundReason::NoCandidates { .. },
                ..
            } => Some(ErrorKind::NoCandidatesFound),
            Self::SearchError { .. } => Some(ErrorKind::LookupFailed),
            Self::Found { amount_check, .. } => amount_check.warning(),
            Self::Approved { result } => result.error_kind(),
            Self::ApprovalError { .. } => Some(ErrorKind::ApprovalFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Event emitted on every applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// Generation of the run the transition belongs to.
    pub run: u64,
    /// New state.
    pub state: PipelineState,
    /// When the transition was applied.
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_and_in_flight_states() {
        assert!(PipelineState::Extracting.is_in_flight());
        assert!(!PipelineState::Extracting.is_terminal());
        assert!(!PipelineState::Idle.is_terminal());

        let not_found = PipelineState::NotFound {
            receipt: ParsedReceipt::default(),
            reason: NotFoundReason::NoCodeExtracted,
        };
        assert!(not_found.is_terminal());
        assert_eq!(not_found.error_kind(), Some(ErrorKind::NoCodeExtracted));
        assert_eq!(not_found.name(), "not_found");
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let state = PipelineState::NotFound {
            receipt: ParsedReceipt::default(),
            reason: NotFoundReason::NoCandidates {
                code: "XYZ".to_string(),
            },
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "not_found");
        assert_eq!(json["reason"]["reason"], "no_candidates");
        assert_eq!(json["reason"]["code"], "XYZ");
    }
}
