//! Advisory comparison of the parsed amount against the order's expected amount.
//!
//! The verdict is shown to the operator as a warning signal and never
//! blocks an approval.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ErrorKind, StoreError};
use crate::models::candidate::Candidate;

/// Outcome of an amount comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    Mismatch,
    /// One of the amounts is unknown.
    Indeterminate,
}

/// Default tolerance: amounts closer than one cent match.
pub fn default_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Compare a parsed amount with an expected amount using the default tolerance.
pub fn compare(parsed: Option<Decimal>, expected: Option<Decimal>) -> Verdict {
    compare_with_tolerance(parsed, expected, default_tolerance())
}

/// `Match` when `|parsed - expected| < tolerance`.
pub fn compare_with_tolerance(
    parsed: Option<Decimal>,
    expected: Option<Decimal>,
    tolerance: Decimal,
) -> Verdict {
    match (parsed, expected) {
        (Some(parsed), Some(expected)) if (parsed - expected).abs() < tolerance => Verdict::Match,
        (Some(_), Some(_)) => Verdict::Mismatch,
        _ => Verdict::Indeterminate,
    }
}

/// Source of the amount an order is expected to pay.
#[async_trait]
pub trait ExpectedAmountSource: Send + Sync {
    /// Expected amount for the order paid with `code`, if known.
    async fn expected_amount(&self, code: &str) -> Result<Option<Decimal>, StoreError>;
}

/// Sum of the amounts due on `candidates`, when every one of them states one.
pub fn expected_from_candidates(candidates: &[Candidate]) -> Option<Decimal> {
    if candidates.is_empty() {
        return None;
    }
    candidates.iter().map(|c| c.amount_due).sum()
}

/// Result of the cross-check, as surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountCheck {
    pub verdict: Verdict,
    pub parsed: Option<Decimal>,
    pub expected: Option<Decimal>,
    /// `parsed - expected` when both are known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<Decimal>,
}

impl AmountCheck {
    pub fn new(parsed: Option<Decimal>, expected: Option<Decimal>, tolerance: Decimal) -> Self {
        Self {
            verdict: compare_with_tolerance(parsed, expected, tolerance),
            parsed,
            expected,
            difference: parsed.zip(expected).map(|(p, e)| p - e),
        }
    }

    /// Check without any expected amount.
    pub fn indeterminate(parsed: Option<Decimal>) -> Self {
        Self::new(parsed, None, default_tolerance())
    }

    /// The advisory warning to show, if any.
    pub fn warning(&self) -> Option<ErrorKind> {
        (self.verdict == Verdict::Mismatch).then_some(ErrorKind::AmountMismatch)
    }
}

/// Fetches the expected amount (when a source is configured) and compares.
///
/// The source wins; amounts due on the matched registrations are the fallback.
#[derive(Clone)]
pub struct AmountCrossChecker {
    source: Option<Arc<dyn ExpectedAmountSource>>,
    tolerance: Decimal,
}

impl AmountCrossChecker {
    /// A checker without an expected-amount source.
    pub fn new() -> Self {
        Self {
            source: None,
            tolerance: default_tolerance(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ExpectedAmountSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Cross-check `parsed` against the order behind `code`.
    ///
    /// A missing or failing source yields `Indeterminate`.
    pub async fn check(&self, code: &str, parsed: Option<Decimal>) -> AmountCheck {
        self.check_against(code, parsed, None).await
    }

    /// Like [`check`](Self::check), falling back to the amounts due on
    /// `candidates` when the source has no figure for `code`.
    pub async fn check_candidates(
        &self,
        code: &str,
        parsed: Option<Decimal>,
        candidates: &[Candidate],
    ) -> AmountCheck {
        self.check_against(code, parsed, expected_from_candidates(candidates))
            .await
    }

    async fn check_against(
        &self,
        code: &str,
        parsed: Option<Decimal>,
        fallback: Option<Decimal>,
    ) -> AmountCheck {
        let expected = match self.fetch_expected(code).await {
            Some(expected) => Some(expected),
            None => {
                if fallback.is_some() {
                    debug!("Using registration amounts due for receipt {}", code);
                }
                fallback
            }
        };

        let check = AmountCheck::new(parsed, expected, self.tolerance);
        debug!(
            "Amount check for receipt {}: {:?} (parsed {:?}, expected {:?})",
            code, check.verdict, parsed, expected
        );
        check
    }

    async fn fetch_expected(&self, code: &str) -> Option<Decimal> {
        let source = self.source.as_ref()?;
        match source.expected_amount(code).await {
            Ok(expected) => expected,
            Err(e) => {
                warn!("Expected amount for receipt {} unavailable: {}", code, e);
                None
            }
        }
    }
}

impl Default for AmountCrossChecker {
    fn default() -> Self {
        Self::new()
    }
}
