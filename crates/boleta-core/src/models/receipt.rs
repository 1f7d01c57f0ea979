//! Structured data parsed from a deposit slip.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Display format used for receipt dates (`03/05/2024`).
pub const RECEIPT_DATE_FORMAT: &str = "%d/%m/%Y";

/// Fields extracted from the recognized text of one deposit slip.
///
/// A field is `None` only when no pattern matched it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    /// Deposited amount.
    pub amount: Option<Decimal>,

    /// Receipt code printed on the slip, used as the reconciliation key.
    pub receipt_code: Option<String>,

    /// Deposit date.
    pub receipt_date: Option<NaiveDate>,

    /// Which rule produced each field, and from what text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<FieldEvidence>,
}

impl ParsedReceipt {
    /// Whether no field could be extracted at all.
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.receipt_code.is_none() && self.receipt_date.is_none()
    }

    /// Receipt date rendered as `DD/MM/YYYY`.
    pub fn formatted_date(&self) -> Option<String> {
        self.receipt_date
            .map(|d| d.format(RECEIPT_DATE_FORMAT).to_string())
    }

    /// Names of the fields that could not be extracted.
    pub fn missing_fields(&self) -> Vec<ReceiptField> {
        let mut missing = Vec::new();
        if self.amount.is_none() {
            missing.push(ReceiptField::Amount);
        }
        if self.receipt_code.is_none() {
            missing.push(ReceiptField::ReceiptCode);
        }
        if self.receipt_date.is_none() {
            missing.push(ReceiptField::ReceiptDate);
        }
        missing
    }
}

/// A field of [`ParsedReceipt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptField {
    Amount,
    ReceiptCode,
    ReceiptDate,
}

impl std::fmt::Display for ReceiptField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Amount => "amount",
            Self::ReceiptCode => "receipt_code",
            Self::ReceiptDate => "receipt_date",
        };
        f.write_str(name)
    }
}

/// Audit record of a single field match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEvidence {
    /// Field the match was assigned to.
    pub field: ReceiptField,

    /// Name of the rule that matched.
    pub rule: String,

    /// Matched source text.
    pub matched: String,

    /// Byte range of the match in the raw text.
    pub position: (usize, usize),
}
