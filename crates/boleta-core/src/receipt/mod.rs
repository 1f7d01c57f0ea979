//! Receipt field extraction module.

mod parser;
pub mod rules;

pub use parser::{extract, RuleReceiptParser};

use crate::models::receipt::ParsedReceipt;

/// Trait for deposit-slip parsers.
///
/// Parsing is total: fields that no rule supports are left as `None`.
pub trait ReceiptParser: Send + Sync {
    /// Parse receipt fields from recognized text.
    fn parse(&self, text: &str) -> ParsedReceipt;
}
