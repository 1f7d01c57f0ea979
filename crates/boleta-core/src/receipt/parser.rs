//! Rule-based receipt parser.

use tracing::{debug, info};

use crate::models::receipt::{FieldEvidence, ParsedReceipt, ReceiptField};

use super::rules::{AmountExtractor, CodeExtractor, DateExtractor, ExtractionMatch, FieldExtractor};
use super::ReceiptParser;

/// Parse a deposit slip with the default rule set.
pub fn extract(raw_text: &str) -> ParsedReceipt {
    RuleReceiptParser::new().parse(raw_text)
}

/// Receipt parser built from ordered pattern rules; first match wins per field.
pub struct RuleReceiptParser {
    amounts: AmountExtractor,
    codes: CodeExtractor,
    dates: DateExtractor,
}

impl RuleReceiptParser {
    pub fn new() -> Self {
        Self {
            amounts: AmountExtractor::new(),
            codes: CodeExtractor::new(),
            dates: DateExtractor::new(),
        }
    }
}

impl Default for RuleReceiptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiptParser for RuleReceiptParser {
    fn parse(&self, text: &str) -> ParsedReceipt {
        debug!("Parsing receipt from {} characters of text", text.len());

        let mut evidence = Vec::new();

        let amount = self
            .amounts
            .extract(text)
            .map(|m| record(&mut evidence, ReceiptField::Amount, m));
        let receipt_code = self
            .codes
            .extract(text)
            .map(|m| record(&mut evidence, ReceiptField::ReceiptCode, m));
        let receipt_date = self
            .dates
            .extract(text)
            .map(|m| record(&mut evidence, ReceiptField::ReceiptDate, m));

        let receipt = ParsedReceipt {
            amount,
            receipt_code,
            receipt_date,
            evidence,
        };

        info!(
            "Parsed receipt: code={:?} amount={:?} date={:?}",
            receipt.receipt_code, receipt.amount, receipt.receipt_date
        );

        receipt
    }
}

fn record<T>(evidence: &mut Vec<FieldEvidence>, field: ReceiptField, m: ExtractionMatch<T>) -> T {
    evidence.push(FieldEvidence {
        field,
        rule: m.rule.to_string(),
        matched: m.source,
        position: m.position.unwrap_or_default(),
    });
    m.value
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_parse_sample_slip() {
        let text = "TOTAL Bs. 45.50 ... Cod. AB12XZ ... Fecha: 03/05/2024";

        let receipt = extract(text);

        assert_eq!(receipt.amount, Some(Decimal::from_str("45.50").unwrap()));
        assert_eq!(receipt.receipt_code.as_deref(), Some("AB12XZ"));
        assert_eq!(receipt.receipt_date, NaiveDate::from_ymd_opt(2024, 5, 3));
        assert_eq!(receipt.formatted_date().as_deref(), Some("03/05/2024"));
    }

    #[test]
    fn test_parse_noisy_multiline_slip() {
        let text = r#"
            BANCO UNION S.A.
            DEPOSITO EN CUENTA
            Cuenta: 1-0000045812
            Cod.: OLI2024X7.
            Fecha: 12-3-24  Hora: 10:41
            Depositante: MAMANI QUISPE
            TOTAL   Bs 1,150.00
        "#;

        let receipt = extract(text);

        assert_eq!(receipt.amount, Some(Decimal::from_str("1150.00").unwrap()));
        assert_eq!(receipt.receipt_code.as_deref(), Some("OLI2024X7"));
        assert_eq!(receipt.receipt_date, NaiveDate::from_ymd_opt(2024, 3, 12));
        assert_eq!(receipt.evidence.len(), 3);
        assert_eq!(receipt.evidence[1].field, ReceiptField::ReceiptCode);
        assert_eq!(receipt.evidence[1].rule, CodeExtractor::RULE);
    }

    #[test]
    fn test_unsupported_amount_formats_give_no_amount() {
        let receipt = extract("TOTAL Bs. 1.234,56\nCod. AB12XZ\nFecha: 03/05/2024");

        assert_eq!(receipt.amount, None);
        assert_eq!(receipt.receipt_code.as_deref(), Some("AB12XZ"));
        assert_eq!(receipt.receipt_date, NaiveDate::from_ymd_opt(2024, 5, 3));
        assert!(receipt.missing_fields().contains(&ReceiptField::Amount));

        assert_eq!(extract("TOTAL Bs. 12,34").amount, None);
        assert_eq!(extract("TOTAL Bs. 1,23,456.00").amount, None);
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let receipt = extract("Comprobante ilegible 12 34 xx");

        assert_eq!(receipt, ParsedReceipt::default());
        assert_eq!(receipt.missing_fields().len(), 3);
    }

    #[test]
    fn test_empty_text() {
        assert!(extract("").is_empty());
    }
}
