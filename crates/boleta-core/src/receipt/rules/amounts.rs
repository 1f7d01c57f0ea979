//! Amount extraction for deposit slips.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::{TOTAL_LOOSE, TOTAL_WITH_CURRENCY};
use super::{ExtractionMatch, FieldExtractor};

/// Amount field extractor.
///
/// Tries the labeled `TOTAL <currency>? <number>` rule first and falls back
/// to a looser `TOTAL ... <number>` rule.
pub struct AmountExtractor;

impl AmountExtractor {
    pub const RULE_STRICT: &'static str = "total_with_currency";
    pub const RULE_LOOSE: &'static str = "total_loose";

    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        let rules = [
            (&*TOTAL_WITH_CURRENCY, Self::RULE_STRICT, 0.95),
            (&*TOTAL_LOOSE, Self::RULE_LOOSE, 0.7),
        ];

        for (pattern, rule, confidence) in rules {
            for caps in pattern.captures_iter(text) {
                let (Some(full_match), Some(number)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };

                // Both rules can hit the same label
                if results
                    .iter()
                    .any(|r| r.position.is_some_and(|(start, _)| start == full_match.start()))
                {
                    continue;
                }

                if let Some(amount) = parse_amount(number.as_str()) {
                    results.push(
                        ExtractionMatch::new(amount, rule, confidence, full_match.as_str())
                            .with_position(full_match.start(), full_match.end()),
                    );
                }
            }
        }

        results
    }
}

/// Parse an amount written with `.` as decimal separator and optional `,`
/// thousands separators (e.g. "1,234.50").
///
/// Returns `None` when the digits cannot be read under that convention,
/// such as "1.234,50" or "12,34".
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim().trim_end_matches(['.', ',']);
    if s.is_empty() {
        return None;
    }

    let (integer_part, fraction) = match s.rfind('.') {
        Some(dot) => (&s[..dot], Some(&s[dot + 1..])),
        None => (s, None),
    };

    if fraction.is_some_and(|f| f.contains(',')) {
        return None;
    }

    let mut groups = integer_part.split(',');
    let head = groups.next()?;
    if head.is_empty() {
        return None;
    }
    let mut digits = head.to_string();
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        digits.push_str(group);
    }

    if let Some(fraction) = fraction {
        digits.push('.');
        digits.push_str(fraction);
    }

    Decimal::from_str(&digits).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("45.50"), Some(dec("45.50")));
        assert_eq!(parse_amount("1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("12,345,678.90"), Some(dec("12345678.90")));
        assert_eq!(parse_amount("150"), Some(dec("150")));
        assert_eq!(parse_amount("150."), Some(dec("150")));
    }

    #[test]
    fn test_parse_amount_rejects_other_conventions() {
        assert_eq!(parse_amount("1.234,56"), None);
        assert_eq!(parse_amount("12,34"), None);
        assert_eq!(parse_amount("1.234.56"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_total_with_currency_marker() {
        let extractor = AmountExtractor::new();

        let result = extractor.extract("BANCO UNION\nTOTAL Bs. 1,250.00\n").unwrap();
        assert_eq!(result.value, dec("1250.00"));
        assert_eq!(result.rule, AmountExtractor::RULE_STRICT);

        let result = extractor.extract("TOTAL: $us 45.50").unwrap();
        assert_eq!(result.value, dec("45.50"));
    }

    #[test]
    fn test_total_round_trips_exact_value() {
        let extractor = AmountExtractor::new();

        for n in ["0.01", "45.50", "100", "999.99", "1,000.00", "25000.5"] {
            let text = format!("Deposito\nTOTAL Bs. {n}\nGracias");
            let expected = parse_amount(n).unwrap();
            assert_eq!(extractor.extract(&text).unwrap().value, expected, "amount {n}");
        }
    }

    #[test]
    fn test_unsupported_number_formats_yield_nothing() {
        let extractor = AmountExtractor::new();

        for text in [
            "TOTAL Bs. 1.234,56",
            "TOTAL Bs. 12,34",
            "TOTAL Bs. 1,23,456.00",
            "TOTAL: 1.234.56",
        ] {
            assert!(extractor.extract(text).is_none(), "{text}");
        }
    }

    #[test]
    fn test_sentence_period_after_amount() {
        let extractor = AmountExtractor::new();

        let result = extractor.extract("TOTAL Bs. 45.50.").unwrap();
        assert_eq!(result.value, dec("45.50"));
    }

    #[test]
    fn test_loose_fallback() {
        let extractor = AmountExtractor::new();

        // OCR noise between label and number
        let result = extractor.extract("TOTAL A PAGAR ~~ 320.00").unwrap();
        assert_eq!(result.value, dec("320.00"));
        assert_eq!(result.rule, AmountExtractor::RULE_LOOSE);
    }

    #[test]
    fn test_no_total_label() {
        let extractor = AmountExtractor::new();

        assert!(extractor.extract("Monto 45.50 Bs.").is_none());
        assert!(extractor.extract("SUBTOTAL 45.50").is_none());
        assert!(extractor.extract("").is_none());
    }

    #[test]
    fn test_extract_all_keeps_text_order_per_rule() {
        let extractor = AmountExtractor::new();
        let results = extractor.extract_all("TOTAL Bs. 10.00\nTOTAL Bs. 20.00");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].value, dec("10.00"));
        assert_eq!(results[1].value, dec("20.00"));
    }
}
