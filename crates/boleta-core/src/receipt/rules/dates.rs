//! Deposit date extraction.

use chrono::NaiveDate;

use super::patterns::RECEIPT_DATE;
use super::{ExtractionMatch, FieldExtractor};

/// Labeled `Fecha:` date extractor (day first).
pub struct DateExtractor;

impl DateExtractor {
    pub const RULE: &'static str = "fecha_label";

    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for caps in RECEIPT_DATE.captures_iter(text) {
            let Some(full_match) = caps.get(0) else {
                continue;
            };

            if let Some(date) = parse_receipt_date(&caps[1], &caps[2], &caps[3]) {
                results.push(
                    ExtractionMatch::new(date, Self::RULE, 0.9, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                );
            }
        }

        results
    }
}

/// Build a date from day, month and year digits.
///
/// Returns `None` for impossible calendar dates and three-digit years.
pub fn parse_receipt_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year = parse_year(year)?;

    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    match s.len() {
        // Two-digit year: assume 2000s for 00-50, 1900s for 51-99
        2 if year <= 50 => Some(2000 + year),
        2 => Some(1900 + year),
        4 => Some(year),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> Option<NaiveDate> {
        DateExtractor::new().extract(text).map(|m| m.value)
    }

    #[test]
    fn test_extract_labeled_date() {
        assert_eq!(date("Fecha: 03/05/2024"), NaiveDate::from_ymd_opt(2024, 5, 3));
        assert_eq!(date("FECHA 3-5-2024"), NaiveDate::from_ymd_opt(2024, 5, 3));
        assert_eq!(date("fecha:15/11/23"), NaiveDate::from_ymd_opt(2023, 11, 15));
    }

    #[test]
    fn test_two_digit_year() {
        assert_eq!(parse_receipt_date("1", "1", "99"), NaiveDate::from_ymd_opt(1999, 1, 1));
        assert_eq!(parse_receipt_date("1", "1", "50"), NaiveDate::from_ymd_opt(2050, 1, 1));
    }

    #[test]
    fn test_unsupported_dates_are_absent() {
        assert_eq!(date("Fecha: 31/02/2024"), None);
        assert_eq!(date("Fecha: 03/05/202"), None);
        assert_eq!(date("03/05/2024"), None);
        assert_eq!(date("Fecha de pago pendiente"), None);
    }

    #[test]
    fn test_skips_invalid_then_takes_next() {
        assert_eq!(
            date("Fecha: 40/40/2024\nFecha: 01/06/2024"),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
    }
}
