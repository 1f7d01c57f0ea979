//! Receipt code extraction.

use super::patterns::RECEIPT_CODE;
use super::{ExtractionMatch, FieldExtractor};

/// Receipt code field extractor.
pub struct CodeExtractor;

impl CodeExtractor {
    pub const RULE: &'static str = "cod_label";

    pub fn new() -> Self {
        Self
    }
}

impl Default for CodeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for CodeExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        RECEIPT_CODE
            .captures_iter(text)
            .filter_map(|caps| {
                let full_match = caps.get(0)?;
                let code = caps.get(1)?.as_str().to_string();
                Some(
                    ExtractionMatch::new(code, Self::RULE, 0.9, full_match.as_str())
                        .with_position(full_match.start(), full_match.end()),
                )
            })
            .collect()
    }
}
