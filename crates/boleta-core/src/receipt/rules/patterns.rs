//! Regex patterns for deposit-slip field extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Amount: "TOTAL Bs. 1,234.50", "TOTAL: $us 45.50", "TOTAL 45".
    // Captures the whole numeric token; parse_amount decides whether it reads.
    pub static ref TOTAL_WITH_CURRENCY: Regex = Regex::new(
        r"(?i)\bTOTAL\s*:?\s*(?:(?:Bs|BOB|USD|\$us|\$)\.?\s*)?(\d[\d.,]*)"
    ).unwrap();

    // Looser fallback: tolerates OCR junk between the label and the number
    pub static ref TOTAL_LOOSE: Regex = Regex::new(
        r"(?i)\bTOTAL\b[^\d\n]{0,16}(\d[\d.,]*)"
    ).unwrap();

    // Receipt code: "Cod. AB12XZ", "COD: 99812", "Codigo 7781A."
    pub static ref RECEIPT_CODE: Regex = Regex::new(
        r"(?i)\bCod(?:igo)?(?:\.\s*|:\s*|\s+)[:#]?\s*([A-Z0-9]+)"
    ).unwrap();

    // Deposit date: "Fecha: 03/05/2024", "FECHA 3-5-24"
    pub static ref RECEIPT_DATE: Regex = Regex::new(
        r"(?i)\bFecha\s*:?\s*(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})\b"
    ).unwrap();
}
