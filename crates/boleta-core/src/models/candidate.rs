//! Pending registration records as returned by the registration store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A registration that references a receipt code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Store identifier of the registration.
    pub id: String,

    /// Receipt code the registration was paid with.
    pub receipt_code: String,

    /// Current registration status.
    pub status: RegistrationStatus,

    /// Full name of the registered student.
    pub subject_name: String,

    /// Identity document of the registered student.
    pub subject_identifier: String,

    /// Competition areas selected in this registration.
    #[serde(default)]
    pub offerings: Vec<Offering>,

    /// Amount the registration is expected to pay, when the store knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_due: Option<Decimal>,
}

impl Candidate {
    /// Whether the registration can still be approved.
    pub fn is_pending(&self) -> bool {
        self.status == RegistrationStatus::Pending
    }
}

/// Registration lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl Default for RegistrationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A competition area (and level) selected in a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    /// Area name.
    pub area: String,

    /// Level or category within the area.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}
