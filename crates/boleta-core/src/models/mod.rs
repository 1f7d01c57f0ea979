//! Data models shared across the reconciliation pipeline.

pub mod candidate;
pub mod config;
pub mod receipt;
