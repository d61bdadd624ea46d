// src/config.rs
use serde::{Deserialize, Serialize};

/// Ledger tuning knobs. Deserializable so hosts can embed it in their own config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum byte length of a metadata name or symbol.
    pub string_limit: usize,
    /// Append a `LedgerEvent` for every successful mutation.
    pub record_events: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            string_limit: 50,
            record_events: true,
        }
    }
}
