// src/metadata.rs
use serde::{Deserialize, Serialize};

use crate::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl AssetMetadata {
    /// Build metadata, rejecting a name or symbol longer than `string_limit` bytes.
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
        string_limit: usize,
    ) -> Result<Self, LedgerError> {
        let name = name.into();
        let symbol = symbol.into();

        if name.len() > string_limit || symbol.len() > string_limit {
            return Err(LedgerError::BadMetadata);
        }

        Ok(Self {
            name,
            symbol,
            decimals,
        })
    }
}
