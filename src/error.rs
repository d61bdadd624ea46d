// src/error.rs
use std::fmt;

use crate::AssetId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    AssetIdInUse(AssetId),
    AssetNotFound(AssetId),
    InvalidMinBalance,
    Unauthorized,
    AmountZero,
    InsufficientBalance,
    BelowMinBalance,
    Unapproved,
    NothingToCancel,
    Overflow,
    MetadataAlreadySet,
    BadMetadata,
    Storage(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssetIdInUse(id) => write!(f, "Asset id already in use: {}", id),
            Self::AssetNotFound(id) => write!(f, "Asset not found: {}", id),
            Self::InvalidMinBalance => write!(f, "Minimum balance must be at least 1"),
            Self::Unauthorized => write!(f, "Caller is not the asset owner"),
            Self::AmountZero => write!(f, "Amount must be non-zero"),
            Self::InsufficientBalance => write!(f, "Insufficient balance"),
            Self::BelowMinBalance => write!(f, "Balance would fall below the minimum balance"),
            Self::Unapproved => write!(f, "Transfer exceeds the approved allowance"),
            Self::NothingToCancel => write!(f, "No approval to cancel"),
            Self::Overflow => write!(f, "Arithmetic overflow"),
            Self::MetadataAlreadySet => write!(f, "Metadata already set"),
            Self::BadMetadata => write!(f, "Metadata exceeds the string limit"),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}
