// src/event.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AssetId;

/// What a successful mutation did, as written to the event journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    Created {
        asset_id: AssetId,
        owner: Uuid,
        min_balance: u64,
    },
    Issued {
        asset_id: AssetId,
        to: Uuid,
        amount: u64,
    },
    Burned {
        asset_id: AssetId,
        from: Uuid,
        amount: u64,
    },
    Transferred {
        asset_id: AssetId,
        from: Uuid,
        to: Uuid,
        amount: u64,
    },
    ApprovedTransfer {
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
        amount: u64,
    },
    ApprovalCancelled {
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
    },
    TransferredApproved {
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
        to: Uuid,
        amount: u64,
    },
    MetadataSet {
        asset_id: AssetId,
        name: String,
        symbol: String,
        decimals: u8,
    },
}

impl LedgerEvent {
    pub fn asset_id(&self) -> AssetId {
        match self {
            Self::Created { asset_id, .. }
            | Self::Issued { asset_id, .. }
            | Self::Burned { asset_id, .. }
            | Self::Transferred { asset_id, .. }
            | Self::ApprovedTransfer { asset_id, .. }
            | Self::ApprovalCancelled { asset_id, .. }
            | Self::TransferredApproved { asset_id, .. }
            | Self::MetadataSet { asset_id, .. } => *asset_id,
        }
    }
}

/// A journalled event. `seq` is assigned by the store and increases with every append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub asset: AssetId,
    pub event: LedgerEvent,
    pub recorded_at: DateTime<Utc>,
}
