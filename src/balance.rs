// src/balance.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AssetId;

/// A non-zero balance entry of one account for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub asset: AssetId,
    pub owner: Uuid,
    pub balance: u64,
}

impl AccountBalance {
    pub fn new(asset: AssetId, owner: Uuid, balance: u64) -> Self {
        Self {
            asset,
            owner,
            balance,
        }
    }
}
