// src/plan.rs
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{AssetDetails, AssetId, AssetMetadata, LedgerEvent};

/// A single store write. Zero balances and allowances delete their entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Insert a new asset. Fails with `AssetIdInUse` if the id is taken.
    CreateAsset(AssetDetails),
    /// Overwrite supply and account count of an existing asset.
    PutAsset(AssetDetails),
    SetBalance {
        asset_id: AssetId,
        owner: Uuid,
        balance: u64,
    },
    SetApproval {
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
        amount: u64,
    },
    PutMetadata {
        asset_id: AssetId,
        metadata: AssetMetadata,
    },
    RecordEvent {
        event: LedgerEvent,
        recorded_at: DateTime<Utc>,
    },
}

/// The complete write set of one ledger operation.
///
/// Adapters apply a plan in a single store transaction: either every
/// operation lands or none does.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    operations: Vec<Operation>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, op: Operation) {
        self.operations.push(op);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
