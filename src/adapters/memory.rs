// src/adapters/memory.rs
use crate::{
    AccountBalance, AssetDetails, AssetId, AssetMetadata, EventRecord, ExecutionPlan,
    LedgerAdapter, LedgerError, LedgerTransaction, Operation,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct MemoryStore {
    assets: HashMap<AssetId, AssetDetails>,
    accounts: BTreeMap<(AssetId, Uuid), u64>,
    approvals: HashMap<(AssetId, Uuid, Uuid), u64>,
    metadata: HashMap<AssetId, AssetMetadata>,
    events: Vec<EventRecord>,
}

impl MemoryStore {
    fn check(&self, op: &Operation) -> Result<(), LedgerError> {
        match op {
            Operation::CreateAsset(asset) if self.assets.contains_key(&asset.id) => {
                Err(LedgerError::AssetIdInUse(asset.id))
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, op: &Operation) {
        match op {
            Operation::CreateAsset(asset) | Operation::PutAsset(asset) => {
                self.assets.insert(asset.id, asset.clone());
            }
            Operation::SetBalance {
                asset_id,
                owner,
                balance,
            } => {
                if *balance == 0 {
                    self.accounts.remove(&(*asset_id, *owner));
                } else {
                    self.accounts.insert((*asset_id, *owner), *balance);
                }
            }
            Operation::SetApproval {
                asset_id,
                owner,
                spender,
                amount,
            } => {
                if *amount == 0 {
                    self.approvals.remove(&(*asset_id, *owner, *spender));
                } else {
                    self.approvals.insert((*asset_id, *owner, *spender), *amount);
                }
            }
            Operation::PutMetadata { asset_id, metadata } => {
                self.metadata.insert(*asset_id, metadata.clone());
            }
            Operation::RecordEvent { event, recorded_at } => {
                let seq = self.events.len() as u64 + 1;
                self.events.push(EventRecord {
                    seq,
                    asset: event.asset_id(),
                    event: event.clone(),
                    recorded_at: *recorded_at,
                });
            }
        }
    }

    fn balance(&self, asset_id: AssetId, owner: Uuid) -> u64 {
        self.accounts.get(&(asset_id, owner)).copied().unwrap_or(0)
    }

    fn approval(&self, asset_id: AssetId, owner: Uuid, spender: Uuid) -> u64 {
        self.approvals
            .get(&(asset_id, owner, spender))
            .copied()
            .unwrap_or(0)
    }
}

/// In-process store. Clones share the same state.
///
/// A write transaction holds the whole store, so writers are serialized
/// across every ledger sharing it.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTransaction {
    store: OwnedRwLockWriteGuard<MemoryStore>,
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn get_asset(&mut self, asset_id: AssetId) -> Result<Option<AssetDetails>, LedgerError> {
        Ok(self.store.assets.get(&asset_id).cloned())
    }

    async fn get_balance(&mut self, asset_id: AssetId, owner: Uuid) -> Result<u64, LedgerError> {
        Ok(self.store.balance(asset_id, owner))
    }

    async fn get_approval(
        &mut self,
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
    ) -> Result<u64, LedgerError> {
        Ok(self.store.approval(asset_id, owner, spender))
    }

    async fn get_metadata(
        &mut self,
        asset_id: AssetId,
    ) -> Result<Option<AssetMetadata>, LedgerError> {
        Ok(self.store.metadata.get(&asset_id).cloned())
    }

    async fn commit(self: Box<Self>, plan: &ExecutionPlan) -> Result<(), LedgerError> {
        let mut store = self.store;
        for op in plan.operations() {
            store.check(op)?;
        }
        for op in plan.operations() {
            store.apply(op);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerAdapter for MemoryAdapter {
    async fn begin(&self, _asset_id: AssetId) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let store = Arc::clone(&self.store).write_owned().await;
        Ok(Box::new(MemoryTransaction { store }))
    }

    async fn get_asset(&self, asset_id: AssetId) -> Result<Option<AssetDetails>, LedgerError> {
        Ok(self.store.read().await.assets.get(&asset_id).cloned())
    }

    async fn get_balance(&self, asset_id: AssetId, owner: Uuid) -> Result<u64, LedgerError> {
        Ok(self.store.read().await.balance(asset_id, owner))
    }

    async fn get_accounts(&self, asset_id: AssetId) -> Result<Vec<AccountBalance>, LedgerError> {
        Ok(self
            .store
            .read()
            .await
            .accounts
            .iter()
            .filter(|((asset, _), _)| *asset == asset_id)
            .map(|((asset, owner), balance)| AccountBalance::new(*asset, *owner, *balance))
            .collect())
    }

    async fn get_approval(
        &self,
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
    ) -> Result<u64, LedgerError> {
        Ok(self.store.read().await.approval(asset_id, owner, spender))
    }

    async fn get_metadata(
        &self,
        asset_id: AssetId,
    ) -> Result<Option<AssetMetadata>, LedgerError> {
        Ok(self.store.read().await.metadata.get(&asset_id).cloned())
    }

    async fn get_events(&self, asset_id: AssetId) -> Result<Vec<EventRecord>, LedgerError> {
        Ok(self
            .store
            .read()
            .await
            .events
            .iter()
            .filter(|record| record.asset == asset_id)
            .cloned()
            .collect())
    }
}
