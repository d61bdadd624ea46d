// src/ledger.rs
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, histogram};
use uuid::Uuid;

use crate::{
    AccountBalance, AssetDetails, AssetId, AssetMetadata, EventRecord, ExecutionPlan,
    LedgerAdapter, LedgerConfig, LedgerError, LedgerEvent, LedgerTransaction, Operation,
};

/// The multi-asset ledger.
///
/// Each mutation opens a store transaction that holds the asset, reads the
/// state it needs, validates, and commits a single [`ExecutionPlan`] before
/// releasing it. Writers to one asset are serialized by the store, so a
/// ledger can be shared behind an `Arc` and several ledgers can share a store.
/// Queries see committed plans only.
pub struct AssetLedger {
    adapter: Arc<dyn LedgerAdapter>,
    config: LedgerConfig,
}

/// A mutation, as dispatched through the common commit path.
enum Request {
    Create {
        caller: Uuid,
        min_balance: u64,
    },
    Mint {
        caller: Uuid,
        to: Uuid,
        amount: u64,
    },
    Burn {
        caller: Uuid,
        from: Uuid,
        amount: u64,
    },
    Transfer {
        caller: Uuid,
        to: Uuid,
        amount: u64,
    },
    Approve {
        caller: Uuid,
        spender: Uuid,
        amount: u64,
    },
    Cancel {
        caller: Uuid,
        spender: Uuid,
    },
    TransferFrom {
        caller: Uuid,
        owner: Uuid,
        to: Uuid,
        amount: u64,
    },
    SetMetadata {
        caller: Uuid,
        name: String,
        symbol: String,
        decimals: u8,
    },
}

impl Request {
    fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Mint { .. } => "mint",
            Self::Burn { .. } => "burn",
            Self::Transfer { .. } => "transfer",
            Self::Approve { .. } => "approve_transfer",
            Self::Cancel { .. } => "cancel_approval",
            Self::TransferFrom { .. } => "transfer_from",
            Self::SetMetadata { .. } => "set_metadata",
        }
    }

    /// Units moved, minted or burned.
    fn amount(&self) -> Option<u64> {
        match self {
            Self::Mint { amount, .. }
            | Self::Burn { amount, .. }
            | Self::Transfer { amount, .. }
            | Self::TransferFrom { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

impl AssetLedger {
    pub fn new(adapter: Box<dyn LedgerAdapter>) -> Self {
        Self::with_config(adapter, LedgerConfig::default())
    }

    pub fn with_config(adapter: Box<dyn LedgerAdapter>, config: LedgerConfig) -> Self {
        Self {
            adapter: adapter.into(),
            config,
        }
    }

    pub fn adapter(&self) -> &dyn LedgerAdapter {
        self.adapter.as_ref()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // MUTATIONS

    /// Create asset `asset_id` owned by `caller`.
    pub async fn create(
        &self,
        caller: Uuid,
        asset_id: AssetId,
        min_balance: u64,
    ) -> Result<(), LedgerError> {
        self.execute(asset_id, Request::Create { caller, min_balance })
            .await
    }

    /// Issue `amount` new units to `to`. Owner only.
    pub async fn mint(
        &self,
        caller: Uuid,
        asset_id: AssetId,
        to: Uuid,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.execute(asset_id, Request::Mint { caller, to, amount })
            .await
    }

    /// Destroy `amount` units held by `from`. Owner only.
    pub async fn burn(
        &self,
        caller: Uuid,
        asset_id: AssetId,
        from: Uuid,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.execute(asset_id, Request::Burn { caller, from, amount })
            .await
    }

    /// Move `amount` from the caller to `to`.
    pub async fn transfer(
        &self,
        caller: Uuid,
        asset_id: AssetId,
        to: Uuid,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.execute(asset_id, Request::Transfer { caller, to, amount })
            .await
    }

    /// Allow `spender` to move up to `amount` of the caller's balance.
    /// Replaces any previous allowance for the pair.
    pub async fn approve_transfer(
        &self,
        caller: Uuid,
        asset_id: AssetId,
        spender: Uuid,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.execute(
            asset_id,
            Request::Approve {
                caller,
                spender,
                amount,
            },
        )
        .await
    }

    /// Revoke the allowance granted by the caller to `spender`.
    pub async fn cancel_approval(
        &self,
        caller: Uuid,
        asset_id: AssetId,
        spender: Uuid,
    ) -> Result<(), LedgerError> {
        self.execute(asset_id, Request::Cancel { caller, spender })
            .await
    }

    /// Spend `amount` of `owner`'s allowance to the caller, sending it to `to`.
    pub async fn transfer_from(
        &self,
        caller: Uuid,
        asset_id: AssetId,
        owner: Uuid,
        to: Uuid,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.execute(
            asset_id,
            Request::TransferFrom {
                caller,
                owner,
                to,
                amount,
            },
        )
        .await
    }

    /// Set name, symbol and decimals once. Owner only.
    pub async fn set_metadata(
        &self,
        caller: Uuid,
        asset_id: AssetId,
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Result<(), LedgerError> {
        let request = Request::SetMetadata {
            caller,
            name: name.into(),
            symbol: symbol.into(),
            decimals,
        };
        self.execute(asset_id, request).await
    }

    // READ OPERATIONS

    /// `None` when the asset does not exist.
    pub async fn balance_of(
        &self,
        asset_id: AssetId,
        who: Uuid,
    ) -> Result<Option<u64>, LedgerError> {
        if self.adapter.get_asset(asset_id).await?.is_none() {
            return Ok(None);
        }
        self.adapter.get_balance(asset_id, who).await.map(Some)
    }

    /// `None` when the asset does not exist.
    pub async fn total_supply(&self, asset_id: AssetId) -> Result<Option<u64>, LedgerError> {
        Ok(self.adapter.get_asset(asset_id).await?.map(|a| a.supply))
    }

    pub async fn allowance(
        &self,
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
    ) -> Result<u64, LedgerError> {
        self.adapter.get_approval(asset_id, owner, spender).await
    }

    pub async fn asset(&self, asset_id: AssetId) -> Result<Option<AssetDetails>, LedgerError> {
        self.adapter.get_asset(asset_id).await
    }

    pub async fn accounts(&self, asset_id: AssetId) -> Result<Vec<AccountBalance>, LedgerError> {
        self.adapter.get_accounts(asset_id).await
    }

    pub async fn events(&self, asset_id: AssetId) -> Result<Vec<EventRecord>, LedgerError> {
        self.adapter.get_events(asset_id).await
    }

    pub async fn metadata(&self, asset_id: AssetId) -> Result<Option<AssetMetadata>, LedgerError> {
        self.adapter.get_metadata(asset_id).await
    }

    pub async fn metadata_name(&self, asset_id: AssetId) -> Result<Option<String>, LedgerError> {
        Ok(self.metadata(asset_id).await?.map(|m| m.name))
    }

    pub async fn metadata_symbol(&self, asset_id: AssetId) -> Result<Option<String>, LedgerError> {
        Ok(self.metadata(asset_id).await?.map(|m| m.symbol))
    }

    pub async fn metadata_decimals(&self, asset_id: AssetId) -> Result<Option<u8>, LedgerError> {
        Ok(self.metadata(asset_id).await?.map(|m| m.decimals))
    }
}

// Commit path.
impl AssetLedger {
    async fn execute(&self, asset_id: AssetId, request: Request) -> Result<(), LedgerError> {
        let result = self.run(asset_id, &request).await;
        self.observe(&request, asset_id, &result);
        result
    }

    async fn run(&self, asset_id: AssetId, request: &Request) -> Result<(), LedgerError> {
        let mut tx = self.adapter.begin(asset_id).await?;
        let plan = self.plan(tx.as_mut(), asset_id, request).await?;

        if plan.is_empty() {
            // Nothing to write. Dropping the transaction releases the asset.
            return Ok(());
        }
        tx.commit(&plan).await
    }

    async fn plan(
        &self,
        tx: &mut dyn LedgerTransaction,
        asset_id: AssetId,
        request: &Request,
    ) -> Result<ExecutionPlan, LedgerError> {
        match request {
            Request::Create {
                caller,
                min_balance,
            } => self.plan_create(tx, *caller, asset_id, *min_balance).await,
            Request::Mint { caller, to, amount } => {
                self.plan_mint(tx, *caller, asset_id, *to, *amount).await
            }
            Request::Burn {
                caller,
                from,
                amount,
            } => self.plan_burn(tx, *caller, asset_id, *from, *amount).await,
            Request::Transfer { caller, to, amount } => {
                self.plan_transfer(tx, *caller, asset_id, *to, *amount)
                    .await
            }
            Request::Approve {
                caller,
                spender,
                amount,
            } => {
                self.plan_approve(tx, *caller, asset_id, *spender, *amount)
                    .await
            }
            Request::Cancel { caller, spender } => {
                self.plan_cancel(tx, *caller, asset_id, *spender).await
            }
            Request::TransferFrom {
                caller,
                owner,
                to,
                amount,
            } => {
                self.plan_transfer_from(tx, *caller, asset_id, *owner, *to, *amount)
                    .await
            }
            Request::SetMetadata {
                caller,
                name,
                symbol,
                decimals,
            } => {
                self.plan_set_metadata(
                    tx,
                    *caller,
                    asset_id,
                    name.clone(),
                    symbol.clone(),
                    *decimals,
                )
                .await
            }
        }
    }
}

// Planning: reads through the open transaction plus validation, no writes.
impl AssetLedger {
    async fn plan_create(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
        min_balance: u64,
    ) -> Result<ExecutionPlan, LedgerError> {
        if tx.get_asset(asset_id).await?.is_some() {
            return Err(LedgerError::AssetIdInUse(asset_id));
        }
        let asset = AssetDetails::new(asset_id, caller, min_balance)?;

        let mut plan = ExecutionPlan::new();
        plan.add(Operation::CreateAsset(asset));
        self.record(
            &mut plan,
            LedgerEvent::Created {
                asset_id,
                owner: caller,
                min_balance,
            },
        );
        Ok(plan)
    }

    async fn plan_mint(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
        to: Uuid,
        amount: u64,
    ) -> Result<ExecutionPlan, LedgerError> {
        let mut asset = self.owned_asset(tx, caller, asset_id).await?;
        ensure_amount(amount)?;

        let before = tx.get_balance(asset_id, to).await?;
        let after = asset.credit(before, amount)?;
        asset.supply = asset
            .supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        asset.track_account(before, after)?;

        let mut plan = ExecutionPlan::new();
        plan.add(Operation::SetBalance {
            asset_id,
            owner: to,
            balance: after,
        });
        plan.add(Operation::PutAsset(asset));
        self.record(&mut plan, LedgerEvent::Issued { asset_id, to, amount });
        Ok(plan)
    }

    async fn plan_burn(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
        from: Uuid,
        amount: u64,
    ) -> Result<ExecutionPlan, LedgerError> {
        let mut asset = self.owned_asset(tx, caller, asset_id).await?;
        ensure_amount(amount)?;

        let before = tx.get_balance(asset_id, from).await?;
        let after = asset.debit(before, amount)?;
        asset.supply = asset
            .supply
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;
        asset.track_account(before, after)?;

        let mut plan = ExecutionPlan::new();
        plan.add(Operation::SetBalance {
            asset_id,
            owner: from,
            balance: after,
        });
        plan.add(Operation::PutAsset(asset));
        self.record(&mut plan, LedgerEvent::Burned { asset_id, from, amount });
        Ok(plan)
    }

    async fn plan_transfer(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
        to: Uuid,
        amount: u64,
    ) -> Result<ExecutionPlan, LedgerError> {
        let mut asset = self.load_asset(tx, asset_id).await?;
        ensure_amount(amount)?;

        let balance = tx.get_balance(asset_id, caller).await?;
        if balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }

        let mut plan = ExecutionPlan::new();
        if caller == to {
            return Ok(plan);
        }

        Self::plan_move(tx, &mut plan, &mut asset, caller, balance, to, amount)
            .await?;
        self.record(
            &mut plan,
            LedgerEvent::Transferred {
                asset_id,
                from: caller,
                to,
                amount,
            },
        );
        Ok(plan)
    }

    async fn plan_approve(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
        spender: Uuid,
        amount: u64,
    ) -> Result<ExecutionPlan, LedgerError> {
        self.load_asset(tx, asset_id).await?;

        let mut plan = ExecutionPlan::new();
        plan.add(Operation::SetApproval {
            asset_id,
            owner: caller,
            spender,
            amount,
        });
        self.record(
            &mut plan,
            LedgerEvent::ApprovedTransfer {
                asset_id,
                owner: caller,
                spender,
                amount,
            },
        );
        Ok(plan)
    }

    async fn plan_cancel(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
        spender: Uuid,
    ) -> Result<ExecutionPlan, LedgerError> {
        self.load_asset(tx, asset_id).await?;

        if tx.get_approval(asset_id, caller, spender).await? == 0 {
            return Err(LedgerError::NothingToCancel);
        }

        let mut plan = ExecutionPlan::new();
        plan.add(Operation::SetApproval {
            asset_id,
            owner: caller,
            spender,
            amount: 0,
        });
        self.record(
            &mut plan,
            LedgerEvent::ApprovalCancelled {
                asset_id,
                owner: caller,
                spender,
            },
        );
        Ok(plan)
    }

    async fn plan_transfer_from(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
        owner: Uuid,
        to: Uuid,
        amount: u64,
    ) -> Result<ExecutionPlan, LedgerError> {
        let mut asset = self.load_asset(tx, asset_id).await?;
        ensure_amount(amount)?;

        // Allowance is checked before the owner's balance.
        let allowance = tx.get_approval(asset_id, owner, caller).await?;
        if allowance < amount {
            return Err(LedgerError::Unapproved);
        }

        let balance = tx.get_balance(asset_id, owner).await?;
        if balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }

        let mut plan = ExecutionPlan::new();
        plan.add(Operation::SetApproval {
            asset_id,
            owner,
            spender: caller,
            amount: allowance - amount,
        });
        if owner != to {
            Self::plan_move(tx, &mut plan, &mut asset, owner, balance, to, amount)
                .await?;
        }
        self.record(
            &mut plan,
            LedgerEvent::TransferredApproved {
                asset_id,
                owner,
                spender: caller,
                to,
                amount,
            },
        );
        Ok(plan)
    }

    async fn plan_set_metadata(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
        name: String,
        symbol: String,
        decimals: u8,
    ) -> Result<ExecutionPlan, LedgerError> {
        self.owned_asset(tx, caller, asset_id).await?;

        if tx.get_metadata(asset_id).await?.is_some() {
            return Err(LedgerError::MetadataAlreadySet);
        }
        let metadata = AssetMetadata::new(name, symbol, decimals, self.config.string_limit)?;

        let mut plan = ExecutionPlan::new();
        plan.add(Operation::PutMetadata {
            asset_id,
            metadata: metadata.clone(),
        });
        self.record(
            &mut plan,
            LedgerEvent::MetadataSet {
                asset_id,
                name: metadata.name,
                symbol: metadata.symbol,
                decimals: metadata.decimals,
            },
        );
        Ok(plan)
    }

    /// Debit `from` (currently holding `from_balance`) and credit `to`.
    /// `from` and `to` must differ.
    async fn plan_move(
        tx: &mut dyn LedgerTransaction,
        plan: &mut ExecutionPlan,
        asset: &mut AssetDetails,
        from: Uuid,
        from_balance: u64,
        to: Uuid,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let from_after = asset.debit(from_balance, amount)?;
        let to_before = tx.get_balance(asset.id, to).await?;
        let to_after = asset.credit(to_before, amount)?;

        asset.track_account(from_balance, from_after)?;
        asset.track_account(to_before, to_after)?;

        plan.add(Operation::SetBalance {
            asset_id: asset.id,
            owner: from,
            balance: from_after,
        });
        plan.add(Operation::SetBalance {
            asset_id: asset.id,
            owner: to,
            balance: to_after,
        });
        plan.add(Operation::PutAsset(asset.clone()));
        Ok(())
    }

    async fn load_asset(
        &self,
        tx: &mut dyn LedgerTransaction,
        asset_id: AssetId,
    ) -> Result<AssetDetails, LedgerError> {
        tx.get_asset(asset_id)
            .await?
            .ok_or(LedgerError::AssetNotFound(asset_id))
    }

    async fn owned_asset(
        &self,
        tx: &mut dyn LedgerTransaction,
        caller: Uuid,
        asset_id: AssetId,
    ) -> Result<AssetDetails, LedgerError> {
        let asset = self.load_asset(tx, asset_id).await?;
        if !asset.is_owner(caller) {
            return Err(LedgerError::Unauthorized);
        }
        Ok(asset)
    }

    fn record(&self, plan: &mut ExecutionPlan, event: LedgerEvent) {
        if self.config.record_events {
            plan.add(Operation::RecordEvent {
                event,
                recorded_at: Utc::now(),
            });
        }
    }

    fn observe(&self, request: &Request, asset_id: AssetId, result: &Result<(), LedgerError>) {
        let op = request.name();
        let amount = request.amount();

        counter!("chrema.ledger.operations.total",
            "op" => op,
            "status" => if result.is_ok() { "success" } else { "failed" }
        )
        .increment(1);

        match result {
            Ok(()) => {
                if let Some(amount) = amount {
                    histogram!("chrema.ledger.amount", "op" => op).record(amount as f64);
                }
                tracing::debug!(op, asset_id, ?amount, "ledger operation committed");
            }
            Err(err) => {
                tracing::debug!(op, asset_id, ?amount, %err, "ledger operation rejected");
            }
        }
    }
}

fn ensure_amount(amount: u64) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::AmountZero);
    }
    Ok(())
}
