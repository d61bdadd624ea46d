//! # Chrema
//!
//! *χρῆμα, "a thing one uses"; in the plural, money and goods.*
//!
//! Chrema is a multi-asset fungible ledger. It creates independent asset
//! classes, tracks per-account balances and total supply for each, and
//! supports owner-mediated minting and burning plus a two-phase
//! approve / transfer-from delegation flow.
//!
//! Every mutation is validated against current state, turned into a complete
//! [`ExecutionPlan`] and committed through the same [`LedgerTransaction`] it
//! was validated in. Nothing is half-applied, and concurrent writers to one
//! asset never see each other's intermediate state.
//!
//! ```rust,ignore
//! use chrema::{AssetLedger, adapters::MemoryAdapter};
//!
//! let ledger = AssetLedger::new(Box::new(MemoryAdapter::new()));
//! ledger.create(alice, 1, 1).await?;
//! ledger.mint(alice, 1, alice, 1_000).await?;
//! ledger.approve_transfer(alice, 1, bob, 100).await?;
//! ledger.transfer_from(bob, 1, alice, charlie, 50).await?;
//!
//! assert_eq!(ledger.allowance(1, alice, bob).await?, 50);
//! ```
//!
//! ## Invariants
//!
//! For every asset, at all times:
//! - `supply` equals the sum of all account balances;
//! - every stored balance is at least the asset's `min_balance`;
//! - `accounts` equals the number of non-zero balances.
//!
//! ## Feature flags
//!
//! | Flag       | Default | Description                         |
//! |------------|---------|-------------------------------------|
//! | `postgres` | ✓       | PostgreSQL adapter via sqlx         |
//! | `sqlite`   | ✓       | SQLite adapter (in-memory or file)  |

pub mod adapters;
pub mod asset;
pub mod balance;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod metadata;
pub mod plan;

pub use asset::{AssetDetails, AssetId};
pub use balance::AccountBalance;
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use event::{EventRecord, LedgerEvent};
pub use ledger::AssetLedger;
pub use metadata::AssetMetadata;
pub use plan::{ExecutionPlan, Operation};

use async_trait::async_trait;
use uuid::Uuid;

/// Storage seam of the ledger.
///
/// Mutations run inside a [`LedgerTransaction`] opened with [`begin`]. The
/// store itself serializes writers per asset, so any number of ledgers,
/// in one process or many, can share a store.
///
/// [`begin`]: LedgerAdapter::begin
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Open a write transaction holding `asset_id` exclusively.
    /// Implementors MUST take the lock before the transaction's first read and
    /// keep it until the transaction is committed or dropped. A store that
    /// cannot lock an asset that does not exist yet MUST fail a conflicting
    /// [`Operation::CreateAsset`] at commit with `AssetIdInUse` instead.
    async fn begin(&self, asset_id: AssetId) -> Result<Box<dyn LedgerTransaction>, LedgerError>;

    // READ OPERATIONS (committed state)
    async fn get_asset(&self, asset_id: AssetId) -> Result<Option<AssetDetails>, LedgerError>;
    /// Zero when no entry exists.
    async fn get_balance(&self, asset_id: AssetId, owner: Uuid) -> Result<u64, LedgerError>;
    /// Non-zero entries of the asset, ordered by owner.
    async fn get_accounts(&self, asset_id: AssetId) -> Result<Vec<AccountBalance>, LedgerError>;
    /// Zero when no entry exists.
    async fn get_approval(
        &self,
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
    ) -> Result<u64, LedgerError>;
    async fn get_metadata(&self, asset_id: AssetId)
    -> Result<Option<AssetMetadata>, LedgerError>;
    /// Journalled events of the asset, ordered by `seq`.
    async fn get_events(&self, asset_id: AssetId) -> Result<Vec<EventRecord>, LedgerError>;
}

/// A write transaction opened by [`LedgerAdapter::begin`].
///
/// Reads see the latest committed state. Dropping the transaction without
/// committing discards it.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn get_asset(&mut self, asset_id: AssetId) -> Result<Option<AssetDetails>, LedgerError>;
    async fn get_balance(&mut self, asset_id: AssetId, owner: Uuid) -> Result<u64, LedgerError>;
    async fn get_approval(
        &mut self,
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
    ) -> Result<u64, LedgerError>;
    async fn get_metadata(
        &mut self,
        asset_id: AssetId,
    ) -> Result<Option<AssetMetadata>, LedgerError>;

    /// Apply the complete plan and commit.
    /// Implementors MUST apply the operations in order and either commit all
    /// of them or none.
    async fn commit(self: Box<Self>, plan: &ExecutionPlan) -> Result<(), LedgerError>;
}
