// src/adapters/sqlite.rs
use std::time::Duration;

use sqlx::{
    Row, Sqlite, SqliteConnection, SqliteExecutor, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use uuid::Uuid;

use super::{from_sql, to_sql};
use crate::{
    AccountBalance, AssetDetails, AssetId, AssetMetadata, EventRecord, ExecutionPlan,
    LedgerAdapter, LedgerError, LedgerEvent, LedgerTransaction, Operation,
};

/// SQLite store. Same layout as the PostgreSQL store, with UUIDs as BLOBs
/// and events as JSON text.
pub struct SqliteAdapter {
    pub(crate) pool: SqlitePool,
}

impl SqliteAdapter {
    /// Create a new SQLite adapter with a file-based database.
    /// Several adapters, or processes, may open the same file.
    pub async fn new_file(path: &str) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Create a new SQLite adapter with an in-memory database
    pub async fn new_memory() -> Result<Self, LedgerError> {
        // Every connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the ledger schema. Safe to call more than once.
    pub async fn init_ledger_schema(&self) -> Result<(), LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS ledger_assets (
                id INTEGER PRIMARY KEY,
                owner BLOB NOT NULL,
                min_balance INTEGER NOT NULL,
                supply INTEGER NOT NULL,
                accounts INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ledger_accounts (
                asset INTEGER NOT NULL,
                owner BLOB NOT NULL,
                balance INTEGER NOT NULL,
                PRIMARY KEY (asset, owner)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ledger_approvals (
                asset INTEGER NOT NULL,
                owner BLOB NOT NULL,
                spender BLOB NOT NULL,
                amount INTEGER NOT NULL,
                PRIMARY KEY (asset, owner, spender)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ledger_metadata (
                asset INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                decimals INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ledger_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                asset INTEGER NOT NULL,
                event TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_ledger_events_asset ON ledger_events(asset, seq)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(())
    }
}

async fn apply(conn: &mut SqliteConnection, op: &Operation) -> Result<(), LedgerError> {
    let query = match op {
        Operation::CreateAsset(asset) => {
            let inserted = sqlx::query(
                r#"
                INSERT INTO ledger_assets (id, owner, min_balance, supply, accounts)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(asset.id as i64)
            .bind(asset.owner)
            .bind(to_sql(asset.min_balance))
            .bind(to_sql(asset.supply))
            .bind(asset.accounts as i64)
            .execute(&mut *conn)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

            if inserted.rows_affected() == 0 {
                return Err(LedgerError::AssetIdInUse(asset.id));
            }
            return Ok(());
        }
        Operation::PutAsset(asset) => {
            sqlx::query("UPDATE ledger_assets SET supply = ?, accounts = ? WHERE id = ?")
                .bind(to_sql(asset.supply))
                .bind(asset.accounts as i64)
                .bind(asset.id as i64)
        }
        Operation::SetBalance {
            asset_id,
            owner,
            balance: 0,
        } => sqlx::query("DELETE FROM ledger_accounts WHERE asset = ? AND owner = ?")
            .bind(*asset_id as i64)
            .bind(*owner),
        Operation::SetBalance {
            asset_id,
            owner,
            balance,
        } => sqlx::query(
            r#"
            INSERT INTO ledger_accounts (asset, owner, balance)
            VALUES (?, ?, ?)
            ON CONFLICT (asset, owner) DO UPDATE SET balance = excluded.balance
            "#,
        )
        .bind(*asset_id as i64)
        .bind(*owner)
        .bind(to_sql(*balance)),
        Operation::SetApproval {
            asset_id,
            owner,
            spender,
            amount: 0,
        } => sqlx::query(
            "DELETE FROM ledger_approvals WHERE asset = ? AND owner = ? AND spender = ?",
        )
        .bind(*asset_id as i64)
        .bind(*owner)
        .bind(*spender),
        Operation::SetApproval {
            asset_id,
            owner,
            spender,
            amount,
        } => sqlx::query(
            r#"
            INSERT INTO ledger_approvals (asset, owner, spender, amount)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (asset, owner, spender) DO UPDATE SET amount = excluded.amount
            "#,
        )
        .bind(*asset_id as i64)
        .bind(*owner)
        .bind(*spender)
        .bind(to_sql(*amount)),
        Operation::PutMetadata { asset_id, metadata } => sqlx::query(
            "INSERT INTO ledger_metadata (asset, name, symbol, decimals) VALUES (?, ?, ?, ?)",
        )
        .bind(*asset_id as i64)
        .bind(metadata.name.as_str())
        .bind(metadata.symbol.as_str())
        .bind(metadata.decimals as i64),
        Operation::RecordEvent { event, recorded_at } => {
            let json =
                serde_json::to_string(event).map_err(|e| LedgerError::Storage(e.to_string()))?;

            sqlx::query("INSERT INTO ledger_events (asset, event, recorded_at) VALUES (?, ?, ?)")
                .bind(event.asset_id() as i64)
                .bind(json)
                .bind(*recorded_at)
        }
    };

    query
        .execute(&mut *conn)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;
    Ok(())
}

fn asset_from_row(row: &SqliteRow) -> Result<AssetDetails, LedgerError> {
    Ok(AssetDetails {
        id: row
            .try_get::<i64, _>("id")
            .map_err(|e| LedgerError::Storage(e.to_string()))? as AssetId,
        owner: row
            .try_get("owner")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        min_balance: from_sql(
            row.try_get("min_balance")
                .map_err(|e| LedgerError::Storage(e.to_string()))?,
        ),
        supply: from_sql(
            row.try_get("supply")
                .map_err(|e| LedgerError::Storage(e.to_string()))?,
        ),
        accounts: row
            .try_get::<i64, _>("accounts")
            .map_err(|e| LedgerError::Storage(e.to_string()))? as u32,
    })
}

async fn fetch_asset<'e>(
    executor: impl SqliteExecutor<'e>,
    asset_id: AssetId,
) -> Result<Option<AssetDetails>, LedgerError> {
    let row = sqlx::query(
        "SELECT id, owner, min_balance, supply, accounts FROM ledger_assets WHERE id = ?",
    )
    .bind(asset_id as i64)
    .fetch_optional(executor)
    .await
    .map_err(|e| LedgerError::Storage(e.to_string()))?;

    row.as_ref().map(asset_from_row).transpose()
}

async fn fetch_balance<'e>(
    executor: impl SqliteExecutor<'e>,
    asset_id: AssetId,
    owner: Uuid,
) -> Result<u64, LedgerError> {
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT balance FROM ledger_accounts WHERE asset = ? AND owner = ?")
            .bind(asset_id as i64)
            .bind(owner)
            .fetch_optional(executor)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

    Ok(balance.map(from_sql).unwrap_or(0))
}

async fn fetch_approval<'e>(
    executor: impl SqliteExecutor<'e>,
    asset_id: AssetId,
    owner: Uuid,
    spender: Uuid,
) -> Result<u64, LedgerError> {
    let amount: Option<i64> = sqlx::query_scalar(
        "SELECT amount FROM ledger_approvals WHERE asset = ? AND owner = ? AND spender = ?",
    )
    .bind(asset_id as i64)
    .bind(owner)
    .bind(spender)
    .fetch_optional(executor)
    .await
    .map_err(|e| LedgerError::Storage(e.to_string()))?;

    Ok(amount.map(from_sql).unwrap_or(0))
}

async fn fetch_metadata<'e>(
    executor: impl SqliteExecutor<'e>,
    asset_id: AssetId,
) -> Result<Option<AssetMetadata>, LedgerError> {
    let row = sqlx::query("SELECT name, symbol, decimals FROM ledger_metadata WHERE asset = ?")
        .bind(asset_id as i64)
        .fetch_optional(executor)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(AssetMetadata {
        name: row
            .try_get("name")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        symbol: row
            .try_get("symbol")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        decimals: row
            .try_get::<i64, _>("decimals")
            .map_err(|e| LedgerError::Storage(e.to_string()))? as u8,
    }))
}

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait::async_trait]
impl LedgerTransaction for SqliteTransaction {
    async fn get_asset(&mut self, asset_id: AssetId) -> Result<Option<AssetDetails>, LedgerError> {
        fetch_asset(&mut *self.tx, asset_id).await
    }

    async fn get_balance(&mut self, asset_id: AssetId, owner: Uuid) -> Result<u64, LedgerError> {
        fetch_balance(&mut *self.tx, asset_id, owner).await
    }

    async fn get_approval(
        &mut self,
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
    ) -> Result<u64, LedgerError> {
        fetch_approval(&mut *self.tx, asset_id, owner, spender).await
    }

    async fn get_metadata(
        &mut self,
        asset_id: AssetId,
    ) -> Result<Option<AssetMetadata>, LedgerError> {
        fetch_metadata(&mut *self.tx, asset_id).await
    }

    async fn commit(self: Box<Self>, plan: &ExecutionPlan) -> Result<(), LedgerError> {
        let mut tx = self.tx;
        for op in plan.operations() {
            apply(&mut tx, op).await?;
        }

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerAdapter for SqliteAdapter {
    async fn begin(&self, asset_id: AssetId) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        // A write as the first statement takes the database write lock, waiting
        // out other writers, before anything is read.
        sqlx::query("UPDATE ledger_assets SET id = id WHERE id = ?")
            .bind(asset_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn get_asset(&self, asset_id: AssetId) -> Result<Option<AssetDetails>, LedgerError> {
        fetch_asset(&self.pool, asset_id).await
    }

    async fn get_balance(&self, asset_id: AssetId, owner: Uuid) -> Result<u64, LedgerError> {
        fetch_balance(&self.pool, asset_id, owner).await
    }

    async fn get_accounts(&self, asset_id: AssetId) -> Result<Vec<AccountBalance>, LedgerError> {
        let rows = sqlx::query(
            "SELECT owner, balance FROM ledger_accounts WHERE asset = ? ORDER BY owner",
        )
        .bind(asset_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| -> Result<AccountBalance, LedgerError> {
                Ok(AccountBalance::new(
                    asset_id,
                    row.try_get("owner")
                        .map_err(|e| LedgerError::Storage(e.to_string()))?,
                    from_sql(
                        row.try_get("balance")
                            .map_err(|e| LedgerError::Storage(e.to_string()))?,
                    ),
                ))
            })
            .collect()
    }

    async fn get_approval(
        &self,
        asset_id: AssetId,
        owner: Uuid,
        spender: Uuid,
    ) -> Result<u64, LedgerError> {
        fetch_approval(&self.pool, asset_id, owner, spender).await
    }

    async fn get_metadata(
        &self,
        asset_id: AssetId,
    ) -> Result<Option<AssetMetadata>, LedgerError> {
        fetch_metadata(&self.pool, asset_id).await
    }

    async fn get_events(&self, asset_id: AssetId) -> Result<Vec<EventRecord>, LedgerError> {
        let rows = sqlx::query(
            "SELECT seq, event, recorded_at FROM ledger_events WHERE asset = ? ORDER BY seq",
        )
        .bind(asset_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| -> Result<EventRecord, LedgerError> {
                let json: String = row
                    .try_get("event")
                    .map_err(|e| LedgerError::Storage(e.to_string()))?;
                let event: LedgerEvent = serde_json::from_str(&json)
                    .map_err(|e| LedgerError::Storage(e.to_string()))?;

                Ok(EventRecord {
                    seq: row
                        .try_get::<i64, _>("seq")
                        .map_err(|e| LedgerError::Storage(e.to_string()))?
                        as u64,
                    asset: asset_id,
                    event,
                    recorded_at: row
                        .try_get("recorded_at")
                        .map_err(|e| LedgerError::Storage(e.to_string()))?,
                })
            })
            .collect()
    }
}
