// src/adapters/postgres.rs
use sqlx::{
    PgConnection, PgExecutor, PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json,
};
use uuid::Uuid;

use super::{from_sql, to_sql};
use crate::{
    AccountBalance, AssetDetails, AssetId, AssetMetadata, EventRecord, ExecutionPlan,
    LedgerAdapter, LedgerError, LedgerEvent, LedgerTransaction, Operation,
};

/// PostgreSQL store.
///
/// Schema:
/// ```sql
/// CREATE TABLE ledger_assets (
///     id BIGINT PRIMARY KEY,
///     owner UUID NOT NULL,
///     min_balance BIGINT NOT NULL,
///     supply BIGINT NOT NULL,
///     accounts BIGINT NOT NULL
/// );
/// CREATE TABLE ledger_accounts (
///     asset BIGINT NOT NULL REFERENCES ledger_assets(id),
///     owner UUID NOT NULL,
///     balance BIGINT NOT NULL,
///     PRIMARY KEY (asset, owner)
/// );
/// CREATE TABLE ledger_approvals (
///     asset BIGINT NOT NULL REFERENCES ledger_assets(id),
///     owner UUID NOT NULL,
///     spender UUID NOT NULL,
///     amount BIGINT NOT NULL,
///     PRIMARY KEY (asset, owner, spender)
/// );
/// CREATE TABLE ledger_metadata (
///     asset BIGINT PRIMARY KEY REFERENCES ledger_assets(id),
///     name TEXT NOT NULL,
///     symbol TEXT NOT NULL,
///     decimals SMALLINT NOT NULL
/// );
/// CREATE TABLE ledger_events (
///     seq BIGSERIAL PRIMARY KEY,
///     asset BIGINT NOT NULL,
///     event JSONB NOT NULL,
///     recorded_at TIMESTAMPTZ NOT NULL
/// );
/// ```
///
/// Amount columns hold the two's-complement image of the `u64` value.
pub struct PostgresAdapter {
    pub(crate) pool: PgPool,
}

impl PostgresAdapter {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn get_pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// Initialize the ledger schema. Safe to call more than once.
    pub async fn init_ledger_schema(&self) -> Result<(), LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_assets (
                id BIGINT PRIMARY KEY,
                owner UUID NOT NULL,
                min_balance BIGINT NOT NULL,
                supply BIGINT NOT NULL,
                accounts BIGINT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_accounts (
                asset BIGINT NOT NULL REFERENCES ledger_assets(id),
                owner UUID NOT NULL,
                balance BIGINT NOT NULL,
                PRIMARY KEY (asset, owner)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_approvals (
                asset BIGINT NOT NULL REFERENCES ledger_assets(id),
                owner UUID NOT NULL,
                spender UUID NOT NULL,
                amount BIGINT NOT NULL,
                PRIMARY KEY (asset, owner, spender)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_metadata (
                asset BIGINT PRIMARY KEY REFERENCES ledger_assets(id),
                name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                decimals SMALLINT NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_events (
                seq BIGSERIAL PRIMARY KEY,
                asset BIGINT NOT NULL,
                event JSONB NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_ledger_events_asset
            ON ledger_events(asset, seq)
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(())
    }
}

async fn apply(conn: &mut PgConnection, op: &Operation) -> Result<(), LedgerError> {
    match op {
        Operation::CreateAsset(asset) => {
            let inserted = sqlx::query(
                r#"
                INSERT INTO ledger_assets (id, owner, min_balance, supply, accounts)
                VALUES ($1, $2, $3, $4, $5)
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
        }
        Operation::PutAsset(asset) => {
            sqlx::query("UPDATE ledger_assets SET supply = $2, accounts = $3 WHERE id = $1")
                .bind(asset.id as i64)
                .bind(to_sql(asset.supply))
                .bind(asset.accounts as i64)
                .execute(&mut *conn)
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }
        Operation::SetBalance {
            asset_id,
            owner,
            balance: 0,
        } => {
            sqlx::query("DELETE FROM ledger_accounts WHERE asset = $1 AND owner = $2")
                .bind(*asset_id as i64)
                .bind(*owner)
                .execute(&mut *conn)
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }
        Operation::SetBalance {
            asset_id,
            owner,
            balance,
        } => {
            sqlx::query(
                r#"
                INSERT INTO ledger_accounts (asset, owner, balance)
                VALUES ($1, $2, $3)
                ON CONFLICT (asset, owner) DO UPDATE SET balance = $3
                "#,
            )
            .bind(*asset_id as i64)
            .bind(*owner)
            .bind(to_sql(*balance))
            .execute(&mut *conn)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }
        Operation::SetApproval {
            asset_id,
            owner,
            spender,
            amount: 0,
        } => {
            sqlx::query(
                "DELETE FROM ledger_approvals WHERE asset = $1 AND owner = $2 AND spender = $3",
            )
            .bind(*asset_id as i64)
            .bind(*owner)
            .bind(*spender)
            .execute(&mut *conn)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }
        Operation::SetApproval {
            asset_id,
            owner,
            spender,
            amount,
        } => {
            sqlx::query(
                r#"
                INSERT INTO ledger_approvals (asset, owner, spender, amount)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (asset, owner, spender) DO UPDATE SET amount = $4
                "#,
            )
            .bind(*asset_id as i64)
            .bind(*owner)
            .bind(*spender)
            .bind(to_sql(*amount))
            .execute(&mut *conn)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }
        Operation::PutMetadata { asset_id, metadata } => {
            sqlx::query(
                r#"
                INSERT INTO ledger_metadata (asset, name, symbol, decimals)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(*asset_id as i64)
            .bind(metadata.name.as_str())
            .bind(metadata.symbol.as_str())
            .bind(metadata.decimals as i16)
            .execute(&mut *conn)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }
        Operation::RecordEvent { event, recorded_at } => {
            sqlx::query(
                r#"
                INSERT INTO ledger_events (asset, event, recorded_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(event.asset_id() as i64)
            .bind(Json(event))
            .bind(*recorded_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        }
    }
    Ok(())
}

fn asset_from_row(row: &PgRow) -> Result<AssetDetails, LedgerError> {
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
    executor: impl PgExecutor<'e>,
    asset_id: AssetId,
) -> Result<Option<AssetDetails>, LedgerError> {
    let row = sqlx::query(
        r#"
        SELECT id, owner, min_balance, supply, accounts
        FROM ledger_assets
        WHERE id = $1
        "#,
    )
    .bind(asset_id as i64)
    .fetch_optional(executor)
    .await
    .map_err(|e| LedgerError::Storage(e.to_string()))?;

    row.as_ref().map(asset_from_row).transpose()
}

async fn fetch_balance<'e>(
    executor: impl PgExecutor<'e>,
    asset_id: AssetId,
    owner: Uuid,
) -> Result<u64, LedgerError> {
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT balance FROM ledger_accounts WHERE asset = $1 AND owner = $2")
            .bind(asset_id as i64)
            .bind(owner)
            .fetch_optional(executor)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

    Ok(balance.map(from_sql).unwrap_or(0))
}

async fn fetch_approval<'e>(
    executor: impl PgExecutor<'e>,
    asset_id: AssetId,
    owner: Uuid,
    spender: Uuid,
) -> Result<u64, LedgerError> {
    let amount: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT amount FROM ledger_approvals
        WHERE asset = $1 AND owner = $2 AND spender = $3
        "#,
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
    executor: impl PgExecutor<'e>,
    asset_id: AssetId,
) -> Result<Option<AssetMetadata>, LedgerError> {
    let row = sqlx::query("SELECT name, symbol, decimals FROM ledger_metadata WHERE asset = $1")
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
            .try_get::<i16, _>("decimals")
            .map_err(|e| LedgerError::Storage(e.to_string()))? as u8,
    }))
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl LedgerTransaction for PostgresTransaction {
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

        // Dropping `tx` on an early return rolls the whole plan back.
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
impl LedgerAdapter for PostgresAdapter {
    async fn begin(&self, asset_id: AssetId) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        // Writers to one asset queue on its row until the holder commits.
        sqlx::query("SELECT id FROM ledger_assets WHERE id = $1 FOR UPDATE")
            .bind(asset_id as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_asset(&self, asset_id: AssetId) -> Result<Option<AssetDetails>, LedgerError> {
        fetch_asset(&self.pool, asset_id).await
    }

    async fn get_balance(&self, asset_id: AssetId, owner: Uuid) -> Result<u64, LedgerError> {
        fetch_balance(&self.pool, asset_id, owner).await
    }

    async fn get_accounts(&self, asset_id: AssetId) -> Result<Vec<AccountBalance>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT owner, balance
            FROM ledger_accounts
            WHERE asset = $1
            ORDER BY owner
            "#,
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
            r#"
            SELECT seq, asset, event, recorded_at
            FROM ledger_events
            WHERE asset = $1
            ORDER BY seq
            "#,
        )
        .bind(asset_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| -> Result<EventRecord, LedgerError> {
                let Json(event) = row
                    .try_get::<Json<LedgerEvent>, _>("event")
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
