mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryAdapter;

/// Lossless mapping of unsigned amounts onto signed SQL `BIGINT` columns.
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub(crate) fn to_sql(amount: u64) -> i64 {
    amount as i64
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub(crate) fn from_sql(stored: i64) -> u64 {
    stored as u64
}
