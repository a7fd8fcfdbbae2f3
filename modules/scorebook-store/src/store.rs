//! The store capability trait.
//!
//! Writers depend on this trait, not on a concrete client, so the same code
//! runs against Redis in production and against [`crate::MemoryStore`] in
//! tests. The method set is exactly what the writers need: hash, set and
//! sorted-set primitives, TTL strings, scan, snapshot control, and one
//! optimistic transaction shape.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// A mutation queued inside an optimistic transaction. The plan closure of
/// [`Store::score_txn`] returns these; the store applies them atomically.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    HSet { key: String, field: String, value: f64 },
    HDel { key: String, field: String },
    ZIncrBy { key: String, member: String, delta: f64 },
}

/// Result of one optimistic transaction attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxnOutcome {
    /// The watched hash field as it was read inside the transaction.
    pub stored: Option<f64>,
    /// False when the plan declared the event a no-op.
    pub applied: bool,
}

/// Plan callback for [`Store::score_txn`]: receives the stored value and
/// returns the mutations to apply, or `None` when nothing has to change.
pub type ScorePlan<'a> = dyn Fn(Option<f64>) -> Option<Vec<StoreOp>> + Send + Sync + 'a;

#[async_trait]
pub trait Store: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;
    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError>;
    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn setex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn getset(&self, key: &str, value: &str) -> Result<Option<String>, StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// All keys matching `pattern`, collected from a full scan pass.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Background snapshot. An already-running background save counts as
    /// success.
    async fn bgsave(&self) -> Result<(), StoreError>;
    /// Synchronous snapshot.
    async fn save(&self) -> Result<(), StoreError>;
    /// Epoch seconds of the last completed snapshot.
    async fn last_save(&self) -> Result<i64, StoreError>;

    /// Optimistic read-modify-write on one hash field: watch `key`, read
    /// `field` as a float, and atomically apply whatever `plan` returns for
    /// that value. A concurrent write to `key` between the read and the
    /// commit fails the attempt with [`StoreError::TxAborted`]; the caller
    /// decides whether to retry.
    async fn score_txn(
        &self,
        key: &str,
        field: &str,
        plan: &ScorePlan<'_>,
    ) -> Result<TxnOutcome, StoreError>;
}
