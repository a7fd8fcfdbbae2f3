//! Redis-backed [`Store`] implementation.
//!
//! Plain commands go through a shared [`ConnectionManager`]; the optimistic
//! transaction opens a dedicated connection per attempt, because `WATCH`
//! state is connection-scoped and must not interleave with other commands.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::StoreError;
use crate::store::{ScorePlan, Store, StoreOp, TxnOutcome};

const BACKGROUND_SAVE_IN_PROGRESS: &str = "Background save already in progress";

pub struct RedisStore {
    client: redis::Client,
    manager: ConnectionManager,
}

impl RedisStore {
    /// Parse the DSN and establish the shared connection. An unparseable DSN
    /// fails here, before any worker starts.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(dsn)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { client, manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.conn().hget(key, field).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.conn().hset(key, field, value).await?)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        Ok(self.conn().hset_multiple(key, fields).await?)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError> {
        Ok(self.conn().hdel(key, field).await?)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self.conn().hexists(key, field).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        Ok(self.conn().sadd(key, member).await?)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.conn().sismember(key, member).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.conn().set(key, value).await?)
    }

    async fn setex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        Ok(self.conn().set_ex(key, value, ttl.as_secs()).await?)
    }

    async fn getset(&self, key: &str, value: &str) -> Result<Option<String>, StoreError> {
        Ok(self.conn().getset(key, value).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.conn().exists(key).await?)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        Ok(self.conn().del(key).await?)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn();
        let mut iter: redis::AsyncIter<String> = conn.scan_match(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn bgsave(&self) -> Result<(), StoreError> {
        let mut conn = self.conn();
        match redis::cmd("BGSAVE").query_async::<_, String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains(BACKGROUND_SAVE_IN_PROGRESS) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self) -> Result<(), StoreError> {
        let mut conn = self.conn();
        redis::cmd("SAVE").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    async fn last_save(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn();
        Ok(redis::cmd("LASTSAVE").query_async(&mut conn).await?)
    }

    async fn score_txn(
        &self,
        key: &str,
        field: &str,
        plan: &ScorePlan<'_>,
    ) -> Result<TxnOutcome, StoreError> {
        // A fresh connection per attempt: WATCH state is connection-scoped,
        // so the shared manager must never see these commands.
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("WATCH")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;

        let stored: Option<f64> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;

        let Some(ops) = plan(stored) else {
            redis::cmd("UNWATCH").query_async::<_, ()>(&mut conn).await?;
            return Ok(TxnOutcome {
                stored,
                applied: false,
            });
        };

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                StoreOp::HSet { key, field, value } => {
                    pipe.hset(key, field, *value).ignore();
                }
                StoreOp::HDel { key, field } => {
                    pipe.hdel(key, field).ignore();
                }
                StoreOp::ZIncrBy { key, member, delta } => {
                    pipe.zincr(key, member, *delta).ignore();
                }
            }
        }

        // EXEC returns nil when the watched key changed under us.
        let exec: Option<()> = pipe.query_async(&mut conn).await?;
        match exec {
            Some(()) => Ok(TxnOutcome {
                stored,
                applied: true,
            }),
            None => Err(StoreError::TxAborted),
        }
    }
}
