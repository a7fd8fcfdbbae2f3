//! In-memory [`Store`] for tests.
//!
//! Mirrors the semantics the writers rely on: string-typed hash fields,
//! float sorted sets, nil-on-missing reads, and the optimistic transaction
//! (with an injectable abort for retry tests). Every mutating call is
//! appended to an op log so tests can assert not just the final state but
//! how it was reached.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{ScorePlan, Store, StoreOp, TxnOutcome};

#[derive(Default)]
struct State {
    hashes: HashMap<String, HashMap<String, String>>,
    strings: HashMap<String, String>,
    ttls: HashMap<String, Duration>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    last_save: i64,
    bgsave_calls: usize,
    save_calls: usize,
    abort_txns: usize,
    ops: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Abort the next `n` optimistic transactions, as a concurrent writer
    /// would.
    pub fn abort_next_txns(&self, n: usize) {
        self.lock().abort_txns = n;
    }

    pub fn set_last_save(&self, epoch: i64) {
        self.lock().last_save = epoch;
    }

    pub fn bgsave_calls(&self) -> usize {
        self.lock().bgsave_calls
    }

    pub fn save_calls(&self) -> usize {
        self.lock().save_calls
    }

    /// Number of logged ops whose name matches `op` (e.g. `"hset"`).
    pub fn op_count(&self, op: &str) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|entry| entry.starts_with(op))
            .count()
    }

    pub fn hash(&self, key: &str) -> HashMap<String, String> {
        self.lock().hashes.get(key).cloned().unwrap_or_default()
    }

    pub fn zscore(&self, key: &str, member: &str) -> Option<f64> {
        self.lock().zsets.get(key)?.get(member).copied()
    }

    pub fn set_members(&self, key: &str) -> HashSet<String> {
        self.lock().sets.get(key).cloned().unwrap_or_default()
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.lock().strings.get(key).cloned()
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.lock().ttls.get(key).copied()
    }

    /// Seed a plain string key without touching the op log.
    pub fn seed_string(&self, key: &str, value: &str) {
        self.lock().strings.insert(key.into(), value.into());
    }

    pub fn all_keys(&self) -> Vec<String> {
        let state = self.lock();
        state
            .hashes
            .keys()
            .chain(state.strings.keys())
            .chain(state.sets.keys())
            .chain(state.zsets.keys())
            .cloned()
            .collect()
    }
}

/// Glob matching for the patterns the writers actually use: a literal
/// prefix followed by a single trailing `*`, or a literal key.
fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl State {
    fn log(&mut self, entry: String) {
        self.ops.push(entry);
    }

    fn apply_op(&mut self, op: &StoreOp) {
        match op {
            StoreOp::HSet { key, field, value } => {
                self.log(format!("hset {key} {field}"));
                self.hashes
                    .entry(key.clone())
                    .or_default()
                    .insert(field.clone(), value.to_string());
            }
            StoreOp::HDel { key, field } => {
                self.log(format!("hdel {key} {field}"));
                if let Some(hash) = self.hashes.get_mut(key) {
                    hash.remove(field);
                }
            }
            StoreOp::ZIncrBy { key, member, delta } => {
                self.log(format!("zincrby {key} {member}"));
                *self
                    .zsets
                    .entry(key.clone())
                    .or_default()
                    .entry(member.clone())
                    .or_insert(0.0) += delta;
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.log(format!("hset {key} {field}"));
        state
            .hashes
            .entry(key.into())
            .or_default()
            .insert(field.into(), value.into());
        Ok(())
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.log(format!("hset {key} *{}", fields.len()));
        let hash = state.hashes.entry(key.into()).or_default();
        for (field, value) in fields {
            hash.insert((*field).into(), (*value).into());
        }
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.log(format!("hdel {key} {field}"));
        if let Some(hash) = state.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .map(|hash| hash.contains_key(field))
            .unwrap_or(false))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.log(format!("sadd {key} {member}"));
        state.sets.entry(key.into()).or_default().insert(member.into());
        Ok(())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .sets
            .get(key)
            .map(|set| set.contains(member))
            .unwrap_or(false))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.log(format!("set {key}"));
        state.strings.insert(key.into(), value.into());
        Ok(())
    }

    async fn setex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.log(format!("setex {key}"));
        state.strings.insert(key.into(), value.into());
        state.ttls.insert(key.into(), ttl);
        Ok(())
    }

    async fn getset(&self, key: &str, value: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.lock();
        state.log(format!("getset {key}"));
        Ok(state.strings.insert(key.into(), value.into()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let state = self.lock();
        Ok(state.strings.contains_key(key)
            || state.hashes.contains_key(key)
            || state.sets.contains_key(key)
            || state.zsets.contains_key(key))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.log(format!("del {key}"));
        state.strings.remove(key);
        state.ttls.remove(key);
        state.hashes.remove(key);
        state.sets.remove(key);
        state.zsets.remove(key);
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .all_keys()
            .into_iter()
            .filter(|key| matches(pattern, key))
            .collect())
    }

    async fn bgsave(&self) -> Result<(), StoreError> {
        self.lock().bgsave_calls += 1;
        Ok(())
    }

    async fn save(&self) -> Result<(), StoreError> {
        self.lock().save_calls += 1;
        Ok(())
    }

    async fn last_save(&self) -> Result<i64, StoreError> {
        Ok(self.lock().last_save)
    }

    async fn score_txn(
        &self,
        key: &str,
        field: &str,
        plan: &ScorePlan<'_>,
    ) -> Result<TxnOutcome, StoreError> {
        let mut state = self.lock();
        if state.abort_txns > 0 {
            state.abort_txns -= 1;
            return Err(StoreError::TxAborted);
        }

        let stored = state
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .map(|raw| raw.parse::<f64>().expect("non-numeric score in hash"));

        let Some(ops) = plan(stored) else {
            return Ok(TxnOutcome {
                stored,
                applied: false,
            });
        };

        for op in &ops {
            state.apply_op(op);
        }
        Ok(TxnOutcome {
            stored,
            applied: true,
        })
    }
}
