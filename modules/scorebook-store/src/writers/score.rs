use std::sync::Arc;

use async_trait::async_trait;

use scorebook_events::{ScoreEvent, ScoreValue, SCORE_EVENT_NAME};

use crate::error::{StoreError, WriteError};
use crate::feed::ScoresFeedQueue;
use crate::keys;
use crate::store::{Store, StoreOp, TxnOutcome};
use crate::writers::EventWriter;

/// Sentinel stored in the scores hash for "student was absent". A missing
/// field means the score is deleted; every other value is the score itself.
pub const ABSENT_SCORE_VALUE: f64 = -999999.0;

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Applies one score event under optimistic concurrency on the scores hash,
/// keeps the per-discipline totals and the student's discipline membership in
/// step, and hands every real change to the feed queue.
pub struct ScoreWriter {
    store: Arc<dyn Store>,
    feed: Arc<dyn ScoresFeedQueue>,
}

impl ScoreWriter {
    pub fn new(store: Arc<dyn Store>, feed: Arc<dyn ScoresFeedQueue>) -> Self {
        Self { store, feed }
    }
}

#[async_trait]
impl EventWriter for ScoreWriter {
    fn expected_key(&self) -> &str {
        SCORE_EVENT_NAME
    }

    async fn apply(&self, payload: &[u8]) -> Result<(), WriteError> {
        let event: ScoreEvent = serde_json::from_slice(payload)?;

        let scores_key =
            keys::scores_key(event.year, event.semester, event.student_id, event.discipline_id);
        let field = keys::score_field(event.lesson_id, event.lesson_part);
        let totals_key = keys::totals_key(event.year, event.semester, event.discipline_id);

        let new_value = storage_value(&event.score);
        let event_is_deleted = event.score.is_deleted;
        let student = event.student_id.to_string();

        let plan = {
            let scores_key = scores_key.clone();
            let field = field.clone();
            let totals_key = totals_key.clone();
            move |stored: Option<f64>| -> Option<Vec<StoreOp>> {
                let stored_is_deleted = stored.is_none();
                let stored_value = stored.unwrap_or(0.0);
                if event_is_deleted == stored_is_deleted && new_value == stored_value {
                    // storage already matches the event
                    return None;
                }

                let mut ops = Vec::with_capacity(2);
                if event_is_deleted {
                    ops.push(StoreOp::HDel {
                        key: scores_key.clone(),
                        field: field.clone(),
                    });
                } else {
                    ops.push(StoreOp::HSet {
                        key: scores_key.clone(),
                        field: field.clone(),
                        value: new_value,
                    });
                }

                let mut diff = 0.0;
                if stored_value != ABSENT_SCORE_VALUE {
                    diff -= stored_value;
                }
                if new_value != ABSENT_SCORE_VALUE {
                    diff += new_value;
                }
                if diff != 0.0 {
                    ops.push(StoreOp::ZIncrBy {
                        key: totals_key.clone(),
                        member: student.clone(),
                        delta: diff,
                    });
                }
                Some(ops)
            }
        };

        let outcome = self.write_with_retries(&scores_key, &field, &plan).await?;
        if !outcome.applied {
            return Ok(());
        }

        let membership_key =
            keys::student_disciplines_key(event.year, event.semester, event.student_id);
        let member = event.discipline_id.to_string();
        // Two concurrent writers can both miss here and both sadd; the second
        // add is a no-op in the store.
        if !self.store.sismember(&membership_key, &member).await? {
            self.store.sadd(&membership_key, &member).await?;
        }

        let previous = previous_value(outcome.stored);
        self.feed.enqueue(event, previous).await;
        Ok(())
    }
}

impl ScoreWriter {
    async fn write_with_retries(
        &self,
        key: &str,
        field: &str,
        plan: &(dyn Fn(Option<f64>) -> Option<Vec<StoreOp>> + Send + Sync),
    ) -> Result<TxnOutcome, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.score_txn(key, field, plan).await {
                Err(StoreError::TxAborted) if attempt < MAX_WRITE_ATTEMPTS => continue,
                other => return other,
            }
        }
    }
}

fn storage_value(score: &ScoreValue) -> f64 {
    if score.is_deleted {
        0.0
    } else if score.is_absent {
        ABSENT_SCORE_VALUE
    } else {
        f64::from(score.value)
    }
}

/// Decode a stored hash field back into the value triple the feed reports as
/// `previous`.
fn previous_value(stored: Option<f64>) -> ScoreValue {
    match stored {
        None => ScoreValue {
            value: 0.0,
            is_absent: false,
            is_deleted: true,
        },
        Some(value) if value == ABSENT_SCORE_VALUE => ScoreValue {
            value: 0.0,
            is_absent: true,
            is_deleted: false,
        },
        Some(value) => ScoreValue {
            value: value as f32,
            is_absent: false,
            is_deleted: false,
        },
    }
}
