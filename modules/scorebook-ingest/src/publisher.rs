//! Scores-changes feed publisher with deferred emission.
//!
//! Raw scores and raw lessons arrive on different topics and may arrive out
//! of order. Downstream feed consumers want a score change only once the
//! referenced lesson is visible in the store, but the feed must not stall
//! forever when that lesson never materialises: entries older than the
//! waiting timeout go out regardless, and shutdown drains everything.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use scorebook_events::{ScoreChangedEvent, ScoreEvent, ScoreValue};
use scorebook_store::{LessonExistChecker, ScoresFeedQueue};

use crate::broker::{FeedMessage, FeedProducer};
use crate::metrics;

const FLUSH_PERIOD: Duration = Duration::from_secs(5);
const WAITING_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub struct ScoresFeedPublisher {
    producer: Arc<dyn FeedProducer>,
    lessons: LessonExistChecker,
    /// Emittable on the next flush.
    ready: Mutex<Vec<ScoreChangedEvent>>,
    /// Held until the referenced lesson shows up. Promoted slots are nulled
    /// in place; only the leading run of nulls is compacted, so per-tick work
    /// stays O(len) with no tail copying.
    waiting: Mutex<Vec<Option<ScoreChangedEvent>>>,
    flush_period: Duration,
    waiting_timeout: Duration,
}

impl ScoresFeedPublisher {
    pub fn new(producer: Arc<dyn FeedProducer>, lessons: LessonExistChecker) -> Self {
        Self {
            producer,
            lessons,
            ready: Mutex::new(Vec::new()),
            waiting: Mutex::new(Vec::new()),
            flush_period: FLUSH_PERIOD,
            waiting_timeout: WAITING_TIMEOUT,
        }
    }

    /// Flush loop. Runs until shutdown, then forces one final drain so
    /// nothing queued is lost across a restart.
    pub async fn execute(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.flush_period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tick.tick() => {}
            }
            self.check_waiting(false).await;
            self.write_events().await;
        }

        self.check_waiting(true).await;
        self.write_events().await;
    }

    /// Promote waiting entries whose lesson is now known, whose sync
    /// timestamp fell behind the waiting timeout, or everything on `force`.
    async fn check_waiting(&self, force: bool) {
        // lock order: ready before waiting, always
        let mut ready = self.ready.lock().await;
        let mut waiting = self.waiting.lock().await;
        if waiting.is_empty() {
            return;
        }

        let timeout = chrono::Duration::from_std(self.waiting_timeout)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let stale_before = Utc::now() - timeout;

        for slot in waiting.iter_mut() {
            let promote = match slot {
                Some(changed) => {
                    force
                        || changed.event.synced_at < stale_before
                        || self
                            .lessons
                            .exists(
                                changed.event.year,
                                changed.event.semester,
                                changed.event.discipline_id,
                                changed.event.lesson_id,
                            )
                            .await
                }
                None => false,
            };
            if promote {
                if let Some(changed) = slot.take() {
                    ready.push(changed);
                }
            }
        }

        let first_live = waiting
            .iter()
            .position(Option::is_some)
            .unwrap_or(waiting.len());
        waiting.drain(..first_live);
    }

    /// Publish the ready queue in one call. On failure the queue is left
    /// intact and retried next tick.
    async fn write_events(&self) {
        let batch: Vec<FeedMessage> = {
            let ready = self.ready.lock().await;
            if ready.is_empty() {
                return;
            }
            ready
                .iter()
                .map(|changed| FeedMessage {
                    key: changed.message_key().to_string(),
                    payload: serde_json::to_vec(changed).unwrap_or_default(),
                })
                .collect()
        };

        let count = batch.len();
        info!(count, "writing score changes into feed");
        match self.producer.write_messages(batch).await {
            Ok(()) => {
                self.ready.lock().await.drain(..count);
            }
            Err(e) => warn!(error = %e, count, "failed to push score change events"),
        }
    }

    #[cfg(test)]
    fn with_timings(mut self, flush_period: Duration, waiting_timeout: Duration) -> Self {
        self.flush_period = flush_period;
        self.waiting_timeout = waiting_timeout;
        self
    }

    #[cfg(test)]
    async fn queue_depths(&self) -> (usize, usize) {
        (self.ready.lock().await.len(), self.waiting.lock().await.len())
    }
}

#[async_trait]
impl ScoresFeedQueue for ScoresFeedPublisher {
    async fn enqueue(&self, event: ScoreEvent, previous: ScoreValue) {
        metrics::record_score_change(event.source);

        let known = self
            .lessons
            .exists(event.year, event.semester, event.discipline_id, event.lesson_id)
            .await;
        let changed = ScoreChangedEvent { event, previous };

        if known {
            self.ready.lock().await.push(changed);
        } else {
            self.waiting.lock().await.push(Some(changed));
        }
    }
}
