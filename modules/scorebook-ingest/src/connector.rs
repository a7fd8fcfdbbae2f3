//! Fetch–decode–apply–commit loop for one writer on one topic.
//!
//! Commits are opportunistic: a batch goes to the broker after 5000 applied
//! messages, or 60 seconds after its first message, whichever comes first.
//! That amortises both the group-offset commit and the store snapshot while
//! bounding the redelivery window. Before every commit the store is
//! background-saved, but only when its last snapshot is older than the last
//! applied write: never more than once per commit, never committing ahead
//! of durability.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use scorebook_store::writers::EventWriter;
use scorebook_store::Store;

use crate::broker::{BrokerError, BrokerMessage, TopicConsumer};
use crate::supervisor::Connector;

const MAX_COMMIT_BATCH: usize = 5000;
const BATCH_IDLE: Duration = Duration::from_secs(60);

pub struct TopicConnector {
    consumer: Arc<dyn TopicConsumer>,
    store: Arc<dyn Store>,
    writer: Arc<dyn EventWriter>,
}

enum Fetched {
    Message(Box<BrokerMessage>),
    /// The batch idle deadline passed with nothing new.
    Deadline,
    Error(BrokerError),
    Cancelled,
}

impl TopicConnector {
    pub fn new(
        consumer: Arc<dyn TopicConsumer>,
        store: Arc<dyn Store>,
        writer: Arc<dyn EventWriter>,
    ) -> Self {
        Self {
            consumer,
            store,
            writer,
        }
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let expected_key = self.writer.expected_key().to_string();
        if expected_key.is_empty() {
            warn!(topic = self.consumer.topic(), "writer is not ready, connector not started");
            return;
        }
        info!(topic = self.consumer.topic(), writer = %expected_key, "connector started");

        let mut to_commit: Vec<BrokerMessage> = Vec::new();
        let mut last_write_ts: i64 = 0;
        let mut batch_deadline: Option<Instant> = None;

        while !*shutdown.borrow() {
            match self.fetch_one(&mut shutdown, batch_deadline).await {
                Fetched::Cancelled => break,
                Fetched::Deadline => {}
                Fetched::Error(e) => {
                    warn!(error = %e, topic = self.consumer.topic(), "fetch failed");
                }
                Fetched::Message(message) => {
                    let applied = if message.key == expected_key {
                        match self.writer.apply(&message.payload).await {
                            Ok(()) => true,
                            Err(e) => {
                                warn!(
                                    error = %e,
                                    key = %message.key,
                                    offset = message.offset,
                                    "failed to apply event"
                                );
                                false
                            }
                        }
                    } else {
                        // foreign key on a multiplexed topic: commit it so
                        // the group offset keeps advancing
                        true
                    };

                    if applied {
                        if to_commit.is_empty() {
                            batch_deadline = Some(Instant::now() + BATCH_IDLE);
                        }
                        to_commit.push(*message);
                        last_write_ts = Utc::now().timestamp();
                    }
                }
            }

            let deadline_passed = batch_deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false);
            if !to_commit.is_empty() && (to_commit.len() >= MAX_COMMIT_BATCH || deadline_passed) {
                match self.commit_batch(&to_commit, last_write_ts).await {
                    Ok(()) => {
                        info!(
                            count = to_commit.len(),
                            writer = %expected_key,
                            "committed message batch"
                        );
                        to_commit.clear();
                        batch_deadline = None;
                    }
                    Err(e) => {
                        warn!(error = %e, count = to_commit.len(), "failed to commit message batch");
                        // retry after another idle window
                        batch_deadline = Some(Instant::now() + BATCH_IDLE);
                    }
                }
            }
        }
        // An uncommitted tail is not force-committed here: those messages are
        // redelivered on next boot and re-application is idempotent.
    }

    async fn fetch_one(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        batch_deadline: Option<Instant>,
    ) -> Fetched {
        match batch_deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = shutdown.changed() => Fetched::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Fetched::Deadline,
                    fetched = self.consumer.fetch() => match fetched {
                        Ok(message) => Fetched::Message(Box::new(message)),
                        Err(e) => Fetched::Error(e),
                    },
                }
            }
            None => {
                tokio::select! {
                    _ = shutdown.changed() => Fetched::Cancelled,
                    fetched = self.consumer.fetch() => match fetched {
                        Ok(message) => Fetched::Message(Box::new(message)),
                        Err(e) => Fetched::Error(e),
                    },
                }
            }
        }
    }

    async fn commit_batch(&self, messages: &[BrokerMessage], last_write_ts: i64) -> Result<()> {
        self.snapshot_if_stale(last_write_ts).await?;
        self.consumer.commit(messages).await?;
        Ok(())
    }

    /// Background-save unless the last snapshot already covers the last
    /// applied write.
    async fn snapshot_if_stale(&self, last_write_ts: i64) -> Result<()> {
        if last_write_ts < self.store.last_save().await? {
            return Ok(());
        }
        self.store.bgsave().await?;
        Ok(())
    }
}

#[async_trait]
impl Connector for TopicConnector {
    async fn execute(&self, shutdown: watch::Receiver<bool>) {
        self.run(shutdown).await;
    }
}
