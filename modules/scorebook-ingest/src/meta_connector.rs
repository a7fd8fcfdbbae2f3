//! Connector for the control topic.
//!
//! Multiplexes two rare event kinds (the current-year rotation and the
//! lesson-types snapshot) and commits per message: batching buys nothing at
//! this rate, and losing a year rotation to a crash would cost a full
//! rescan.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use scorebook_store::writers::EventWriter;

use crate::broker::TopicConsumer;
use crate::supervisor::Connector;

pub struct MetaEventsConnector {
    consumer: Arc<dyn TopicConsumer>,
    current_year_writer: Arc<dyn EventWriter>,
    lesson_types_writer: Arc<dyn EventWriter>,
}

impl MetaEventsConnector {
    pub fn new(
        consumer: Arc<dyn TopicConsumer>,
        current_year_writer: Arc<dyn EventWriter>,
        lesson_types_writer: Arc<dyn EventWriter>,
    ) -> Self {
        Self {
            consumer,
            current_year_writer,
            lesson_types_writer,
        }
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(topic = self.consumer.topic(), "meta events connector started");

        while !*shutdown.borrow() {
            let message = tokio::select! {
                _ = shutdown.changed() => break,
                fetched = self.consumer.fetch() => match fetched {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, topic = self.consumer.topic(), "fetch failed");
                        continue;
                    }
                },
            };

            let applied = if message.key == self.current_year_writer.expected_key() {
                self.current_year_writer.apply(&message.payload).await
            } else if message.key == self.lesson_types_writer.expected_key() {
                self.lesson_types_writer.apply(&message.payload).await
            } else {
                // unknown control event: skip it, but advance the offset
                Ok(())
            };

            match applied {
                Ok(()) => {
                    if let Err(e) = self
                        .consumer
                        .commit(std::slice::from_ref(&message))
                        .await
                    {
                        warn!(error = %e, key = %message.key, "failed to commit meta message");
                    } else {
                        info!(key = %message.key, "committed meta event");
                    }
                }
                Err(e) => warn!(error = %e, key = %message.key, "failed to apply meta event"),
            }
        }
    }
}

#[async_trait]
impl Connector for MetaEventsConnector {
    async fn execute(&self, shutdown: watch::Receiver<bool>) {
        self.run(shutdown).await;
    }
}
