use async_trait::async_trait;

use scorebook_events::{ScoreEvent, ScoreValue};

/// Where the score writer hands off applied changes for publication.
///
/// The publisher needs nothing back from the writer, so the dependency is
/// one-way: the publisher is built first and the writer gets this handle.
#[async_trait]
pub trait ScoresFeedQueue: Send + Sync {
    /// Queue a score change for the feed, along with the value it replaced.
    async fn enqueue(&self, event: ScoreEvent, previous: ScoreValue);
}
