use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use scorebook_events::{LessonEvent, LESSON_EVENT_NAME};

use crate::error::WriteError;
use crate::keys;
use crate::max_lesson::MaxLessonTracker;
use crate::store::Store;
use crate::writers::EventWriter;

/// A deleted lesson leaves a tombstone for a day, so late-arriving scores
/// that reference it can still be told apart from scores for lessons the
/// projection has never seen.
const DELETED_LESSON_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct LessonWriter {
    store: Arc<dyn Store>,
    tracker: Arc<MaxLessonTracker>,
}

impl LessonWriter {
    pub fn new(store: Arc<dyn Store>, tracker: Arc<MaxLessonTracker>) -> Self {
        Self { store, tracker }
    }
}

#[async_trait]
impl EventWriter for LessonWriter {
    fn expected_key(&self) -> &str {
        LESSON_EVENT_NAME
    }

    async fn apply(&self, payload: &[u8]) -> Result<(), WriteError> {
        let event: LessonEvent = serde_json::from_slice(payload)?;

        let lessons_key = keys::lessons_key(event.year, event.semester, event.discipline_id);
        let field = keys::lesson_field(event.id);
        let value = format!("{}{}", event.date.format("%y%m%d"), event.type_id);

        if event.is_deleted {
            let tombstone =
                keys::deleted_lesson_key(event.year, event.semester, event.discipline_id, event.id);
            self.store
                .setex(&tombstone, &value, DELETED_LESSON_TTL)
                .await?;
            self.store.hdel(&lessons_key, &field).await?;
        } else {
            self.store.hset(&lessons_key, &field, &value).await?;
            self.tracker.set(event.id);
        }
        Ok(())
    }
}
