use std::sync::Arc;

use async_trait::async_trait;

use scorebook_events::{LessonTypesList, LESSON_TYPES_LIST_NAME};

use crate::error::WriteError;
use crate::keys;
use crate::store::Store;
use crate::writers::EventWriter;

/// Stores the lesson-type reference list as one JSON blob and snapshots the
/// store whenever the list actually changed.
pub struct LessonTypesWriter {
    store: Arc<dyn Store>,
}

impl LessonTypesWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventWriter for LessonTypesWriter {
    fn expected_key(&self) -> &str {
        LESSON_TYPES_LIST_NAME
    }

    async fn apply(&self, payload: &[u8]) -> Result<(), WriteError> {
        let event: LessonTypesList = serde_json::from_slice(payload)?;

        let serialized = serde_json::to_string(&event.list)?;
        let previous = self
            .store
            .getset(keys::LESSON_TYPES_KEY, &serialized)
            .await?;

        if previous.as_deref() != Some(serialized.as_str()) {
            self.store.bgsave().await?;
        }
        Ok(())
    }
}
