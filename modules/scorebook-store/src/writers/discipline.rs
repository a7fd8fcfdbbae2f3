use std::sync::Arc;

use async_trait::async_trait;

use scorebook_events::{DisciplineEvent, DISCIPLINE_EVENT_NAME};

use crate::discipline_name::clean_discipline_name;
use crate::error::WriteError;
use crate::keys;
use crate::store::Store;
use crate::writers::EventWriter;

/// Caches the cleaned discipline title. Upstream re-emits raw titles on every
/// sync, so the write is guarded by `origName`: cleaning is redone only when
/// the raw title actually changed.
pub struct DisciplineWriter {
    store: Arc<dyn Store>,
}

impl DisciplineWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventWriter for DisciplineWriter {
    fn expected_key(&self) -> &str {
        DISCIPLINE_EVENT_NAME
    }

    async fn apply(&self, payload: &[u8]) -> Result<(), WriteError> {
        let event: DisciplineEvent = serde_json::from_slice(payload)?;

        let key = keys::discipline_key(event.year, event.id);
        if self.store.hget(&key, "origName").await?.as_deref() == Some(event.name.as_str()) {
            return Ok(());
        }

        let cleaned = clean_discipline_name(&event.name);
        self.store
            .hset_multiple(&key, &[("name", &cleaned), ("origName", &event.name)])
            .await?;
        Ok(())
    }
}
