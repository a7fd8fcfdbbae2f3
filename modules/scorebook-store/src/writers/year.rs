use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tracing::info;

use scorebook_events::{CurrentYearEvent, CURRENT_YEAR_EVENT_NAME};

use crate::error::WriteError;
use crate::keys;
use crate::store::Store;
use crate::writers::EventWriter;

pub type YearPolicy = fn(i32) -> bool;

/// An education year is plausible when it sits in the service's supported
/// window and names the current or the previous calendar year.
pub fn default_education_year_policy(year: i32) -> bool {
    let current = Utc::now().year();
    (2022..2050).contains(&year) && (year == current || year == current - 1)
}

/// Housekeeping writer: on a new current year, drop every key of the
/// superseded years and persist the marker. Not a projection of upstream
/// state; it only ever removes ours.
pub struct YearChangeWriter {
    store: Arc<dyn Store>,
    is_valid_education_year: YearPolicy,
}

impl YearChangeWriter {
    pub fn new(store: Arc<dyn Store>, is_valid_education_year: YearPolicy) -> Self {
        Self {
            store,
            is_valid_education_year,
        }
    }
}

#[async_trait]
impl EventWriter for YearChangeWriter {
    fn expected_key(&self) -> &str {
        CURRENT_YEAR_EVENT_NAME
    }

    async fn apply(&self, payload: &[u8]) -> Result<(), WriteError> {
        let event: CurrentYearEvent = serde_json::from_slice(payload)?;

        if !(self.is_valid_education_year)(event.year) {
            info!(year = event.year, "skipping invalid education year");
            return Ok(());
        }

        // The marker only moves forward; replays of older year events are
        // no-ops.
        if let Some(stored) = self.store.get(keys::CURRENT_YEAR_KEY).await? {
            if let Ok(stored_year) = stored.parse::<i32>() {
                if event.year <= stored_year {
                    return Ok(());
                }
            }
        }

        for superseded in (event.year - 3)..event.year {
            let found = self.store.scan(&keys::year_pattern(superseded)).await?;
            if !found.is_empty() {
                info!(year = superseded, keys = found.len(), "dropping superseded year");
            }
            for key in found {
                self.store.del(&key).await?;
            }
        }

        self.store
            .set(keys::CURRENT_YEAR_KEY, &event.year.to_string())
            .await?;
        self.store.save().await?;
        Ok(())
    }
}
