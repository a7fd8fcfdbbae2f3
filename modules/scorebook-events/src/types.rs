use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::topics;

/// Where a score event was synced from: the realtime pipeline or the nightly
/// secondary import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    #[default]
    Realtime,
    Secondary,
}

/// The mutable part of a score. `is_deleted` and the absence flag travel next
/// to the numeric value so that a single triple describes both the new and the
/// previous state of a score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreValue {
    pub value: f32,
    pub is_absent: bool,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEvent {
    pub id: u64,
    pub student_id: u64,
    pub lesson_id: u64,
    pub lesson_part: u8,
    pub discipline_id: u64,
    pub year: i32,
    pub semester: u8,
    #[serde(flatten)]
    pub score: ScoreValue,
    pub updated_at: DateTime<Utc>,
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub source: ScoreSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonEvent {
    pub id: u64,
    pub discipline_id: u64,
    pub year: i32,
    pub semester: u8,
    pub type_id: u8,
    pub date: NaiveDate,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisciplineEvent {
    pub id: u64,
    pub year: i32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentYearEvent {
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonType {
    pub id: i32,
    pub short_name: String,
    pub long_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonTypesList {
    pub year: i32,
    pub list: Vec<LessonType>,
}

/// Derived event published to the changes feed: the score event that was
/// applied plus the value it replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreChangedEvent {
    #[serde(flatten)]
    pub event: ScoreEvent,
    pub previous: ScoreValue,
}

impl ScoreChangedEvent {
    /// Kafka message key for the changes feed. All changes share one key
    /// space so the murmur2 partitioner keeps the feed ordered per key.
    pub fn message_key(&self) -> &'static str {
        topics::SCORE_CHANGED_EVENT_NAME
    }
}
