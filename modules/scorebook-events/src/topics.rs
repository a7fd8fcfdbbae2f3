//! Topic names and canonical message keys.
//!
//! Consumers filter by message key, so an event renamed here is an event
//! silently dropped everywhere. Keep in sync with the upstream producers.

pub const RAW_SCORES_TOPIC: &str = "raw_scores";
pub const RAW_LESSONS_TOPIC: &str = "raw_lessons";
pub const DISCIPLINES_TOPIC: &str = "disciplines";
pub const META_EVENTS_TOPIC: &str = "meta_events";
pub const SCORES_CHANGES_FEED_TOPIC: &str = "scores_changes_feed";

pub const SCORE_EVENT_NAME: &str = "ScoreEvent";
pub const LESSON_EVENT_NAME: &str = "LessonEvent";
pub const DISCIPLINE_EVENT_NAME: &str = "DisciplineEvent";
pub const CURRENT_YEAR_EVENT_NAME: &str = "CurrentYearEvent";
pub const LESSON_TYPES_LIST_NAME: &str = "LessonTypesList";
pub const SCORE_CHANGED_EVENT_NAME: &str = "ScoreChangedEvent";
