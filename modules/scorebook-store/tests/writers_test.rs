//! Writer behavior against the in-memory store: idempotent application,
//! totals bookkeeping, tombstones, year rotation, and the snapshot policy.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use scorebook_events::{
    CurrentYearEvent, DisciplineEvent, LessonEvent, LessonType, LessonTypesList, ScoreEvent,
    ScoreSource, ScoreValue,
};
use scorebook_store::writers::{
    DisciplineWriter, EventWriter, LessonTypesWriter, LessonWriter, ScoreWriter, YearChangeWriter,
};
use scorebook_store::{
    keys, MaxLessonTracker, MemoryStore, ScoresFeedQueue, Store, StoreError, WriteError,
};

// ---------------------------------------------------------------------------
// Fakes & helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingFeed {
    enqueued: Mutex<Vec<(ScoreEvent, ScoreValue)>>,
}

impl RecordingFeed {
    fn entries(&self) -> Vec<(ScoreEvent, ScoreValue)> {
        self.enqueued.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoresFeedQueue for RecordingFeed {
    async fn enqueue(&self, event: ScoreEvent, previous: ScoreValue) {
        self.enqueued.lock().unwrap().push((event, previous));
    }
}

fn score_event(lesson_id: u64, value: f32, is_absent: bool, is_deleted: bool) -> ScoreEvent {
    ScoreEvent {
        id: 112233,
        student_id: 123,
        lesson_id,
        lesson_part: 1,
        discipline_id: 234,
        year: 2028,
        semester: 1,
        score: ScoreValue {
            value,
            is_absent,
            is_deleted,
        },
        updated_at: Utc.with_ymd_and_hms(2028, 11, 12, 14, 30, 40).unwrap(),
        synced_at: Utc.with_ymd_and_hms(2028, 11, 12, 14, 35, 13).unwrap(),
        source: ScoreSource::Realtime,
    }
}

fn payload<T: serde::Serialize>(event: &T) -> Vec<u8> {
    serde_json::to_vec(event).unwrap()
}

fn score_fixture() -> (Arc<MemoryStore>, Arc<RecordingFeed>, ScoreWriter) {
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(RecordingFeed::default());
    let writer = ScoreWriter::new(store.clone(), feed.clone());
    (store, feed, writer)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// ---------------------------------------------------------------------------
// ScoreWriter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn writes_new_score() {
    let (store, feed, writer) = score_fixture();

    writer
        .apply(&payload(&score_event(150, 2.5, false, false)))
        .await
        .unwrap();

    assert_eq!(
        store.hash("2028:1:scores:123:234").get("150:1").unwrap(),
        "2.5"
    );
    assert_close(store.zscore("2028:1:totals:234", "123").unwrap(), 2.5);
    assert!(store
        .set_members("2028:1:student_disciplines:123")
        .contains("234"));

    let entries = feed.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].1,
        ScoreValue {
            value: 0.0,
            is_absent: false,
            is_deleted: true,
        }
    );
}

#[tokio::test]
async fn reapplying_same_score_is_a_noop() {
    let (store, feed, writer) = score_fixture();
    let raw = payload(&score_event(150, 2.5, false, false));

    writer.apply(&raw).await.unwrap();
    writer.apply(&raw).await.unwrap();

    assert_eq!(store.op_count("hset"), 1);
    assert_eq!(store.op_count("zincrby"), 1);
    assert_eq!(store.op_count("sadd"), 1);
    assert_eq!(feed.entries().len(), 1);
}

#[tokio::test]
async fn deleting_score_reverses_total() {
    let (store, feed, writer) = score_fixture();

    writer
        .apply(&payload(&score_event(150, 3.5, false, false)))
        .await
        .unwrap();
    writer
        .apply(&payload(&score_event(150, 0.0, false, true)))
        .await
        .unwrap();

    assert!(store.hash("2028:1:scores:123:234").get("150:1").is_none());
    assert_close(store.zscore("2028:1:totals:234", "123").unwrap(), 0.0);

    let entries = feed.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[1].1,
        ScoreValue {
            value: 3.5,
            is_absent: false,
            is_deleted: false,
        }
    );
}

#[tokio::test]
async fn absent_marker_keeps_totals_untouched() {
    let (store, feed, writer) = score_fixture();

    writer
        .apply(&payload(&score_event(150, 0.0, true, false)))
        .await
        .unwrap();

    assert_eq!(
        store.hash("2028:1:scores:123:234").get("150:1").unwrap(),
        "-999999"
    );
    assert!(store.zscore("2028:1:totals:234", "123").is_none());

    // the absence turns into a real score later
    writer
        .apply(&payload(&score_event(150, 4.0, false, false)))
        .await
        .unwrap();

    assert_close(store.zscore("2028:1:totals:234", "123").unwrap(), 4.0);
    let entries = feed.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[1].1,
        ScoreValue {
            value: 0.0,
            is_absent: true,
            is_deleted: false,
        }
    );
}

#[tokio::test]
async fn concurrent_modification_is_retried() {
    let (store, feed, writer) = score_fixture();
    store.abort_next_txns(1);

    writer
        .apply(&payload(&score_event(150, 2.5, false, false)))
        .await
        .unwrap();

    assert_eq!(feed.entries().len(), 1);
    assert_close(store.zscore("2028:1:totals:234", "123").unwrap(), 2.5);
}

#[tokio::test]
async fn concurrent_modification_gives_up_after_three_attempts() {
    let (store, feed, writer) = score_fixture();
    store.abort_next_txns(3);

    let err = writer
        .apply(&payload(&score_event(150, 2.5, false, false)))
        .await
        .unwrap_err();

    assert!(matches!(err, WriteError::Store(StoreError::TxAborted)));
    assert!(feed.entries().is_empty());
}

#[tokio::test]
async fn malformed_score_payload_is_a_decode_error() {
    let (_store, feed, writer) = score_fixture();

    let err = writer.apply(b"{not json").await.unwrap_err();

    assert!(matches!(err, WriteError::Decode(_)));
    assert!(feed.entries().is_empty());
}

#[tokio::test]
async fn totals_track_sum_over_many_events() {
    let (store, _feed, writer) = score_fixture();

    // lessons come and go; the sorted set must always equal the hash sum
    writer
        .apply(&payload(&score_event(150, 2.5, false, false)))
        .await
        .unwrap();
    writer
        .apply(&payload(&score_event(151, 0.0, true, false)))
        .await
        .unwrap();
    writer
        .apply(&payload(&score_event(152, 3.0, false, false)))
        .await
        .unwrap();
    writer
        .apply(&payload(&score_event(150, 0.0, false, true)))
        .await
        .unwrap();
    writer
        .apply(&payload(&score_event(151, 4.0, false, false)))
        .await
        .unwrap();

    let hash_sum: f64 = store
        .hash("2028:1:scores:123:234")
        .values()
        .map(|raw| raw.parse::<f64>().unwrap())
        .filter(|&value| value != scorebook_store::writers::ABSENT_SCORE_VALUE)
        .sum();
    assert_close(hash_sum, 7.0);
    assert_close(store.zscore("2028:1:totals:234", "123").unwrap(), hash_sum);
    assert!(store
        .set_members("2028:1:student_disciplines:123")
        .contains("234"));
}

// ---------------------------------------------------------------------------
// DisciplineWriter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn discipline_write_caches_cleaned_name() {
    let store = Arc::new(MemoryStore::new());
    let writer = DisciplineWriter::new(store.clone());

    let event = DisciplineEvent {
        id: 234,
        year: 2028,
        name: "Фінанси (модуль 1 Гроші та кредит, модуль 2 Фінанси)".into(),
    };
    writer.apply(&payload(&event)).await.unwrap();

    let hash = store.hash("2028:discipline:234");
    assert_eq!(hash.get("name").unwrap(), "Фінанси");
    assert_eq!(hash.get("origName").unwrap(), &event.name);
}

#[tokio::test]
async fn unchanged_discipline_is_read_only() {
    let store = Arc::new(MemoryStore::new());
    let writer = DisciplineWriter::new(store.clone());

    let raw = payload(&DisciplineEvent {
        id: 234,
        year: 2028,
        name: "Митне** право~, 5 сем., Юрінст".into(),
    });
    writer.apply(&raw).await.unwrap();
    writer.apply(&raw).await.unwrap();

    assert_eq!(store.op_count("hset"), 1);

    // a changed raw title is written again
    writer
        .apply(&payload(&DisciplineEvent {
            id: 234,
            year: 2028,
            name: "Митне право".into(),
        }))
        .await
        .unwrap();
    assert_eq!(store.op_count("hset"), 2);
}

// ---------------------------------------------------------------------------
// LessonWriter
// ---------------------------------------------------------------------------

fn lesson_event(id: u64, is_deleted: bool) -> LessonEvent {
    LessonEvent {
        id,
        discipline_id: 234,
        year: 2028,
        semester: 1,
        type_id: 1,
        date: NaiveDate::from_ymd_opt(2028, 11, 18).unwrap(),
        is_deleted,
    }
}

#[tokio::test]
async fn lesson_write_records_date_and_advances_max_id() {
    let store = Arc::new(MemoryStore::new());
    let (tracker, _rx) = MaxLessonTracker::load(store.clone()).await.unwrap();
    let writer = LessonWriter::new(store.clone(), tracker.clone());

    writer.apply(&payload(&lesson_event(150, false))).await.unwrap();

    assert_eq!(store.hash("2028:1:lessons:234").get("150").unwrap(), "2811181");
    assert_eq!(tracker.get(), 150);
}

#[tokio::test]
async fn deleted_lesson_leaves_only_a_tombstone() {
    let store = Arc::new(MemoryStore::new());
    let (tracker, _rx) = MaxLessonTracker::load(store.clone()).await.unwrap();
    let writer = LessonWriter::new(store.clone(), tracker);

    writer.apply(&payload(&lesson_event(150, false))).await.unwrap();
    writer.apply(&payload(&lesson_event(150, true))).await.unwrap();

    // never both: the hash field is gone, the tombstone is live
    assert!(store.hash("2028:1:lessons:234").get("150").is_none());
    let tombstone = "2028:1:deleted-lessons:234:150";
    assert_eq!(store.string(tombstone).unwrap(), "2811181");
    assert_eq!(
        store.ttl_of(tombstone).unwrap(),
        std::time::Duration::from_secs(24 * 60 * 60)
    );
}

// ---------------------------------------------------------------------------
// YearChangeWriter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn year_rotation_drops_superseded_keys() {
    let store = Arc::new(MemoryStore::new());
    store.seed_string(keys::CURRENT_YEAR_KEY, "2030");

    let writer = YearChangeWriter::new(store.clone(), |_| true);

    // a spread of per-year entities that must disappear
    store.hset("2030:1:lessons:7", "1", "3011021").await.unwrap();
    store.hset("2030:discipline:7", "name", "Фінанси").await.unwrap();
    store.sadd("2030:1:student_disciplines:5", "7").await.unwrap();
    store.hset("2031:1:lessons:8", "2", "3109011").await.unwrap();

    writer
        .apply(&payload(&CurrentYearEvent { year: 2031 }))
        .await
        .unwrap();

    assert!(store.hash("2030:1:lessons:7").is_empty());
    assert!(store.hash("2030:discipline:7").is_empty());
    assert!(store.set_members("2030:1:student_disciplines:5").is_empty());
    // the new year's keys survive
    assert!(!store.hash("2031:1:lessons:8").is_empty());

    assert_eq!(store.string(keys::CURRENT_YEAR_KEY).unwrap(), "2031");
    assert_eq!(store.save_calls(), 1);
}

#[tokio::test]
async fn stale_year_event_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    store.seed_string(keys::CURRENT_YEAR_KEY, "2031");

    let writer = YearChangeWriter::new(store.clone(), |_| true);
    writer
        .apply(&payload(&CurrentYearEvent { year: 2031 }))
        .await
        .unwrap();

    assert_eq!(store.save_calls(), 0);
}

#[tokio::test]
async fn implausible_year_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let writer = YearChangeWriter::new(store.clone(), |year| (2022..2050).contains(&year));

    writer
        .apply(&payload(&CurrentYearEvent { year: 2121 }))
        .await
        .unwrap();

    assert!(store.string(keys::CURRENT_YEAR_KEY).is_none());
    assert_eq!(store.save_calls(), 0);
}

// ---------------------------------------------------------------------------
// LessonTypesWriter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lesson_types_snapshot_only_on_change() {
    let store = Arc::new(MemoryStore::new());
    let writer = LessonTypesWriter::new(store.clone());

    let list = LessonTypesList {
        year: 2028,
        list: vec![LessonType {
            id: 1,
            short_name: "Лек".into(),
            long_name: "Лекція".into(),
        }],
    };

    writer.apply(&payload(&list)).await.unwrap();
    assert_eq!(store.bgsave_calls(), 1);
    assert_eq!(
        store.string(keys::LESSON_TYPES_KEY).unwrap(),
        serde_json::to_string(&list.list).unwrap()
    );

    // same list again: stored value matches, no snapshot
    writer.apply(&payload(&list)).await.unwrap();
    assert_eq!(store.bgsave_calls(), 1);

    let mut changed = list.clone();
    changed.list.push(LessonType {
        id: 2,
        short_name: "Пр".into(),
        long_name: "Практика".into(),
    });
    writer.apply(&payload(&changed)).await.unwrap();
    assert_eq!(store.bgsave_calls(), 2);
}
