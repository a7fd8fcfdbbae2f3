//! Process-wide score-change counters, tagged by event source.
//!
//! Write-only from the workers; the exporter (wired elsewhere) reads them.

use std::sync::atomic::{AtomicU64, Ordering};

use scorebook_events::ScoreSource;

pub static REALTIME_SCORE_CHANGES: AtomicU64 = AtomicU64::new(0);
pub static SECONDARY_SCORE_CHANGES: AtomicU64 = AtomicU64::new(0);

pub fn record_score_change(source: ScoreSource) {
    let counter = match source {
        ScoreSource::Realtime => &REALTIME_SCORE_CHANGES,
        ScoreSource::Secondary => &SECONDARY_SCORE_CHANGES,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}
