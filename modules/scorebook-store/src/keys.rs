//! Store key templates.
//!
//! Every component joins on these keys, so they live in one place. Year and
//! semester prefix the per-term entities; the year prefix is also what the
//! year-rotation writer scans to drop a superseded term wholesale.

pub const CURRENT_YEAR_KEY: &str = "currentYear";
pub const LESSON_TYPES_KEY: &str = "lessonTypes";
pub const MAX_LESSON_ID_KEY: &str = "max-lesson-id";

/// Hash holding `{name, origName}` for one discipline.
pub fn discipline_key(year: i32, discipline_id: u64) -> String {
    format!("{year}:discipline:{discipline_id}")
}

/// Hash of lesson id → `YYMMDD{typeId}` for one discipline.
pub fn lessons_key(year: i32, semester: u8, discipline_id: u64) -> String {
    format!("{year}:{semester}:lessons:{discipline_id}")
}

pub fn lesson_field(lesson_id: u64) -> String {
    lesson_id.to_string()
}

/// Short-lived tombstone left behind when a lesson is deleted.
pub fn deleted_lesson_key(year: i32, semester: u8, discipline_id: u64, lesson_id: u64) -> String {
    format!("{year}:{semester}:deleted-lessons:{discipline_id}:{lesson_id}")
}

/// Hash of `{lessonId}:{lessonPart}` → score for one student in one discipline.
pub fn scores_key(year: i32, semester: u8, student_id: u64, discipline_id: u64) -> String {
    format!("{year}:{semester}:scores:{student_id}:{discipline_id}")
}

pub fn score_field(lesson_id: u64, lesson_part: u8) -> String {
    format!("{lesson_id}:{lesson_part}")
}

/// Sorted set of student id → score total for one discipline.
pub fn totals_key(year: i32, semester: u8, discipline_id: u64) -> String {
    format!("{year}:{semester}:totals:{discipline_id}")
}

/// Set of discipline ids a student has scores in.
pub fn student_disciplines_key(year: i32, semester: u8, student_id: u64) -> String {
    format!("{year}:{semester}:student_disciplines:{student_id}")
}

/// Scan pattern matching every key of one education year.
pub fn year_pattern(year: i32) -> String {
    format!("{year}:*")
}
