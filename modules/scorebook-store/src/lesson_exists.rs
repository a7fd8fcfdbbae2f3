use std::sync::Arc;

use crate::keys;
use crate::store::Store;

/// Probes whether a lesson is known to the projection: either materialised
/// in the lessons hash, or recently deleted and still covered by its
/// tombstone. Store errors degrade to `false`: the caller only uses this to
/// defer feed emission, never for correctness of the stored data.
pub struct LessonExistChecker {
    store: Arc<dyn Store>,
}

impl LessonExistChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn exists(
        &self,
        year: i32,
        semester: u8,
        discipline_id: u64,
        lesson_id: u64,
    ) -> bool {
        let lessons_key = keys::lessons_key(year, semester, discipline_id);
        if self
            .store
            .hexists(&lessons_key, &keys::lesson_field(lesson_id))
            .await
            .unwrap_or(false)
        {
            return true;
        }

        self.store
            .exists(&keys::deleted_lesson_key(year, semester, discipline_id, lesson_id))
            .await
            .unwrap_or(false)
    }
}
