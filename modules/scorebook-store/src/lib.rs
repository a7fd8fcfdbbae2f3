//! Projection core: applies gradebook events to the key-value store.
//!
//! The store itself is abstracted behind the [`Store`] capability trait so
//! the writers can run against the production Redis client or the in-memory
//! fake in tests. The writers share one uniform [`writers::EventWriter`]
//! contract, which is what lets the connectors in the ingest binary treat
//! them identically.

pub mod discipline_name;
pub mod error;
pub mod feed;
pub mod keys;
pub mod lesson_exists;
pub mod max_lesson;
pub mod redis_store;
pub mod store;
pub mod writers;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use error::{StoreError, WriteError};
pub use feed::ScoresFeedQueue;
pub use lesson_exists::LessonExistChecker;
pub use max_lesson::MaxLessonTracker;
pub use redis_store::RedisStore;
pub use store::{Store, StoreOp, TxnOutcome};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
