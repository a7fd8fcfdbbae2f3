//! Wire-level event types shared by the gradebook services.
//!
//! Every event travels as a Kafka record whose key is the event name and
//! whose value is UTF-8 JSON with camelCase fields.

pub mod topics;
pub mod types;

pub use topics::*;
pub use types::*;
