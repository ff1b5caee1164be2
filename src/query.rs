//! Aggregate query engine.
//!
//! Answers `aggregated data` mailbox requests: a correlation id followed by
//! `GET, asset, quantity, step, type, start, end, ordered`. The series topic
//! is `<quantity>_<type>_<step>@<asset>`.

mod engine;
mod request;

pub use engine::{QueryEngine, Reply};
pub use request::{AGGREGATE_SUBJECT, AggregateRequest, ErrorReason};
