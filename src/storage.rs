//! Storage Layer
//!
//! DuckDB row store behind an r2d2 pool:
//! - **Registry**: discover-on-write device and topic identities
//! - **Cache**: write-back buffer flushed as one multi-row upsert
//! - **Measurements**: range reads, asset purge and retention deletes
//!
//! # Components
//!
//! - [`Store`]: Pooled, pinged connections to the row store
//! - [`MultiRowCache`]: Pending measurement rows
//! - [`registry`]: `ensure_device` / `ensure_topic` / `find_topic`
//! - [`measurements`]: `select_measurements` / `delete_asset` / `purge_step_older_than`

pub mod cache;
mod error;
pub mod measurements;
pub mod pool;
pub mod registry;
mod schema;
mod types;

pub use cache::{CacheEntry, DEFAULT_MAX_DELAY, DEFAULT_MAX_ROW, MultiRowCache};
pub use error::StorageError;
pub use measurements::AssetPurge;
pub use pool::{Store, StoreConnection};
pub use types::{DeviceId, DeviceType, Measurement, Topic, TopicId};
