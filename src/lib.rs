//! Metric Store - time-series metric ingestion and aggregation agent
//!
//! This crate stores numeric metrics published on a message bus and answers
//! range queries over them. It can be embedded as a library or run as the
//! standalone `metric-store` binary.
//!
//! # Architecture
//!
//! - **Codec**: decimal text to `mantissa × 10^scale` integers
//! - **Storage**: DuckDB row store with a topic/device registry and a write-back cache
//! - **Query**: the `aggregated data` mailbox protocol
//! - **Bus**: message types and the transport seam
//! - **Agent**: the single-owner dispatch loop tying it all together
//!
//! # Example
//!
//! ```rust,no_run
//! use metric_store::{AgentBuilder, MemoryTransport, Store};
//!
//! let store = Store::open("metric-store.db", 4).unwrap();
//! let handles = AgentBuilder::new(store).build(MemoryTransport::new()).unwrap();
//! handles.inbox.flush().unwrap();
//! handles.shutdown().unwrap();
//! ```

pub mod agent;
pub mod bus;
pub mod codec;
pub mod config;
pub mod query;
pub mod storage;

pub use agent::{AgentBuilder, AgentError, AgentHandles, Inbox, MetricPoller, RetentionPolicy};
pub use bus::{
    AssetEvent, ControlCommand, Delivery, Inbound, MemoryTransport, MetricEvent, StdioTransport,
    StreamMessage, Transport,
};
pub use config::AppConfig;
pub use query::{AGGREGATE_SUBJECT, ErrorReason, QueryEngine};
pub use storage::{Store, StorageError};
