//! Metric store agent.
//!
//! A single dispatch thread owns the write-back cache:
//! - **Ingestion**: stream metrics go through codec, registry and cache
//! - **Queries**: mailbox requests are answered by the query engine
//! - **Maintenance**: asset purges, periodic flushes and retention
//!
//! # Components
//!
//! - [`AgentBuilder`] / [`AgentHandles`]: spawn and stop the agent
//! - [`Inbox`]: cloneable sender feeding the dispatch loop
//! - [`MetricStoreServer`]: the dispatch loop itself
//! - [`MetricPoller`]: optional tokio task polling [`MetricSource`]s

mod builder;
mod error;
mod inbox;
pub mod ingest;
pub mod poller;
pub mod retention;
mod server;

pub use builder::{AgentBuilder, AgentHandles, DEFAULT_CHANNEL_CAPACITY};
pub use error::{AgentError, IngestError};
pub use inbox::Inbox;
pub use ingest::{IngestOutcome, ingest_metric};
pub use poller::{FileSource, MetricPoller, MetricSource, SourceError};
pub use retention::RetentionPolicy;
pub use server::{DEFAULT_POLL_INTERVAL, MetricStoreServer, ServerSettings};
