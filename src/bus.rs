//! Message bus interfaces.
//!
//! The agent consumes [`Inbound`] values (control commands and deliveries)
//! from its inbox and answers mailbox requests through a [`Transport`].
//!
//! # Components
//!
//! - [`message`]: stream, mailbox and control message types
//! - [`Transport`]: connect, subscribe and reply
//! - [`MemoryTransport`]: records traffic, for embedding and tests
//! - [`StdioTransport`]: JSON lines over standard streams

pub mod message;
pub mod stdio;
mod transport;

pub use message::{
    AssetEvent, COMPUTED_TYPE_TAG, ControlCommand, Delivery, Inbound, MetricEvent, StreamMessage,
    TIME_TAG,
};
pub use stdio::StdioTransport;
pub use transport::{MemoryTransport, SentMessage, Transport, TransportError};
