//! Agent error types.

use thiserror::Error;

use crate::codec::CodecError;
use crate::storage::StorageError;

/// Errors raised while running or talking to the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The inbox is full or the agent has stopped.
    #[error("failed to send message to agent inbox")]
    ChannelSend,

    /// Internal error (e.g., thread join failure).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reasons a metric is dropped by the ingestion path.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The topic has no metric type before `@`.
    #[error("malformed topic '{0}'")]
    MalformedTopic(String),

    #[error("bad value: {0}")]
    Value(#[from] CodecError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
