//! Outbound side of the bus.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

/// Errors raised by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// A send was attempted before CONNECT.
    #[error("transport is not connected")]
    NotConnected,

    #[error("transport is closed")]
    Closed,
}

/// Connection to the message bus as seen by the dispatch loop.
///
/// Calls are made from the agent thread only, so implementations need to be
/// `Send` but not `Sync`.
pub trait Transport: Send + 'static {
    /// Attach to the bus at `endpoint` under the mailbox `address`.
    fn connect(&mut self, endpoint: &str, address: &str) -> Result<(), TransportError>;

    /// Subscribe to `stream` for subjects matching `pattern`.
    fn set_consumer(&mut self, stream: &str, pattern: &str) -> Result<(), TransportError>;

    /// Send a mailbox message to `recipient`.
    fn send_to(
        &mut self,
        recipient: &str,
        subject: &str,
        frames: Vec<String>,
    ) -> Result<(), TransportError>;
}

/// A mailbox message passed to [`Transport::send_to`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SentMessage {
    pub recipient: String,
    pub subject: String,
    pub frames: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    connection: Option<(String, String)>,
    consumers: Vec<(String, String)>,
    sent: Vec<SentMessage>,
}

/// Transport that records everything in memory.
///
/// Clones share the same record, so a test can keep one clone while the
/// agent owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(endpoint, address)` of the last CONNECT.
    pub fn connection(&self) -> Option<(String, String)> {
        self.lock().ok().and_then(|s| s.connection.clone())
    }

    /// `(stream, pattern)` subscriptions in the order they were made.
    pub fn consumers(&self) -> Vec<(String, String)> {
        self.lock().map(|s| s.consumers.clone()).unwrap_or_default()
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().map(|s| s.sent.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, TransportError> {
        self.state.lock().map_err(|_| TransportError::Closed)
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, endpoint: &str, address: &str) -> Result<(), TransportError> {
        self.lock()?.connection = Some((endpoint.to_string(), address.to_string()));
        Ok(())
    }

    fn set_consumer(&mut self, stream: &str, pattern: &str) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        if state.connection.is_none() {
            return Err(TransportError::NotConnected);
        }
        state.consumers.push((stream.to_string(), pattern.to_string()));
        Ok(())
    }

    fn send_to(
        &mut self,
        recipient: &str,
        subject: &str,
        frames: Vec<String>,
    ) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        if state.connection.is_none() {
            return Err(TransportError::NotConnected);
        }
        state.sent.push(SentMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            frames,
        });
        Ok(())
    }
}
