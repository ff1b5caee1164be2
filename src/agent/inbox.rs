//! Sending side of the agent's inbox.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::SyncSender;

use crate::agent::AgentError;
use crate::bus::{ControlCommand, Delivery, Inbound};

/// Cloneable handle feeding the dispatch loop.
///
/// [`Inbox::send`] blocks while the inbox is full; [`Inbox::try_send`] drops
/// the message instead and counts it.
#[derive(Clone)]
pub struct Inbox {
    tx: SyncSender<Inbound>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl Inbox {
    pub fn new(tx: SyncSender<Inbound>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Messages dropped by [`Inbox::try_send`] because the inbox was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue a message, waiting for room.
    pub fn send(&self, message: impl Into<Inbound>) -> Result<(), AgentError> {
        self.tx
            .send(message.into())
            .map_err(|_| AgentError::ChannelSend)
    }

    /// Queue a message without blocking.
    pub fn try_send(&self, message: impl Into<Inbound>) -> Result<(), AgentError> {
        if self.tx.try_send(message.into()).is_err() {
            tracing::warn!("Inbox full, dropping message");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(AgentError::ChannelSend);
        }
        Ok(())
    }

    pub fn deliver(&self, delivery: Delivery) -> Result<(), AgentError> {
        self.send(delivery)
    }

    pub fn control(&self, command: ControlCommand) -> Result<(), AgentError> {
        self.send(command)
    }

    /// Force an unconditional cache flush.
    pub fn flush(&self) -> Result<(), AgentError> {
        self.send(ControlCommand::Flush)
    }

    /// Ask the agent to flush and stop.
    pub fn terminate(&self) -> Result<(), AgentError> {
        self.send(ControlCommand::Terminate)
    }
}
