//! Agent builder and handles.

use std::thread::JoinHandle;
use std::time::Duration;

use crate::agent::retention::RetentionPolicy;
use crate::agent::server::{DEFAULT_POLL_INTERVAL, MetricStoreServer, ServerSettings};
use crate::agent::{AgentError, Inbox};
use crate::bus::Transport;
use crate::storage::{DEFAULT_MAX_DELAY, DEFAULT_MAX_ROW, Store};

/// Default inbox capacity.
///
/// At the default cache thresholds this holds about ten full batches of
/// metrics before senders block.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Builder for the metric store agent.
pub struct AgentBuilder {
    store: Store,
    settings: ServerSettings,
}

impl AgentBuilder {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            settings: ServerSettings {
                poll_interval: DEFAULT_POLL_INTERVAL,
                max_row: DEFAULT_MAX_ROW,
                max_delay: DEFAULT_MAX_DELAY,
                channel_capacity: DEFAULT_CHANNEL_CAPACITY,
                retention: RetentionPolicy::default(),
            },
        }
    }

    /// Set the number of pending rows that triggers a flush.
    pub fn max_row(mut self, rows: usize) -> Self {
        self.settings.max_row = rows;
        self
    }

    /// Set the age of the oldest pending row that triggers a flush.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.settings.max_delay = delay;
        self
    }

    /// Set the bound on each inbox wait.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.settings.channel_capacity = capacity;
        self
    }

    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.settings.retention = policy;
        self
    }

    /// Spawn the agent on `transport` and return its handles.
    ///
    /// Fails without spawning when the store hands out no connection.
    pub fn build<T: Transport>(self, transport: T) -> Result<AgentHandles, AgentError> {
        if self.settings.max_row == 0 {
            return Err(AgentError::Internal("max_row must be positive".to_string()));
        }
        drop(self.store.connection()?);
        let (handle, inbox) = MetricStoreServer::spawn(self.store, transport, self.settings)?;
        Ok(AgentHandles {
            inbox,
            handle: Some(handle),
        })
    }
}

/// Handles to a running agent.
pub struct AgentHandles {
    /// Inbox of the dispatch loop.
    pub inbox: Inbox,
    handle: Option<JoinHandle<()>>,
}

impl AgentHandles {
    /// Stop the agent after a final flush and wait for it.
    pub fn shutdown(mut self) -> Result<(), AgentError> {
        // The agent may already be gone after a disconnect.
        let _ = self.inbox.terminate();

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| AgentError::Internal("Failed to join agent thread".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for AgentHandles {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.inbox.terminate();
            let _ = handle.join();
        }
    }
}
