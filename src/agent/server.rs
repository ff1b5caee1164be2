//! Dispatch loop.
//!
//! One thread owns the write-back cache and the transport. Control
//! commands, stream deliveries and mailbox requests all arrive through a
//! single bounded MPSC inbox, so every cache push and flush happens on this
//! thread without locking.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::agent::ingest::{IngestOutcome, ingest_metric};
use crate::agent::retention::RetentionPolicy;
use crate::agent::{AgentError, Inbox};
use crate::bus::{AssetEvent, ControlCommand, Delivery, Inbound, StreamMessage, Transport};
use crate::query::QueryEngine;
use crate::storage::{MultiRowCache, Store, measurements};

/// Default bound on each inbox wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Runtime settings of the dispatch loop.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub poll_interval: Duration,
    pub max_row: usize,
    pub max_delay: Duration,
    pub channel_capacity: usize,
    pub retention: RetentionPolicy,
}

/// The metric store agent.
pub struct MetricStoreServer<T: Transport> {
    store: Store,
    cache: MultiRowCache,
    engine: QueryEngine,
    transport: T,
    rx: Receiver<Inbound>,
    poll_interval: Duration,
    retention: RetentionPolicy,
    last_retention: Instant,
}

impl<T: Transport> MetricStoreServer<T> {
    /// Spawn the agent thread.
    ///
    /// Returns the thread handle and the inbox feeding it.
    pub fn spawn(
        store: Store,
        transport: T,
        settings: ServerSettings,
    ) -> Result<(JoinHandle<()>, Inbox), AgentError> {
        let (tx, rx) = mpsc::sync_channel(settings.channel_capacity);

        let server = MetricStoreServer {
            engine: QueryEngine::new(store.clone()),
            store,
            cache: MultiRowCache::new(settings.max_row, settings.max_delay),
            transport,
            rx,
            poll_interval: settings.poll_interval,
            retention: settings.retention,
            last_retention: Instant::now(),
        };
        let handle = thread::Builder::new()
            .name("metric-store".to_string())
            .spawn(move || server.run())
            .map_err(|e| AgentError::Internal(format!("failed to spawn agent thread: {e}")))?;

        Ok((handle, Inbox::new(tx)))
    }

    fn run(mut self) {
        tracing::info!(
            max_row = self.cache.max_row(),
            max_delay = ?self.cache.max_delay(),
            "Metric store agent started"
        );

        loop {
            match self.rx.recv_timeout(self.poll_interval) {
                Ok(Inbound::Control(cmd)) => {
                    if self.handle_control(cmd) {
                        break;
                    }
                }
                Ok(Inbound::Delivery(delivery)) => self.handle_delivery(delivery),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Inbox disconnected, shutting down");
                    break;
                }
            }

            if self.cache.is_ready_for_flush() {
                self.flush();
            }
            if self.last_retention.elapsed() >= self.retention.check_interval {
                self.apply_retention();
                self.last_retention = Instant::now();
            }
        }

        self.flush();
        tracing::info!(pending = self.cache.len(), "Metric store agent stopped");
    }

    /// Returns true when the loop must stop.
    fn handle_control(&mut self, cmd: ControlCommand) -> bool {
        match cmd {
            ControlCommand::Connect { endpoint, address } => {
                if let Err(e) = self.transport.connect(&endpoint, &address) {
                    tracing::error!(error = %e, %endpoint, %address, "Connect failed");
                }
            }
            ControlCommand::Consumer { stream, pattern } => {
                if let Err(e) = self.transport.set_consumer(&stream, &pattern) {
                    tracing::error!(error = %e, %stream, %pattern, "Stream subscription failed");
                }
            }
            ControlCommand::Flush => self.flush(),
            ControlCommand::Terminate => {
                tracing::info!("Metric store agent shutting down");
                return true;
            }
        }
        false
    }

    fn handle_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Stream {
                message: StreamMessage::Metric(metric),
                ..
            } => {
                let received_at = Utc::now().timestamp();
                match ingest_metric(&self.store, &mut self.cache, &metric, received_at) {
                    Ok(IngestOutcome::Buffered(_)) => {}
                    Ok(IngestOutcome::Ignored) => {
                        tracing::trace!(topic = %metric.topic(), "Metric without computation tag ignored");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, topic = %metric.topic(), value = %metric.value, "Metric dropped");
                    }
                }
            }
            Delivery::Stream {
                message: StreamMessage::Asset(asset),
                ..
            } => self.handle_asset(&asset),
            Delivery::Mailbox {
                sender,
                subject,
                frames,
            } => {
                let Some(reply) = self.engine.handle(&subject, &frames) else {
                    return;
                };
                if let Err(e) = self.transport.send_to(&sender, &subject, reply.into_frames()) {
                    tracing::error!(error = %e, %sender, %subject, "Reply failed");
                }
            }
            Delivery::Service { sender, subject, .. } => {
                tracing::warn!(%sender, %subject, "Service deliveries are not implemented");
            }
        }
    }

    fn handle_asset(&mut self, asset: &AssetEvent) {
        if !asset.is_delete() {
            tracing::debug!(operation = %asset.operation, asset = %asset.name, "Asset operation is not interesting");
            return;
        }
        tracing::debug!(asset = %asset.name, "Asset is deleted, deleting its measurements");

        self.flush();
        let result = self
            .store
            .connection()
            .and_then(|mut conn| measurements::delete_asset(&mut conn, &asset.name));
        match result {
            Ok(purge) => {
                // Rows left over by a failed flush would reference deleted topics.
                let discarded = self.cache.discard_topics(&purge.topic_ids);
                if discarded > 0 {
                    tracing::warn!(asset = %asset.name, discarded, "Unflushed rows of deleted asset discarded");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, asset = %asset.name, "Asset measurements delete failed");
            }
        }
    }

    fn flush(&mut self) {
        if self.cache.is_empty() {
            return;
        }
        let cache = &mut self.cache;
        let result = self.store.connection().and_then(|conn| cache.flush(&conn));
        if let Err(e) = result {
            tracing::error!(error = %e, pending = self.cache.len(), "Cache flush failed, rows kept");
        }
    }

    fn apply_retention(&mut self) {
        self.flush();
        let now = Utc::now().timestamp();
        match self
            .store
            .connection()
            .and_then(|conn| self.retention.apply(&conn, now))
        {
            Ok(deleted) => tracing::info!(deleted, "Retention pass completed"),
            Err(e) => tracing::error!(error = %e, "Retention pass failed"),
        }
    }
}
