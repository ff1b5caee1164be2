//! Auxiliary poller for pull-based metric sources.
//!
//! Polled metrics are pushed into the agent inbox like stream deliveries,
//! so the dispatch loop stays the only owner of the cache.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::agent::Inbox;
use crate::bus::{Delivery, MetricEvent, StreamMessage};

/// Default interval between polls.
pub const DEFAULT_SOURCE_INTERVAL: Duration = Duration::from_secs(30);

/// Errors raised while polling a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode metrics: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A source of metrics that has to be asked for them.
#[async_trait]
pub trait MetricSource: Send + Sync + 'static {
    /// Name used as the sender of polled metrics.
    fn name(&self) -> &str;

    /// Fetch the metrics currently exposed by the source.
    async fn poll(&self) -> Result<Vec<MetricEvent>, SourceError>;
}

/// Source reading a JSON array of metrics from a file on every poll.
///
/// A missing file yields no metrics.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("file:{}", path.display()),
            path,
        }
    }
}

#[async_trait]
impl MetricSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&self) -> Result<Vec<MetricEvent>, SourceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Periodically polls sources and forwards their metrics to the agent.
pub struct MetricPoller {
    sources: Vec<Arc<dyn MetricSource>>,
    interval: Duration,
    inbox: Inbox,
}

impl MetricPoller {
    pub fn new(inbox: Inbox, interval: Duration) -> Self {
        Self {
            sources: Vec::new(),
            interval,
            inbox,
        }
    }

    pub fn add_source(mut self, source: impl MetricSource) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Poll every source once. Returns the number of metrics forwarded.
    pub async fn poll_once(&self) -> usize {
        let mut forwarded = 0;
        for source in &self.sources {
            let metrics = match source.poll().await {
                Ok(metrics) => metrics,
                Err(e) => {
                    tracing::error!(source = source.name(), error = %e, "Metric source poll failed");
                    continue;
                }
            };
            for metric in metrics {
                let delivery = Delivery::Stream {
                    sender: source.name().to_string(),
                    subject: metric.topic(),
                    message: StreamMessage::Metric(metric),
                };
                if self.inbox.try_send(delivery).is_ok() {
                    forwarded += 1;
                }
            }
        }
        tracing::debug!(forwarded, sources = self.sources.len(), "Metric sources polled");
        forwarded
    }

    /// Run the poller on the current tokio runtime until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}
