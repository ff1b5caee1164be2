//! Messages exchanged with the bus.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aux tag set by the computation module on the metrics it publishes.
pub const COMPUTED_TYPE_TAG: &str = "x-cm-type";

/// Aux key carrying the measurement time in unix seconds.
pub const TIME_TAG: &str = "time";

/// A metric published on a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Metric type, e.g. `realpower_min_15m`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Source element (asset) name.
    pub name: String,
    /// Decimal text value.
    pub value: String,
    pub unit: String,
    #[serde(default)]
    pub aux: BTreeMap<String, String>,
}

impl MetricEvent {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            value: value.into(),
            unit: unit.into(),
            aux: BTreeMap::new(),
        }
    }

    /// Set an aux entry.
    pub fn with_aux(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.aux.insert(key.into(), value.into());
        self
    }

    /// Topic string `<type>@<name>` under which the metric is stored.
    pub fn topic(&self) -> String {
        format!("{}@{}", self.kind, self.name)
    }

    /// True when the metric was produced by the computation module.
    pub fn is_computed(&self) -> bool {
        self.aux.contains_key(COMPUTED_TYPE_TAG)
    }

    /// Measurement time from the `time` aux entry, if present and numeric.
    pub fn time(&self) -> Option<i64> {
        self.aux.get(TIME_TAG).and_then(|t| t.parse().ok())
    }
}

/// An asset lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEvent {
    pub operation: String,
    pub name: String,
}

impl AssetEvent {
    pub fn new(operation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            name: name.into(),
        }
    }

    pub fn is_delete(&self) -> bool {
        self.operation == "delete"
    }
}

/// Decoded payload of a stream delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMessage {
    Metric(MetricEvent),
    Asset(AssetEvent),
}

/// A message delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    /// Broadcast on a subscribed stream.
    Stream {
        sender: String,
        subject: String,
        message: StreamMessage,
    },
    /// Point-to-point request; replies go back to `sender` on `subject`.
    Mailbox {
        sender: String,
        subject: String,
        #[serde(default)]
        frames: Vec<String>,
    },
    /// Service-addressed request.
    Service {
        sender: String,
        subject: String,
        #[serde(default)]
        frames: Vec<String>,
    },
}

/// Lifecycle commands sent to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "UPPERCASE")]
pub enum ControlCommand {
    /// Attach to the bus at `endpoint` as `address`.
    Connect { endpoint: String, address: String },
    /// Subscribe to `stream`, filtering subjects by `pattern`.
    Consumer { stream: String, pattern: String },
    /// Write pending measurements now.
    Flush,
    /// Flush and stop.
    #[serde(alias = "$TERM")]
    Terminate,
}

/// Anything the agent's inbox accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inbound {
    Control(ControlCommand),
    Delivery(Delivery),
}

impl From<ControlCommand> for Inbound {
    fn from(cmd: ControlCommand) -> Self {
        Inbound::Control(cmd)
    }
}

impl From<Delivery> for Inbound {
    fn from(delivery: Delivery) -> Self {
        Inbound::Delivery(delivery)
    }
}
