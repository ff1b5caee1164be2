//! Core data types for the storage layer.
//!
//! - [`Measurement`]: one stored data point of a topic
//! - [`Topic`]: a measured series and the device it belongs to
//! - [`DeviceType`]: classification recorded for discovered devices

use strum_macros::{AsRefStr, Display, EnumString};

/// Identifier of a row in the `topic` table.
pub type TopicId = u16;

/// Identifier of a row in the `device` table.
pub type DeviceId = u16;

/// A stored data point: `value × 10^scale` at `timestamp` (unix seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub timestamp: i64,
    pub value: i32,
    pub scale: i16,
}

impl Measurement {
    /// Real value of this measurement.
    pub fn real_value(&self) -> f64 {
        crate::codec::decode(self.value, self.scale)
    }
}

/// A measured series.
///
/// `topic` is either `<metric-type>@<source>` for ingested metrics or
/// `<quantity>_<aggregation>_<step>@<asset>` for computed aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: TopicId,
    pub topic: String,
    pub units: String,
    pub device_id: DeviceId,
}

/// Classification of a discovered device.
///
/// Devices are created as [`DeviceType::NotClassified`] when first referenced
/// by a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    #[default]
    NotClassified,
}
