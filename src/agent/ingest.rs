//! Metric ingestion path: codec, registry, cache.

use crate::agent::IngestError;
use crate::bus::MetricEvent;
use crate::codec;
use crate::storage::{MultiRowCache, Store, TopicId, registry};

/// What happened to an ingested metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Encoded and queued in the cache.
    Buffered(TopicId),
    /// Not produced by the computation module; not stored.
    Ignored,
}

/// Encode `metric` and queue it in `cache`.
///
/// The measurement time is the `time` aux entry, or `received_at` when that
/// is missing. The store is only touched once the metric has been validated.
pub fn ingest_metric(
    store: &Store,
    cache: &mut MultiRowCache,
    metric: &MetricEvent,
    received_at: i64,
) -> Result<IngestOutcome, IngestError> {
    if !metric.is_computed() {
        return Ok(IngestOutcome::Ignored);
    }

    let topic = metric.topic();
    if topic.starts_with('@') {
        return Err(IngestError::MalformedTopic(topic));
    }

    let scaled = codec::encode(&metric.value)?;
    let time = metric.time().unwrap_or(received_at);

    let conn = store.connection()?;
    let topic_id = registry::ensure_topic(&conn, &topic, &metric.unit, &metric.name)?;
    cache.push(time, scaled.mantissa, i16::from(scaled.scale), topic_id);

    tracing::trace!(topic = %topic, time, topic_id, "Metric buffered");
    Ok(IngestOutcome::Buffered(topic_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{COMPUTED_TYPE_TAG, TIME_TAG};
    use crate::codec::CodecError;
    use crate::storage::{StorageError, measurements};

    fn computed(kind: &str, name: &str, value: &str) -> MetricEvent {
        MetricEvent::new(kind, name, value, "W").with_aux(COMPUTED_TYPE_TAG, "min")
    }

    #[test]
    fn test_buffers_computed_metric() {
        let store = Store::in_memory().unwrap();
        let mut cache = MultiRowCache::default();
        let metric = computed("power", "assetX", "2.45").with_aux(TIME_TAG, "1000");

        let outcome = ingest_metric(&store, &mut cache, &metric, 5).unwrap();
        assert!(matches!(outcome, IngestOutcome::Buffered(_)));
        assert_eq!(cache.len(), 1);

        let conn = store.connection().unwrap();
        cache.flush(&conn).unwrap();
        let rows = measurements::select_measurements(&conn, "power@assetX", 0, 2000, true).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, 1000);
        assert_eq!((rows[0].value, rows[0].scale), (245, -2));
    }

    #[test]
    fn test_reception_time_is_default() {
        let store = Store::in_memory().unwrap();
        let mut cache = MultiRowCache::default();
        ingest_metric(&store, &mut cache, &computed("power", "a", "1"), 42).unwrap();

        let conn = store.connection().unwrap();
        cache.flush(&conn).unwrap();
        let rows = measurements::select_measurements(&conn, "power@a", 42, 42, false).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_ignores_raw_metrics() {
        let store = Store::in_memory().unwrap();
        let mut cache = MultiRowCache::default();
        let metric = MetricEvent::new("power", "assetX", "2.45", "W");

        let outcome = ingest_metric(&store, &mut cache, &metric, 5).unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_rejects_malformed_topic_and_value() {
        let store = Store::in_memory().unwrap();
        let mut cache = MultiRowCache::default();

        let err = ingest_metric(&store, &mut cache, &computed("", "assetX", "1"), 5).unwrap_err();
        assert!(matches!(err, IngestError::MalformedTopic(ref t) if t == "@assetX"));

        let err = ingest_metric(&store, &mut cache, &computed("power", "a", "12x43"), 5).unwrap_err();
        assert!(matches!(err, IngestError::Value(CodecError::NotANumber(_))));

        assert!(cache.is_empty());
    }

    #[test]
    fn test_rejects_unnamed_source() {
        let store = Store::in_memory().unwrap();
        let mut cache = MultiRowCache::default();
        let err = ingest_metric(&store, &mut cache, &computed("power", "", "1"), 5).unwrap_err();
        assert!(matches!(err, IngestError::Storage(StorageError::InvalidData(_))));
        assert!(cache.is_empty());
    }
}
