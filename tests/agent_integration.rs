//! Agent Integration Tests
//!
//! Drive a running agent through its inbox and observe replies on a
//! `MemoryTransport`, the way a bus client would.

use std::time::Duration;

use metric_store::bus::{COMPUTED_TYPE_TAG, SentMessage, TIME_TAG};
use metric_store::storage::measurements;
use metric_store::{
    AGGREGATE_SUBJECT, AgentBuilder, AgentHandles, AssetEvent, ControlCommand, Delivery,
    MemoryTransport, MetricEvent, QueryEngine, Store, StreamMessage,
};
use tempfile::tempdir;

const T: i64 = 1_700_000_000;

// =============================================================================
// Test Helpers
// =============================================================================

/// Start an agent on `store` with a connected memory transport.
fn start_agent(store: Store, max_row: usize) -> (AgentHandles, MemoryTransport) {
    let transport = MemoryTransport::new();
    let handles = AgentBuilder::new(store)
        .max_row(max_row)
        .max_delay(Duration::from_secs(3600))
        .poll_interval(Duration::from_millis(20))
        .build(transport.clone())
        .expect("Failed to start agent");

    handles
        .inbox
        .control(ControlCommand::Connect {
            endpoint: "ipc://@/malamute".to_string(),
            address: "fty-metric-store".to_string(),
        })
        .unwrap();
    (handles, transport)
}

fn metric(kind: &str, asset: &str, value: &str, time: i64) -> Delivery {
    Delivery::Stream {
        sender: "agent-cm".to_string(),
        subject: format!("{kind}@{asset}"),
        message: StreamMessage::Metric(
            MetricEvent::new(kind, asset, value, "W")
                .with_aux(COMPUTED_TYPE_TAG, "min")
                .with_aux(TIME_TAG, time.to_string()),
        ),
    }
}

fn query(uuid: &str, asset: &str, start: i64, end: i64, order: &str) -> Delivery {
    let frames: [&str; 9] = [
        uuid, "GET", asset, "power", "15m", "min", &start.to_string(), &end.to_string(), order,
    ];
    Delivery::Mailbox {
        sender: "ui".to_string(),
        subject: AGGREGATE_SUBJECT.to_string(),
        frames: frames.iter().map(|f| f.to_string()).collect(),
    }
}

fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Stop the agent and return every reply it sent.
fn finish(handles: AgentHandles, transport: &MemoryTransport) -> Vec<SentMessage> {
    handles.shutdown().expect("Failed to stop agent");
    transport.sent()
}

// =============================================================================
// Ingest and Query
// =============================================================================

#[test]
fn test_ingested_metric_is_queryable() {
    let (handles, transport) = start_agent(Store::in_memory().unwrap(), 1000);
    let uuid = new_uuid();

    handles.inbox.deliver(metric("power_min_15m", "assetX", "2.45", T)).unwrap();
    handles.inbox.flush().unwrap();
    handles.inbox.deliver(query(&uuid, "assetX", T - 1, T + 1, "1")).unwrap();

    let sent = finish(handles, &transport);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "ui");
    assert_eq!(sent[0].subject, AGGREGATE_SUBJECT);

    let frames = &sent[0].frames;
    assert_eq!(frames[0], uuid);
    assert_eq!(frames[1], "OK");
    assert_eq!(frames[9], "W");
    assert_eq!(&frames[10..], &[T.to_string(), "2.45".to_string()]);
}

#[test]
fn test_raw_topic_is_stored() {
    let store = Store::in_memory().unwrap();
    let (handles, transport) = start_agent(store.clone(), 1000);

    handles.inbox.deliver(metric("power", "assetX", "2.45", T)).unwrap();
    finish(handles, &transport);

    let conn = store.connection().unwrap();
    let rows = measurements::select_measurements(&conn, "power@assetX", T - 1, T + 1, true).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp, T);
    assert_eq!(rows[0].real_value(), 2.45);
}

#[test]
fn test_row_threshold_flushes_without_command() {
    let (handles, transport) = start_agent(Store::in_memory().unwrap(), 2);

    handles.inbox.deliver(metric("power_min_15m", "ups", "1", T)).unwrap();
    handles.inbox.deliver(metric("power_min_15m", "ups", "2", T + 60)).unwrap();
    handles.inbox.deliver(query("q", "ups", T, T + 60, "1")).unwrap();

    let sent = finish(handles, &transport);
    assert_eq!(
        &sent[0].frames[10..],
        &[T.to_string(), "1".to_string(), (T + 60).to_string(), "2".to_string()]
    );
}

#[test]
fn test_duplicate_timestamp_keeps_last_value() {
    let (handles, transport) = start_agent(Store::in_memory().unwrap(), 1000);

    handles.inbox.deliver(metric("power_min_15m", "ups", "1.5", T)).unwrap();
    handles.inbox.deliver(metric("power_min_15m", "ups", "3.25", T)).unwrap();
    handles.inbox.flush().unwrap();
    handles.inbox.deliver(query("q", "ups", T, T, "0")).unwrap();

    let sent = finish(handles, &transport);
    assert_eq!(&sent[0].frames[10..], &[T.to_string(), "3.25".to_string()]);
}

// =============================================================================
// Query Errors
// =============================================================================

#[test]
fn test_query_error_replies() {
    let (handles, transport) = start_agent(Store::in_memory().unwrap(), 1000);

    handles.inbox.deliver(query("u1", "assetX", 0, 9999, "1")).unwrap();
    handles.inbox.deliver(metric("power_min_15m", "assetX", "1", 10)).unwrap();
    handles.inbox.flush().unwrap();
    handles.inbox.deliver(query("u2", "assetX", 10, 5, "1")).unwrap();
    handles.inbox.deliver(query("u3", "assetX", 0, 9999, "2")).unwrap();

    let sent = finish(handles, &transport);
    let frames: Vec<Vec<String>> = sent.into_iter().map(|m| m.frames).collect();
    assert_eq!(
        frames,
        vec![
            vec!["u1", "ERROR", "BAD_REQUEST"],
            vec!["u2", "ERROR", "BAD_TIMERANGE"],
            vec!["u3", "ERROR", "BAD_ORDERED"],
        ]
    );
}

#[test]
fn test_unaddressed_request_is_dropped() {
    let (handles, transport) = start_agent(Store::in_memory().unwrap(), 1000);

    handles
        .inbox
        .deliver(Delivery::Mailbox {
            sender: "ui".to_string(),
            subject: AGGREGATE_SUBJECT.to_string(),
            frames: vec![],
        })
        .unwrap();
    handles
        .inbox
        .deliver(Delivery::Service {
            sender: "ui".to_string(),
            subject: "anything".to_string(),
            frames: vec!["x".to_string()],
        })
        .unwrap();

    assert!(finish(handles, &transport).is_empty());
}

// =============================================================================
// Asset Lifecycle
// =============================================================================

#[test]
fn test_asset_delete_purges_only_that_asset() {
    let (handles, transport) = start_agent(Store::in_memory().unwrap(), 1000);

    handles.inbox.deliver(metric("power_min_15m", "assetX", "1", T)).unwrap();
    handles.inbox.deliver(metric("power_min_15m", "assetXY", "2", T)).unwrap();
    handles
        .inbox
        .deliver(Delivery::Stream {
            sender: "asset-agent".to_string(),
            subject: "datacenter.delete@assetX".to_string(),
            message: StreamMessage::Asset(AssetEvent::new("delete", "assetX")),
        })
        .unwrap();
    handles.inbox.deliver(query("gone", "assetX", 0, T, "1")).unwrap();
    handles.inbox.deliver(query("kept", "assetXY", 0, T, "1")).unwrap();

    let sent = finish(handles, &transport);
    assert_eq!(sent[0].frames, vec!["gone", "ERROR", "BAD_REQUEST"]);
    assert_eq!(sent[1].frames[1], "OK");
    assert_eq!(&sent[1].frames[10..], &[T.to_string(), "2".to_string()]);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_final_flush_is_persisted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metrics.db");
    let path = path.to_str().unwrap();

    {
        let (handles, transport) = start_agent(Store::open(path, 2).unwrap(), 1000);
        handles.inbox.deliver(metric("power_min_15m", "ups", "12.835", T)).unwrap();
        finish(handles, &transport);
    }

    let engine = QueryEngine::new(Store::open(path, 2).unwrap());
    let end = T.to_string();
    let frames: Vec<String> = ["p", "GET", "ups", "power", "15m", "min", "0", end.as_str(), "1"]
        .iter()
        .map(|f| f.to_string())
        .collect();
    let reply = engine
        .handle(AGGREGATE_SUBJECT, &frames)
        .expect("reply expected")
        .into_frames();
    assert_eq!(&reply[10..], &[T.to_string(), "12.835".to_string()]);
}
