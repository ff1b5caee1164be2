//! Topic and device identity registry.
//!
//! Identities are discovered on write: the first metric naming an unseen
//! device or topic creates its row. Creation is an insert that ignores
//! duplicates followed by a re-read. A writer that loses a race against an
//! uncommitted insert on another connection gets a constraint error and no
//! visible row; it backs off and retries until the winner's row is visible.

use std::time::Duration;

use duckdb::{Connection, params};

use crate::storage::StorageError;
use crate::storage::types::{DeviceId, DeviceType, Topic, TopicId};

/// Insert attempts before a conflicting key is reported as an error.
const INSERT_ATTEMPTS: u32 = 10;

/// Back-off unit between conflicting inserts; grows linearly per attempt.
const CONFLICT_BACKOFF: Duration = Duration::from_millis(5);

/// Return the id of device `name`, creating it as not classified if needed.
///
/// # Errors
/// `StorageError::InvalidData` if `name` is empty or the id space is exhausted.
pub fn ensure_device(conn: &Connection, name: &str) -> Result<DeviceId, StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidData(
            "can't insert a device without a name".to_string(),
        ));
    }
    if let Some(id) = find_device(conn, name)? {
        return Ok(id);
    }

    tracing::debug!(device = name, "Device not found, creating it as not classified");
    insert_or_find(
        "device",
        name,
        || {
            conn.prepare_cached(
                "INSERT INTO device (name, device_type) VALUES (?, ?)
                 ON CONFLICT (name) DO NOTHING",
            )?
            .execute(params![name, DeviceType::NotClassified.as_ref()])
        },
        || find_device(conn, name),
    )
}

/// Return the id of `topic`, creating it for `device_name` if needed.
///
/// Units and device are recorded only when the topic is created; later
/// calls with a different unit return the existing id unchanged.
pub fn ensure_topic(
    conn: &Connection,
    topic: &str,
    units: &str,
    device_name: &str,
) -> Result<TopicId, StorageError> {
    let device_id = ensure_device(conn, device_name)?;
    if let Some(found) = find_topic(conn, topic)? {
        return Ok(found.id);
    }

    let id = insert_or_find(
        "topic",
        topic,
        || {
            conn.prepare_cached(
                "INSERT INTO topic (topic, units, id_device) VALUES (?, ?, ?)
                 ON CONFLICT (topic) DO NOTHING",
            )?
            .execute(params![topic, units, i64::from(device_id)])
        },
        || Ok(find_topic(conn, topic)?.map(|found| found.id)),
    )?;
    tracing::debug!(topic, topic_id = id, "Topic registered");
    Ok(id)
}

/// Run `insert`, then `find`, until the row is visible.
///
/// Only a conflicting insert is retried; any other failure is returned.
fn insert_or_find<T>(
    table: &str,
    key: &str,
    mut insert: impl FnMut() -> duckdb::Result<usize>,
    mut find: impl FnMut() -> Result<Option<T>, StorageError>,
) -> Result<T, StorageError> {
    let mut attempt = 1;
    loop {
        let inserted = insert();
        if let Some(found) = find()? {
            return Ok(found);
        }
        let retry = match &inserted {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => is_conflict(e),
        };
        if !retry || attempt >= INSERT_ATTEMPTS {
            return match inserted {
                Err(e) => Err(e.into()),
                Ok(_) => Err(StorageError::InvalidData(format!(
                    "{table} '{key}' was not inserted"
                ))),
            };
        }

        tracing::debug!(table, key, attempt, "Concurrent insert in progress, retrying");
        std::thread::sleep(CONFLICT_BACKOFF * attempt);
        attempt += 1;
    }
}

fn is_conflict(e: &duckdb::Error) -> bool {
    let message = e.to_string().to_ascii_lowercase();
    message.contains("duplicate key") || message.contains("conflict")
}

/// Look up a topic by its full topic string.
pub fn find_topic(conn: &Connection, topic: &str) -> Result<Option<Topic>, StorageError> {
    let row = conn.query_row(
        "SELECT id, topic, units, id_device FROM topic WHERE topic = ?",
        [topic],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        },
    );

    match row {
        Ok((id, topic, units, device_id)) => Ok(Some(Topic {
            id: to_id(id, "topic")?,
            topic,
            units,
            device_id: to_id(device_id, "device")?,
        })),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn find_device(conn: &Connection, name: &str) -> Result<Option<DeviceId>, StorageError> {
    match conn.query_row(
        "SELECT id_device FROM device WHERE name = ?",
        [name],
        |row| row.get::<_, i64>(0),
    ) {
        Ok(id) => to_id(id, "device").map(Some),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn to_id(raw: i64, table: &str) -> Result<u16, StorageError> {
    u16::try_from(raw)
        .map_err(|_| StorageError::InvalidData(format!("{table} id {raw} exceeds 16 bits")))
}
