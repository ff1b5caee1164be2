//! Measurement reads and maintenance deletes.

use duckdb::{Connection, params};

use crate::storage::StorageError;
use crate::storage::types::{Measurement, TopicId};

/// Rows removed by an asset purge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPurge {
    pub measurements: usize,
    /// Ids of the deleted topic rows.
    pub topic_ids: Vec<TopicId>,
}

/// Select the measurements of `topic` with `start <= ts <= end`.
///
/// When `ordered` is false rows come back in the store's natural order.
pub fn select_measurements(
    conn: &Connection,
    topic: &str,
    start: i64,
    end: i64,
    ordered: bool,
) -> Result<Vec<Measurement>, StorageError> {
    let mut sql = String::from(
        "SELECT m.ts, m.value, m.scale
         FROM measurement m
         JOIN topic t ON m.id_topic = t.id
         WHERE t.topic = ? AND m.ts >= ? AND m.ts <= ?",
    );
    if ordered {
        sql.push_str(" ORDER BY m.ts ASC");
    }

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![topic, start, end], |row| {
        Ok(Measurement {
            timestamp: row.get(0)?,
            value: row.get(1)?,
            scale: row.get(2)?,
        })
    })?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(StorageError::from)
}

/// Delete every measurement and topic whose topic ends with `@<asset_name>`.
pub fn delete_asset(conn: &mut Connection, asset_name: &str) -> Result<AssetPurge, StorageError> {
    if asset_name.is_empty() {
        return Err(StorageError::InvalidData(
            "can't delete measurements of an unnamed asset".to_string(),
        ));
    }
    let suffix = format!("@{asset_name}");

    let tx = conn.transaction()?;
    let topic_ids = {
        let mut stmt = tx.prepare("SELECT id FROM topic WHERE ends_with(topic, ?)")?;
        let ids = stmt.query_map(params![suffix], |row| row.get::<_, i64>(0))?;
        ids.collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|id| {
                TopicId::try_from(id)
                    .map_err(|_| StorageError::InvalidData(format!("topic id {id} exceeds 16 bits")))
            })
            .collect::<Result<Vec<_>, _>>()?
    };
    let measurements = tx.execute(
        "DELETE FROM measurement
         WHERE id_topic IN (SELECT id FROM topic WHERE ends_with(topic, ?))",
        params![suffix],
    )?;
    let topics = tx.execute("DELETE FROM topic WHERE ends_with(topic, ?)", params![suffix])?;
    tx.commit()?;

    tracing::info!(asset = asset_name, measurements, topics, "Asset measurements deleted");
    Ok(AssetPurge {
        measurements,
        topic_ids,
    })
}

/// Delete measurements of `step` topics older than `cutoff` (unix seconds).
///
/// A step topic has the form `<quantity>_<type>_<step>@<asset>`.
pub fn purge_step_older_than(
    conn: &Connection,
    step: &str,
    cutoff: i64,
) -> Result<usize, StorageError> {
    let marker = format!("_{step}@");
    let deleted = conn.execute(
        "DELETE FROM measurement
         WHERE ts < ?
           AND id_topic IN (SELECT id FROM topic WHERE contains(topic, ?))",
        params![cutoff, marker],
    )?;
    tracing::debug!(step, cutoff, deleted, "Expired measurements purged");
    Ok(deleted)
}
