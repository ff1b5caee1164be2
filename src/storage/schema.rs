//! Database schema definitions.

use duckdb::Connection;

use crate::storage::StorageError;

/// SQL statement for creating the device table.
///
/// Devices are discovered on write: a metric referencing an unseen source
/// creates a `not_classified` row.
pub const DEVICE_TABLE_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS device_id_seq START 1;
CREATE TABLE IF NOT EXISTS device (
    id_device   BIGINT PRIMARY KEY DEFAULT NEXTVAL('device_id_seq'),
    name        VARCHAR NOT NULL UNIQUE,
    device_type VARCHAR NOT NULL DEFAULT 'not_classified'
);
"#;

/// SQL statement for creating the topic table.
///
/// `topic` is unique; units and device are fixed when the row is created.
pub const TOPIC_TABLE_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS topic_id_seq START 1;
CREATE TABLE IF NOT EXISTS topic (
    id          BIGINT PRIMARY KEY DEFAULT NEXTVAL('topic_id_seq'),
    topic       VARCHAR NOT NULL UNIQUE,
    units       VARCHAR NOT NULL,
    id_device   BIGINT NOT NULL
);
"#;

/// SQL statement for creating the measurement table.
///
/// Keyed by `(id_topic, ts)`; a duplicate key overwrites value and scale.
pub const MEASUREMENT_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS measurement (
    id_topic    BIGINT NOT NULL,
    ts          BIGINT NOT NULL,
    value       INTEGER NOT NULL,
    scale       SMALLINT NOT NULL,
    PRIMARY KEY (id_topic, ts)
);
"#;

/// Initialize the database schema.
///
/// Creates all tables and sequences if they don't exist.
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(DEVICE_TABLE_DDL)?;
    conn.execute_batch(TOPIC_TABLE_DDL)?;
    conn.execute_batch(MEASUREMENT_TABLE_DDL)?;

    tracing::info!("Database schema initialized");
    Ok(())
}
