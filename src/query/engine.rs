//! Aggregate query handling over the row store.

use crate::codec;
use crate::query::request::{AGGREGATE_SUBJECT, AggregateRequest, ErrorReason};
use crate::storage::{Store, measurements, registry};

/// Reply to a mailbox request, before framing.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Requested series with its units and `(timestamp, value)` pairs.
    Ok {
        correlation_id: String,
        request: AggregateRequest,
        units: String,
        points: Vec<(i64, String)>,
    },
    Error {
        correlation_id: String,
        reason: ErrorReason,
    },
}

impl Reply {
    pub fn correlation_id(&self) -> &str {
        match self {
            Reply::Ok { correlation_id, .. } | Reply::Error { correlation_id, .. } => {
                correlation_id
            }
        }
    }

    /// Wire frames of the reply.
    ///
    /// `OK` replies echo the request fields, then units and a flat
    /// `ts, value` list. `ERROR` replies carry only the reason.
    pub fn into_frames(self) -> Vec<String> {
        match self {
            Reply::Ok {
                correlation_id,
                request,
                units,
                points,
            } => {
                let mut frames = Vec::with_capacity(10 + points.len() * 2);
                frames.extend([
                    correlation_id,
                    "OK".to_string(),
                    request.asset_name,
                    request.quantity,
                    request.step,
                    request.aggregation,
                    request.start_text,
                    request.end_text,
                    request.order_flag,
                    units,
                ]);
                for (ts, value) in points {
                    frames.push(ts.to_string());
                    frames.push(value);
                }
                frames
            }
            Reply::Error {
                correlation_id,
                reason,
            } => vec![correlation_id, "ERROR".to_string(), reason.to_string()],
        }
    }
}

/// Serves aggregate queries from a [`Store`].
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Store,
}

impl QueryEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Handle one mailbox message.
    ///
    /// The first frame is the correlation id. Returns `None` when no reply
    /// can be addressed: the message is empty or the id is blank.
    pub fn handle(&self, subject: &str, frames: &[String]) -> Option<Reply> {
        let Some((correlation_id, body)) = frames.split_first() else {
            tracing::info!(subject, "Empty message, ignoring");
            return None;
        };
        if correlation_id.is_empty() {
            tracing::warn!(subject, "Message without correlation id, ignoring");
            return None;
        }
        let correlation_id = correlation_id.clone();

        if subject != AGGREGATE_SUBJECT {
            tracing::warn!(subject, "Unsupported mailbox subject");
            return Some(Reply::Error {
                correlation_id,
                reason: ErrorReason::UnsupportedSubject,
            });
        }

        Some(match self.aggregate(body) {
            Ok((request, units, points)) => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    topic = %request.topic(),
                    points = points.len(),
                    "Aggregate query served"
                );
                Reply::Ok {
                    correlation_id,
                    request,
                    units,
                    points,
                }
            }
            Err(reason) => Reply::Error {
                correlation_id,
                reason,
            },
        })
    }

    fn aggregate(
        &self,
        body: &[String],
    ) -> Result<(AggregateRequest, String, Vec<(i64, String)>), ErrorReason> {
        let request = AggregateRequest::parse(body)?;
        let topic = request.topic();

        let conn = self.store.connection().map_err(|e| {
            tracing::error!(error = %e, "Row store is unavailable");
            ErrorReason::InternalError
        })?;

        let units = match registry::find_topic(&conn, &topic) {
            Ok(Some(found)) => found.units,
            Ok(None) => {
                tracing::error!(topic = %topic, "Topic is not found");
                return Err(ErrorReason::BadRequest);
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Topic lookup failed");
                return Err(ErrorReason::InternalError);
            }
        };

        let rows = measurements::select_measurements(
            &conn,
            &topic,
            request.start,
            request.end,
            request.ordered,
        )
        .map_err(|e| {
            tracing::error!(topic = %topic, error = %e, "Measurement selection failed");
            ErrorReason::InternalError
        })?;

        let points = rows
            .iter()
            .map(|m| (m.timestamp, codec::format_value(m.value, m.scale)))
            .collect();
        Ok((request, units, points))
    }
}
