//! Aggregate request parsing and validation.

use strum_macros::{AsRefStr, Display, EnumString};

/// Mailbox subject of aggregate queries.
pub const AGGREGATE_SUBJECT: &str = "aggregated data";

/// Frames following the correlation id: `GET` plus seven fields.
const REQUEST_FRAMES: usize = 8;

/// Reason reported in an `ERROR` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReason {
    /// The request does not have the expected structure.
    BadMessage,
    /// Start timestamp is after end timestamp.
    BadTimerange,
    /// The order flag is neither `0` nor `1`.
    BadOrdered,
    /// The requested series was never recorded.
    BadRequest,
    /// The store failed while serving the request.
    InternalError,
    /// The mailbox subject is not handled by this agent.
    UnsupportedSubject,
}

/// A validated aggregate query.
///
/// The textual fields are kept verbatim so the reply can echo them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRequest {
    pub asset_name: String,
    pub quantity: String,
    pub step: String,
    pub aggregation: String,
    pub start_text: String,
    pub end_text: String,
    pub order_flag: String,
    pub start: i64,
    pub end: i64,
    pub ordered: bool,
}

impl AggregateRequest {
    /// Parse the frames that follow the correlation id.
    ///
    /// Expected: `GET, asset, quantity, step, type, start, end, ordered`.
    pub fn parse(frames: &[String]) -> Result<Self, ErrorReason> {
        if frames.len() < REQUEST_FRAMES {
            tracing::error!(frames = frames.len(), "Message has unsupported format");
            return Err(ErrorReason::BadMessage);
        }
        if frames[0] != "GET" {
            tracing::error!(command = %frames[0], "GET is missing");
            return Err(ErrorReason::BadMessage);
        }

        let names = [
            "asset name",
            "quantity",
            "step",
            "aggregation type",
            "start date",
            "end date",
            "ordered",
        ];
        let fields = &frames[1..REQUEST_FRAMES];
        if let Some((name, _)) = names.iter().zip(fields).find(|(_, f)| f.is_empty()) {
            tracing::error!(field = name, "Request field is empty");
            return Err(ErrorReason::BadMessage);
        }

        let start = parse_timestamp(&fields[4], "start date")?;
        let end = parse_timestamp(&fields[5], "end date")?;
        if start > end {
            tracing::error!(start, end, "start date > end date");
            return Err(ErrorReason::BadTimerange);
        }

        let ordered = match fields[6].as_str() {
            "1" => true,
            "0" => false,
            other => {
                tracing::error!(ordered = other, "ordered is not 1/0");
                return Err(ErrorReason::BadOrdered);
            }
        };

        Ok(Self {
            asset_name: fields[0].clone(),
            quantity: fields[1].clone(),
            step: fields[2].clone(),
            aggregation: fields[3].clone(),
            start_text: fields[4].clone(),
            end_text: fields[5].clone(),
            order_flag: fields[6].clone(),
            start,
            end,
            ordered,
        })
    }

    /// Topic string of the requested series.
    pub fn topic(&self) -> String {
        format!(
            "{}_{}_{}@{}",
            self.quantity, self.aggregation, self.step, self.asset_name
        )
    }
}

fn parse_timestamp(text: &str, field: &str) -> Result<i64, ErrorReason> {
    text.parse().map_err(|_| {
        tracing::error!(field, value = text, "Timestamp cannot be converted to number");
        ErrorReason::BadMessage
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn frames(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_valid_request() {
        let request = AggregateRequest::parse(&frames(&[
            "GET", "assetX", "power", "15m", "min", "0", "9999", "1",
        ]))
        .unwrap();
        assert_eq!(request.start, 0);
        assert_eq!(request.end, 9999);
        assert!(request.ordered);
        assert_eq!(request.topic(), "power_min_15m@assetX");
    }

    #[test]
    fn test_parse_too_few_frames() {
        let result = AggregateRequest::parse(&frames(&["GET", "assetX", "power"]));
        assert_eq!(result.unwrap_err(), ErrorReason::BadMessage);
    }

    #[test]
    fn test_parse_requires_get() {
        let result = AggregateRequest::parse(&frames(&[
            "PUT", "assetX", "power", "15m", "min", "0", "9999", "1",
        ]));
        assert_eq!(result.unwrap_err(), ErrorReason::BadMessage);
    }

    #[test]
    fn test_parse_empty_fields() {
        for i in 1..8 {
            let mut parts = frames(&["GET", "assetX", "power", "15m", "min", "0", "9999", "1"]);
            parts[i].clear();
            assert_eq!(
                AggregateRequest::parse(&parts).unwrap_err(),
                ErrorReason::BadMessage,
                "field {i}"
            );
        }
    }

    #[test]
    fn test_parse_bad_timestamps() {
        let result = AggregateRequest::parse(&frames(&[
            "GET", "assetX", "power", "15m", "min", "yesterday", "9999", "1",
        ]));
        assert_eq!(result.unwrap_err(), ErrorReason::BadMessage);

        let result = AggregateRequest::parse(&frames(&[
            "GET", "assetX", "power", "15m", "min", "0", "99x", "1",
        ]));
        assert_eq!(result.unwrap_err(), ErrorReason::BadMessage);
    }

    #[test]
    fn test_parse_time_range() {
        let result = AggregateRequest::parse(&frames(&[
            "GET", "assetX", "power", "15m", "min", "10", "9", "1",
        ]));
        assert_eq!(result.unwrap_err(), ErrorReason::BadTimerange);

        let same = AggregateRequest::parse(&frames(&[
            "GET", "assetX", "power", "15m", "min", "10", "10", "0",
        ]));
        assert!(same.is_ok());
    }

    #[test]
    fn test_parse_order_flag() {
        let result = AggregateRequest::parse(&frames(&[
            "GET", "assetX", "power", "15m", "min", "0", "9999", "2",
        ]));
        assert_eq!(result.unwrap_err(), ErrorReason::BadOrdered);
    }

    #[test]
    fn test_error_reason_strings() {
        assert_eq!(ErrorReason::BadMessage.as_ref(), "BAD_MESSAGE");
        assert_eq!(ErrorReason::BadTimerange.as_ref(), "BAD_TIMERANGE");
        assert_eq!(ErrorReason::BadOrdered.as_ref(), "BAD_ORDERED");
        assert_eq!(ErrorReason::BadRequest.as_ref(), "BAD_REQUEST");
        assert_eq!(ErrorReason::InternalError.as_ref(), "INTERNAL_ERROR");
        assert_eq!(ErrorReason::UnsupportedSubject.to_string(), "UNSUPPORTED_SUBJECT");
        assert_eq!(
            ErrorReason::from_str("BAD_REQUEST").unwrap(),
            ErrorReason::BadRequest
        );
    }
}
