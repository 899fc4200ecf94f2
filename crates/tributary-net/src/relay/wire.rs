//! Relay wire protocol frames.
//!
//! The subset relied upon: client sends `["REQ", sub_id, filter]`,
//! the relay answers with zero or more `["EVENT", sub_id, event]`
//! frames followed by `["EOSE", sub_id]` once stored results are
//! exhausted. `NOTICE` and `CLOSED` frames are surfaced so the client
//! can log or terminate; anything else parses as `Unknown`.

use serde_json::Value;

use tributary_core::{Filter, RelayEvent};

use crate::error::{NetError, Result};

/// Encode a subscription request frame.
pub fn req_frame(sub_id: &str, filter: &Filter) -> Result<String> {
    Ok(serde_json::to_string(&("REQ", sub_id, filter))?)
}

/// Encode a subscription close frame.
pub fn close_frame(sub_id: &str) -> Result<String> {
    Ok(serde_json::to_string(&("CLOSE", sub_id))?)
}

/// A parsed relay-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// A stored or live event for a subscription.
    Event { sub_id: String, event: RelayEvent },
    /// End of stored events for a subscription.
    Eose { sub_id: String },
    /// Human-readable notice from the relay.
    Notice { message: String },
    /// The relay terminated a subscription.
    Closed { sub_id: String, reason: String },
    /// Any frame type this client does not care about.
    Unknown,
}

impl RelayMessage {
    /// Parse a raw text frame.
    ///
    /// Frames that are not a JSON array with a string discriminant
    /// are errors; recognized frame types with a malformed payload
    /// (e.g. an EVENT whose event object is missing required fields)
    /// are errors too, so callers can skip them without aborting the
    /// stream.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let arr = value
            .as_array()
            .ok_or_else(|| NetError::InvalidUrl(format!("frame is not an array: {text}")))?;

        let tag = arr.first().and_then(Value::as_str).unwrap_or_default();
        match tag {
            "EVENT" => {
                let sub_id = str_at(arr, 1)?;
                let event = arr
                    .get(2)
                    .cloned()
                    .ok_or_else(|| NetError::InvalidUrl("EVENT frame without payload".into()))?;
                let event: RelayEvent = serde_json::from_value(event)?;
                Ok(RelayMessage::Event { sub_id, event })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                sub_id: str_at(arr, 1)?,
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: arr.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                sub_id: str_at(arr, 1)?,
                reason: arr.get(2).and_then(Value::as_str).unwrap_or_default().to_string(),
            }),
            _ => Ok(RelayMessage::Unknown),
        }
    }
}

fn str_at(arr: &[Value], idx: usize) -> Result<String> {
    arr.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| NetError::InvalidUrl(format!("frame missing string at index {idx}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_frame_is_a_json_array() {
        let frame = req_frame("sub_1", &Filter::new().kinds([1]).limit(5)).unwrap();
        assert_eq!(frame, r#"["REQ","sub_1",{"kinds":[1],"limit":5}]"#);
    }

    #[test]
    fn parses_event_frame() {
        let frame = r#"["EVENT","sub_1",{"id":"e1","pubkey":"p1","created_at":100,"kind":1,"tags":[],"content":"hi","sig":""}]"#;
        match RelayMessage::parse(frame).unwrap() {
            RelayMessage::Event { sub_id, event } => {
                assert_eq!(sub_id, "sub_1");
                assert_eq!(event.id, "e1");
                assert_eq!(event.created_at, 100);
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn parses_eose_frame() {
        assert_eq!(
            RelayMessage::parse(r#"["EOSE","sub_1"]"#).unwrap(),
            RelayMessage::Eose {
                sub_id: "sub_1".to_string()
            }
        );
    }

    #[test]
    fn parses_notice_and_closed() {
        assert_eq!(
            RelayMessage::parse(r#"["NOTICE","slow down"]"#).unwrap(),
            RelayMessage::Notice {
                message: "slow down".to_string()
            }
        );
        assert_eq!(
            RelayMessage::parse(r#"["CLOSED","sub_1","auth required"]"#).unwrap(),
            RelayMessage::Closed {
                sub_id: "sub_1".to_string(),
                reason: "auth required".to_string()
            }
        );
    }

    #[test]
    fn unknown_frame_type_is_tolerated() {
        assert_eq!(
            RelayMessage::parse(r#"["AUTH","challenge"]"#).unwrap(),
            RelayMessage::Unknown
        );
    }

    #[test]
    fn malformed_event_payload_is_an_error_not_a_panic() {
        // Missing required `id` - fails closed so the caller skips it.
        let frame = r#"["EVENT","sub_1",{"pubkey":"p1","created_at":100,"kind":1}]"#;
        assert!(RelayMessage::parse(frame).is_err());
    }

    #[test]
    fn non_array_frame_is_an_error() {
        assert!(RelayMessage::parse(r#"{"not":"a frame"}"#).is_err());
        assert!(RelayMessage::parse("garbage").is_err());
    }
}
