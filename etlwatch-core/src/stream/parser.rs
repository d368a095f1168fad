//! Record parser
//!
//! Classifies the payload of one frame as a log record, a control signal or
//! the end-of-data marker.

use serde_json::Value;
use thiserror::Error;

use super::decoder::Frame;
use super::protocol::Protocol;
use crate::domain::log::{ControlSignal, LogRecord};

/// Longest payload excerpt kept in an error
const EXCERPT_LEN: usize = 120;

/// Outcome of a successfully classified frame
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Record(LogRecord),
    Control(ControlSignal),
    /// The end-of-stream sentinel; carries nothing and is dropped
    EndMarker,
}

/// A frame that had to be dropped
///
/// Never fatal to a session: isolated bad frames are expected under load.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed payload `{excerpt}`: {source}")]
    Malformed {
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unrecognized payload shape `{excerpt}`")]
    Unrecognized { excerpt: String },
}

#[derive(Debug, Clone)]
pub struct RecordParser {
    protocol: Protocol,
}

impl RecordParser {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn parse(&self, frame: &Frame) -> Result<Parsed, FrameError> {
        self.parse_payload(&frame.data)
    }

    pub fn parse_payload(&self, payload: &str) -> Result<Parsed, FrameError> {
        let payload = payload.trim();
        if payload == self.protocol.end_sentinel {
            return Ok(Parsed::EndMarker);
        }

        let value: Value = serde_json::from_str(payload).map_err(|source| FrameError::Malformed {
            excerpt: excerpt(payload),
            source,
        })?;

        if let Some(tag) = value.get(&self.protocol.type_field).and_then(Value::as_str) {
            if tag == self.protocol.disconnect_tag {
                return Ok(Parsed::Control(ControlSignal::Disconnected));
            }
            if tag == self.protocol.completion_tag {
                return Ok(Parsed::Control(ControlSignal::Completion));
            }
        }

        if value.get("level").is_none() || value.get("message").is_none() {
            return Err(FrameError::Unrecognized {
                excerpt: excerpt(payload),
            });
        }

        serde_json::from_value(value)
            .map(Parsed::Record)
            .map_err(|source| FrameError::Malformed {
                excerpt: excerpt(payload),
                source,
            })
    }
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new(Protocol::default())
    }
}

fn excerpt(payload: &str) -> String {
    match payload.char_indices().nth(EXCERPT_LEN) {
        Some((cut, _)) => format!("{}…", &payload[..cut]),
        None => payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::log::LogLevel;

    #[test]
    fn test_parses_log_record() {
        let parsed = RecordParser::default()
            .parse_payload(r#"{"level":"info","message":"start","progress":0}"#)
            .unwrap();
        assert_eq!(
            parsed,
            Parsed::Record(LogRecord::new(LogLevel::Info, "start", 0))
        );
    }

    #[test]
    fn test_progress_shapes_are_lenient() {
        let parser = RecordParser::default();
        let progress = |payload: &str| match parser.parse_payload(payload).unwrap() {
            Parsed::Record(record) => record.progress(),
            other => panic!("expected a record, got {other:?}"),
        };

        assert_eq!(progress(r#"{"level":"info","message":"m","progress":33.3}"#), 33);
        assert_eq!(progress(r#"{"level":"info","message":"m","progress":66.7}"#), 67);
        assert_eq!(progress(r#"{"level":"info","message":"m","progress":null}"#), 0);
        assert_eq!(progress(r#"{"level":"info","message":"m"}"#), 0);
        assert_eq!(progress(r#"{"level":"info","message":"m","progress":150}"#), 150);
        assert!(parser
            .parse_payload(r#"{"level":"info","message":"m","progress":"half"}"#)
            .is_err());
    }

    #[test]
    fn test_sentinel_is_end_marker() {
        let parsed = RecordParser::default().parse_payload("[DONE]").unwrap();
        assert_eq!(parsed, Parsed::EndMarker);
    }

    #[test]
    fn test_control_records() {
        let parser = RecordParser::default();
        assert_eq!(
            parser.parse_payload(r#"{"type":"disconnected"}"#).unwrap(),
            Parsed::Control(ControlSignal::Disconnected)
        );
        assert_eq!(
            parser
                .parse_payload(r#"{"type":"completed","message":"bye","level":"info"}"#)
                .unwrap(),
            Parsed::Control(ControlSignal::Completion)
        );
    }

    #[test]
    fn test_other_type_values_are_records() {
        let parsed = RecordParser::default()
            .parse_payload(r#"{"type":"progress","level":"debug","message":"m"}"#)
            .unwrap();
        assert!(matches!(parsed, Parsed::Record(r) if r.level() == LogLevel::Debug));
    }

    #[test]
    fn test_malformed_and_unrecognized_payloads() {
        let parser = RecordParser::default();
        assert!(matches!(
            parser.parse_payload("{not json"),
            Err(FrameError::Malformed { .. })
        ));
        assert!(matches!(
            parser.parse_payload(r#"{"rows": 3}"#),
            Err(FrameError::Unrecognized { .. })
        ));
        assert!(matches!(
            parser.parse_payload(r#"[1, 2]"#),
            Err(FrameError::Unrecognized { .. })
        ));
        assert!(matches!(
            parser.parse_payload(r#"{"level":"loud","message":"m"}"#),
            Err(FrameError::Malformed { .. })
        ));
    }

    #[test]
    fn test_custom_control_tags() {
        let parser = RecordParser::new(Protocol {
            disconnect_tag: "bye".to_string(),
            end_sentinel: "EOF".to_string(),
            ..Protocol::default()
        });
        assert_eq!(
            parser.parse_payload(r#"{"type":"bye"}"#).unwrap(),
            Parsed::Control(ControlSignal::Disconnected)
        );
        assert_eq!(parser.parse_payload("EOF").unwrap(), Parsed::EndMarker);
        assert!(parser.parse_payload("[DONE]").is_err());
    }

    #[test]
    fn test_error_excerpt_is_bounded() {
        let long = "x".repeat(500);
        let err = RecordParser::default().parse_payload(&long).unwrap_err();
        assert!(err.to_string().len() < 300);
    }
}
