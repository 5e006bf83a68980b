//! Message codec
//!
//! Messages travel as UTF-8 JSON objects with a `type` discriminant. There is
//! no version tag or length prefix; message boundaries belong to the
//! transport's framing. Decoding separates bytes that are not JSON at all
//! ([`DecodeError::Malformed`]) from JSON that breaks the per-kind field rules
//! ([`DecodeError::InvalidMessage`]).

use serde_json::{Map, Value};

use crate::errors::{DecodeError, EncodeError};
use crate::protocol::message::{Message, MessageKind};

/// Serialize a message to its wire form
pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(message)?)
}

/// Parse and validate a message from its wire form
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Malformed)?;

    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::invalid("expected a JSON object"))?;

    let kind = match object.get("type") {
        Some(Value::String(name)) => MessageKind::from_wire(name)
            .ok_or_else(|| DecodeError::invalid(format!("unknown message type '{}'", name)))?,
        Some(_) => return Err(DecodeError::invalid("field 'type' must be a string")),
        None => return Err(DecodeError::invalid("missing field 'type'")),
    };

    require_text(object, "from")?;
    require_timestamp(object, "timestamp")?;
    if kind.has_text() {
        require_text(object, "message")?;
    }
    if kind == MessageKind::Pong {
        require_timestamp(object, "originalTimestamp")?;
    }

    serde_json::from_value(value).map_err(|e| DecodeError::invalid(e.to_string()))
}

fn require_text(object: &Map<String, Value>, field: &str) -> Result<(), DecodeError> {
    match object.get(field) {
        Some(Value::String(text)) if !text.is_empty() => Ok(()),
        Some(Value::String(_)) => Err(DecodeError::invalid(format!("field '{}' is empty", field))),
        Some(_) => Err(DecodeError::invalid(format!("field '{}' must be a string", field))),
        None => Err(DecodeError::invalid(format!("missing field '{}'", field))),
    }
}

fn require_timestamp(object: &Map<String, Value>, field: &str) -> Result<(), DecodeError> {
    match object.get(field) {
        Some(value) if value.as_u64().is_some() => Ok(()),
        Some(_) => Err(DecodeError::invalid(format!(
            "field '{}' must be a non-negative integer",
            field
        ))),
        None => Err(DecodeError::invalid(format!("missing field '{}'", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use proptest::prelude::*;

    fn assert_invalid(input: &str) {
        match decode(input.as_bytes()) {
            Err(DecodeError::InvalidMessage { .. }) => {}
            other => panic!("expected InvalidMessage for {}, got {:?}", input, other),
        }
    }

    #[test]
    fn test_wire_format_field_names() {
        let pong = Message::pong("alice", Timestamp::new(1000), Timestamp::new(1500));
        let value: Value = serde_json::from_slice(&encode(&pong).unwrap()).unwrap();

        assert_eq!(value["type"], "pong");
        assert_eq!(value["from"], "alice");
        assert_eq!(value["timestamp"], 1500);
        assert_eq!(value["originalTimestamp"], 1000);
    }

    #[test]
    fn test_decode_accepts_foreign_field_order() {
        let decoded = decode(br#"{"timestamp":5,"message":"hi","from":"bob","type":"chat"}"#).unwrap();
        assert_eq!(decoded, Message::chat("bob", "hi", Timestamp::new(5)));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(b""), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(&[0xff, 0xfe, 0x00]), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(br#"{"type":"ping""#), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_unknown_type_is_invalid() {
        assert_invalid(r#"{"type":"bogus","from":"x","timestamp":1}"#);
        assert_invalid(r#"{"type":7,"from":"x","timestamp":1}"#);
    }

    #[test]
    fn test_missing_common_fields() {
        assert_invalid(r#"{"from":"x","timestamp":1}"#);
        assert_invalid(r#"{"type":"ping","timestamp":1}"#);
        assert_invalid(r#"{"type":"ping","from":"","timestamp":1}"#);
        assert_invalid(r#"{"type":"ping","from":"x"}"#);
        assert_invalid(r#"{"type":"ping","from":"x","timestamp":"1"}"#);
        assert_invalid(r#"{"type":"ping","from":"x","timestamp":-3}"#);
        assert_invalid(r#"{"type":"ping","from":"x","timestamp":1000.5}"#);
        assert_invalid(r#"{"type":"ping","from":"x","timestamp":1e3}"#);
        assert_invalid(r#"[1, 2, 3]"#);
    }

    #[test]
    fn test_text_kinds_require_message() {
        for kind in ["welcome", "chat", "broadcast"] {
            assert_invalid(&format!(r#"{{"type":"{}","from":"x","timestamp":1}}"#, kind));
            assert_invalid(&format!(r#"{{"type":"{}","from":"x","timestamp":1,"message":""}}"#, kind));
            assert!(decode(format!(r#"{{"type":"{}","from":"x","timestamp":1,"message":"m"}}"#, kind).as_bytes()).is_ok());
        }
    }

    #[test]
    fn test_pong_requires_original_timestamp() {
        assert_invalid(r#"{"type":"pong","from":"x","timestamp":2}"#);
        assert_invalid(r#"{"type":"pong","from":"x","timestamp":2,"originalTimestamp":null}"#);
        assert!(decode(br#"{"type":"pong","from":"x","timestamp":2,"originalTimestamp":1}"#).is_ok());
    }

    #[test]
    fn test_ping_ignores_unknown_fields() {
        let decoded = decode(br#"{"type":"ping","from":"x","timestamp":9,"extra":true}"#).unwrap();
        assert_eq!(decoded, Message::ping("x", Timestamp::new(9)));
    }

    fn valid_message() -> impl Strategy<Value = Message> {
        let name = "[^\\x00]{1,24}";
        prop_oneof![
            (name, name, any::<u64>()).prop_map(|(f, m, t)| Message::welcome(f, m, Timestamp::new(t))),
            (name, name, any::<u64>()).prop_map(|(f, m, t)| Message::chat(f, m, Timestamp::new(t))),
            (name, name, any::<u64>()).prop_map(|(f, m, t)| Message::broadcast(f, m, Timestamp::new(t))),
            (name, any::<u64>()).prop_map(|(f, t)| Message::ping(f, Timestamp::new(t))),
            (name, any::<u64>(), any::<u64>())
                .prop_map(|(f, o, t)| Message::pong(f, Timestamp::new(o), Timestamp::new(t))),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(message in valid_message()) {
            let bytes = encode(&message).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), message);
        }
    }
}
