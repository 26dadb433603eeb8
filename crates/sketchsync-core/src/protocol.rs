//! SketchSync wire protocol.
//!
//! Text frames carry exactly one JSON envelope `{"command": .., "data": ..}`.
//! Binary frames carry a raw PNG snapshot of the canvas and are only ever
//! sent server -> client right after a `join` reply.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Server greeting sent once per connection, before anything else.
pub const CMD_HI: &str = "hi";
pub const CMD_JOIN: &str = "join";
pub const CMD_LINE: &str = "line";
pub const CMD_DOT: &str = "dot";
pub const CMD_ERASE: &str = "erase";
pub const CMD_CLEAR: &str = "clear";

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not JSON or has no string `command` field.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Known command with a payload of the wrong shape.
    #[error("malformed `{command}` payload: {reason}")]
    MalformedPayload { command: String, reason: String },
}

/// The message unit exchanged over a command channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: String,
    /// `None` when the field is absent, `Some(Value::Null)` for an explicit
    /// `null`, so either form is re-encoded exactly as it arrived.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<serde_json::Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    pub fn new(command: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            command: command.into(),
            data,
        }
    }

    /// Parse one text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A canvas coordinate. Accepts `[x, y]` or `{"x": .., "y": ..}` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PointRepr", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PointRepr {
    Pair([f64; 2]),
    Object { x: f64, y: f64 },
}

impl From<PointRepr> for Point {
    fn from(repr: PointRepr) -> Self {
        match repr {
            PointRepr::Pair([x, y]) => Point { x, y },
            PointRepr::Object { x, y } => Point { x, y },
        }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinePayload {
    pub from: Point,
    pub to: Point,
    pub color: String,
    pub size: f64,
}

/// `pos` is the centre of the dot as the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DotPayload {
    pub pos: Point,
    pub size: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErasePayload {
    pub from: Point,
    pub to: Point,
    pub size: f64,
}

/// Reply to `join`: the canvas dimensions, sent as `{"size": [w, h]}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReply {
    pub size: [u32; 2],
}

/// Client -> server commands with their typed payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join,
    Line(LinePayload),
    Dot(DotPayload),
    Erase(ErasePayload),
    /// `clear` carries no meaningful payload; whatever was sent is relayed as is.
    Clear,
    /// Any command name this server does not know. Ignored by design.
    Unknown(String),
}

impl Command {
    /// Decode the typed command carried by `envelope`.
    pub fn decode(envelope: &Envelope) -> Result<Self, ProtocolError> {
        match envelope.command.as_str() {
            CMD_JOIN => Ok(Command::Join),
            CMD_LINE => payload(envelope).map(Command::Line),
            CMD_DOT => payload(envelope).map(Command::Dot),
            CMD_ERASE => payload(envelope).map(Command::Erase),
            CMD_CLEAR => Ok(Command::Clear),
            other => Ok(Command::Unknown(other.to_string())),
        }
    }

    /// Wire name of this command.
    pub fn name(&self) -> &str {
        match self {
            Command::Join => CMD_JOIN,
            Command::Line(_) => CMD_LINE,
            Command::Dot(_) => CMD_DOT,
            Command::Erase(_) => CMD_ERASE,
            Command::Clear => CMD_CLEAR,
            Command::Unknown(name) => name,
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, ProtocolError> {
    let data = envelope
        .data
        .clone()
        .ok_or_else(|| ProtocolError::MalformedPayload {
            command: envelope.command.clone(),
            reason: "missing data".into(),
        })?;
    serde_json::from_value(data).map_err(|e| ProtocolError::MalformedPayload {
        command: envelope.command.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_envelope_round_trip_nested_payload() {
        let original = Envelope::new(
            "line",
            Some(json!({
                "from": [1, 2.5],
                "to": {"x": 3, "y": 4},
                "color": "#ff0000",
                "size": 3,
                "extra": {"nested": [[1, 2], ["a", "b"], []], "n": -0.25},
            })),
        );
        let text = original.encode().unwrap();
        let decoded = Envelope::decode(&text).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_envelope_without_data() {
        let env = Envelope::decode(r#"{"command":"join"}"#).unwrap();
        assert_eq!(env.command, "join");
        assert!(env.data.is_none());
        assert_eq!(env.encode().unwrap(), r#"{"command":"join"}"#);
        assert_eq!(Command::decode(&env).unwrap(), Command::Join);
    }

    #[test]
    fn test_null_data_is_kept_apart_from_absent_data() {
        let frame = r#"{"command":"clear","data":null}"#;
        let env = Envelope::decode(frame).unwrap();
        assert_eq!(env.data, Some(serde_json::Value::Null));
        assert_eq!(env.encode().unwrap(), frame);
        assert_ne!(env, Envelope::new("clear", None));

        let env = Envelope::new("line", Some(serde_json::Value::Null));
        assert!(matches!(
            Command::decode(&env),
            Err(ProtocolError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_malformed_envelopes() {
        for frame in ["not json", r#"{"data": 1}"#, r#"{"command": 5}"#, "[]"] {
            let err = Envelope::decode(frame).unwrap_err();
            assert!(matches!(err, ProtocolError::MalformedEnvelope(_)), "{frame}");
        }
    }

    #[test]
    fn test_decode_line_accepts_both_point_forms() {
        let env = Envelope::new(
            "line",
            Some(json!({"from": [0, 0], "to": {"x": 10, "y": 5}, "color": "black", "size": 2})),
        );
        let Command::Line(line) = Command::decode(&env).unwrap() else {
            panic!("expected line");
        };
        assert_eq!(line.from, Point::new(0.0, 0.0));
        assert_eq!(line.to, Point::new(10.0, 5.0));
        assert_eq!(line.size, 2.0);
    }

    #[test]
    fn test_decode_dot_and_erase() {
        let dot = Envelope::new("dot", Some(json!({"pos": [100, 100], "size": 20, "color": "#000"})));
        assert!(matches!(Command::decode(&dot).unwrap(), Command::Dot(_)));

        let erase = Envelope::new("erase", Some(json!({"from": [1, 1], "to": [2, 2], "size": 8})));
        assert!(matches!(Command::decode(&erase).unwrap(), Command::Erase(_)));
    }

    #[test]
    fn test_missing_fields_are_malformed_payload() {
        let env = Envelope::new("dot", Some(json!({"pos": [1, 1]})));
        let err = Command::decode(&env).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { ref command, .. } if command == "dot"));

        let env = Envelope::new("line", None);
        assert!(Command::decode(&env).is_err());
    }

    #[test]
    fn test_unknown_and_clear() {
        let env = Envelope::new("wave", Some(json!({"hello": true})));
        let cmd = Command::decode(&env).unwrap();
        assert_eq!(cmd, Command::Unknown("wave".into()));
        assert_eq!(cmd.name(), "wave");

        let clear = Command::decode(&Envelope::new("clear", Some(json!("anything")))).unwrap();
        assert_eq!(clear, Command::Clear);
    }

    #[test]
    fn test_join_reply_shape() {
        let reply = JoinReply { size: [1280, 720] };
        assert_eq!(serde_json::to_value(reply).unwrap(), json!({"size": [1280, 720]}));
    }
}
