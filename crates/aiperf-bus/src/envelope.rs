//! Wire format for the message bus (spec §2: "message bus: typed pub/sub
//! (fan-out) + push/pull (round-robin competing consumers)").
//!
//! Frames are length-delimited (`tokio_util::codec::LengthDelimitedCodec`)
//! with a JSON-encoded `Envelope` body. JSON over a length-prefixed frame
//! keeps the wire format legible in the same way the teacher's gRPC/protobuf
//! framing is legible on the wire, without pulling in a schema compiler for
//! a protocol this small.

use serde::{Deserialize, Serialize};

/// One frame exchanged between a client and the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub topic: String,
    /// Monotonic per-(publisher, topic) sequence number, assigned by the
    /// broker on publish and echoed back on delivery so subscribers can
    /// detect gaps (spec: "FIFO-per-(publisher,topic) ordering").
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub publisher_id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// Client -> broker: register as a fan-out subscriber of `topic`.
    Subscribe,
    /// Client -> broker: publish `payload` to every current subscriber of `topic`.
    Publish,
    /// Broker -> client: a published message, fanned out.
    Delivered,
    /// Client -> broker: register as a pull (competing) consumer of `topic`.
    PullRegister,
    /// Client -> broker: enqueue `payload` for round-robin delivery to one
    /// pull consumer of `topic`.
    Push,
    /// Broker -> client: a pushed message delivered to this consumer.
    PullDelivered,
    /// Broker -> client: the broker rejected the last frame.
    Error,
}

impl Envelope {
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Subscribe,
            topic: topic.into(),
            seq: 0,
            publisher_id: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn pull_register(topic: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::PullRegister,
            topic: topic.into(),
            seq: 0,
            publisher_id: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn publish(topic: impl Into<String>, publisher_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: EnvelopeKind::Publish,
            topic: topic.into(),
            seq: 0,
            publisher_id: publisher_id.into(),
            payload,
        }
    }

    pub fn push(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: EnvelopeKind::Push,
            topic: topic.into(),
            seq: 0,
            publisher_id: String::new(),
            payload,
        }
    }

    pub fn error(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Error,
            topic: topic.into(),
            seq: 0,
            publisher_id: String::new(),
            payload: serde_json::Value::String(message.into()),
        }
    }
}
