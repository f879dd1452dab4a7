//! Out-of-band envelopes and the bus payload union.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EventId, PacketId};
use crate::packet::Packet;

/// Lifecycle snapshot published on the bus-wide `status` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: EventId,
    pub key: String,
    /// Human-readable form, `"<key> RUNNING"` or `"<key> STOPPED"`.
    pub text: String,
    pub running: bool,
    pub created: DateTime<Utc>,
}

impl StatusReport {
    pub fn new(key: impl Into<String>, running: bool) -> Self {
        let key = key.into();
        Self {
            text: format!("{key} {}", if running { "RUNNING" } else { "STOPPED" }),
            id: EventId::new(),
            key,
            running,
            created: Utc::now(),
        }
    }
}

/// Failure context broadcast on the bus-wide `error` channel, alongside the
/// per-question answer, for out-of-band observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PacketId>,
    /// Channel or phase the failure originated from, e.g. `#hello:question`.
    pub origin: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<Box<Packet>>,
    pub created: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(origin: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: None,
            origin: origin.into(),
            error: error.into(),
            packet: None,
            created: Utc::now(),
        }
    }

    pub fn packet(mut self, packet: Packet) -> Self {
        self.id = Some(packet.id.clone());
        self.packet = Some(Box::new(packet));
        self
    }
}

/// Tagged union carried by every bus event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusPayload {
    Packet(Box<Packet>),
    Status(StatusReport),
    Error(ErrorReport),
    Value(Value),
    Empty,
}

impl BusPayload {
    pub fn packet(packet: Packet) -> Self {
        Self::Packet(Box::new(packet))
    }

    /// Unwrap a packet payload, if that is what this is.
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            Self::Packet(packet) => Some(*packet),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<&StatusReport> {
        match self {
            Self::Status(report) => Some(report),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorReport> {
        match self {
            Self::Error(report) => Some(report),
            _ => None,
        }
    }
}

impl From<Packet> for BusPayload {
    fn from(packet: Packet) -> Self {
        Self::packet(packet)
    }
}

impl From<StatusReport> for BusPayload {
    fn from(report: StatusReport) -> Self {
        Self::Status(report)
    }
}

impl From<ErrorReport> for BusPayload {
    fn from(report: ErrorReport) -> Self {
        Self::Error(report)
    }
}

impl From<Value> for BusPayload {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}
