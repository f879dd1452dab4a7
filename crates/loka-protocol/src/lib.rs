//! # loka-protocol — contract types for the loka agent runtime
//!
//! This crate defines the shared envelopes and grammar that agents exchange
//! over the event bus. It is intentionally dependency-light (no tokio) so it
//! can be used as a pure contract crate.
//!
//! ## Module overview
//!
//! - [`ids`] — typed id wrappers (PacketId, EventId)
//! - [`packet`] — Packet/Question/Answer, the question-answer envelope
//! - [`profile`] — AgentProfile ("me") and the translate/parse text filters
//! - [`command`] — the question command grammar parser
//! - [`channels`] — channel-name derivation from an agent key
//! - [`report`] — StatusReport, ErrorReport and the BusPayload union
//! - [`error`] — ProtocolError

pub mod channels;
pub mod command;
pub mod error;
pub mod ids;
pub mod packet;
pub mod profile;
pub mod report;

pub use channels::{ADDRESS_MARKER, ID_PLACEHOLDER};
pub use command::{Command, CommandError};
pub use error::{ProtocolError, ProtocolResult, validate_key};
pub use ids::{EventId, PacketId};
pub use packet::{Answer, AnswerMeta, Packet, Question};
pub use profile::{AgentProfile, TextFilter, trim_filter};
pub use report::{BusPayload, ErrorReport, StatusReport};
