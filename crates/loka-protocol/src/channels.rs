//! Channel-name derivation.
//!
//! Every channel an agent subscribes to or publishes on is namespaced under
//! its identity key. The answer to a question travels on a correlation
//! channel that embeds the packet id, so exactly one answer reaches exactly
//! one caller.

use crate::ids::PacketId;

/// Marker prefixing an address token in question text (`#<key> ...`).
pub const ADDRESS_MARKER: char = '#';

/// Standalone token replaced by `#<packet-id>` during parsing, letting a
/// capability back-reference its own request id.
pub const ID_PLACEHOLDER: &str = ":id:";

/// Bus-wide channel announcing that the host finished loading.
pub const LOADED: &str = "loaded";
/// Bus-wide channel telling every agent to wind down.
pub const LOGOUT: &str = "logout";
/// Bus-wide channel carrying [`StatusReport`](crate::StatusReport)s.
pub const STATUS: &str = "status";
/// Bus-wide channel carrying [`ErrorReport`](crate::ErrorReport)s.
pub const ERROR: &str = "error";

/// Channel the agent listens on for inbound questions.
pub fn question(key: &str) -> String {
    format!("{key}:question")
}

/// Correlation channel delivering the answer for one packet.
pub fn answer(key: &str, id: &PacketId) -> String {
    format!("{key}:question:{id}")
}

pub fn start(key: &str) -> String {
    format!("{key}:start")
}

pub fn stop(key: &str) -> String {
    format!("{key}:stop")
}

pub fn status(key: &str) -> String {
    format!("{key}:status")
}
