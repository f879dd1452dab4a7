//! Error taxonomy for the loka runtime.
//!
//! Capability failures are NOT represented here — those are ordinary
//! `anyhow` errors stringified into the answer envelope. This enum covers
//! the framework's own failure modes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The reply side of a request/response exchange went away before an
    /// answer was observed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
    /// A bus event carried a payload of the wrong variant for its channel.
    #[error("unexpected payload on channel {channel}")]
    UnexpectedPayload { channel: String },
    /// An agent key that cannot serve as a channel namespace (empty, or
    /// containing whitespace/colons).
    #[error("invalid agent key: {0:?}")]
    InvalidKey(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Validate a key for use as a channel namespace root.
pub fn validate_key(key: &str) -> ProtocolResult<()> {
    if key.is_empty() || key.contains(char::is_whitespace) || key.contains(':') {
        return Err(ProtocolError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_with_separators_are_rejected() {
        assert!(validate_key("hello").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("hel lo").is_err());
        assert!(validate_key("hel:lo").is_err());
    }
}
