//! Typed id wrappers for the loka runtime.
//!
//! Ids are opaque String newtypes (serde-transparent), UUID v4 by default.
//! The dispatcher only ever treats them as strings when deriving the
//! correlation channel name, so callers may substitute their own scheme
//! through [`from_string`](PacketId::from_string).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a fresh random id (UUID v4).
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Adopt any caller-supplied value.
            pub fn from_string(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Unique identifier for one in-flight question/answer exchange.
    PacketId
);
typed_id!(
    /// Identifier for a bus-level event such as a status snapshot.
    EventId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_ids_are_unique_and_round_trip_serde() {
        let a = PacketId::new();
        let b = PacketId::new();
        assert_ne!(a, b);

        let json = serde_json::to_string(&a).expect("serialize");
        let back: PacketId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(a, back);
    }

    #[test]
    fn from_string_preserves_caller_value() {
        let id = PacketId::from_string("42");
        assert_eq!(id.as_str(), "42");
        assert_eq!(id.to_string(), "42");
    }
}
