//! The question command grammar.
//!
//! A question's raw text is a command line: an optional leading address
//! token (`#<key> `), then a head token naming the method (with optional
//! colon-separated sub-params), then the argument string. Parsing produces a
//! typed [`Command`] instead of mutating strings in place, so malformed
//! input is a distinct, testable case.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channels::{ADDRESS_MARKER, ID_PLACEHOLDER};
use crate::ids::PacketId;

/// A parsed question line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Resolved method name (`params[0]`).
    pub method: String,
    /// Colon-split head token; `params[0]` is the method, the rest are
    /// sub-params the capability may interpret.
    pub params: Vec<String>,
    /// Remaining tokens joined by single spaces — the method's argument
    /// string.
    pub text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("the question was empty")]
    EmptyQuestion,
}

impl Command {
    /// Parse a raw question line addressed at the agent with identity `key`,
    /// on behalf of packet `id`.
    ///
    /// A single leading `#<key> ` address token is stripped
    /// (case-insensitive on the key). Every standalone [`ID_PLACEHOLDER`]
    /// token is replaced by `#<id>` so a capability can produce
    /// back-references to its own request.
    pub fn parse(raw: &str, key: &str, id: &PacketId) -> Result<Self, CommandError> {
        let rest = strip_address(raw, key);

        let back_reference = format!("{ADDRESS_MARKER}{id}");
        let mut tokens = rest.split_whitespace().map(|token| {
            if token == ID_PLACEHOLDER {
                back_reference.clone()
            } else {
                token.to_owned()
            }
        });

        let head = tokens.next().ok_or(CommandError::EmptyQuestion)?;
        let params: Vec<String> = head.split(':').map(str::to_owned).collect();
        let method = params[0].clone();
        let text = tokens.collect::<Vec<_>>().join(" ");

        Ok(Self {
            method,
            params,
            text,
        })
    }
}

/// Strip one leading `#<key> ` address token, if present.
fn strip_address<'a>(raw: &'a str, key: &str) -> &'a str {
    if let Some(rest) = raw.strip_prefix(ADDRESS_MARKER)
        && rest.len() > key.len()
        && rest.is_char_boundary(key.len())
    {
        let (head, tail) = rest.split_at(key.len());
        if head.eq_ignore_ascii_case(key)
            && let Some(tail) = tail.strip_prefix(' ')
        {
            return tail;
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> PacketId {
        PacketId::from_string("42")
    }

    #[test]
    fn splits_method_and_argument_string() {
        let command = Command::parse("hello big  wide world", "hello", &id()).expect("parse");
        assert_eq!(command.method, "hello");
        assert_eq!(command.params, vec!["hello"]);
        assert_eq!(command.text, "big wide world");
    }

    #[test]
    fn head_token_splits_on_colon_into_params() {
        let command = Command::parse("lookup:en:fr bonjour", "hello", &id()).expect("parse");
        assert_eq!(command.method, "lookup");
        assert_eq!(command.params, vec!["lookup", "en", "fr"]);
        assert_eq!(command.text, "bonjour");
    }

    #[test]
    fn leading_address_token_is_stripped_case_insensitively() {
        let command = Command::parse("#HeLLo hello there", "hello", &id()).expect("parse");
        assert_eq!(command.method, "hello");
        assert_eq!(command.text, "there");
    }

    #[test]
    fn address_token_for_another_key_is_left_alone() {
        let command = Command::parse("#other hello", "hello", &id()).expect("parse");
        assert_eq!(command.method, "#other");
        assert_eq!(command.text, "hello");
    }

    #[test]
    fn id_placeholder_substitutes_the_packet_id() {
        let command = Command::parse("echo before :id: after", "hello", &id()).expect("parse");
        assert_eq!(command.text, "before #42 after");
    }

    #[test]
    fn placeholder_embedded_in_a_word_is_not_substituted() {
        let command = Command::parse("echo pre:id:post", "hello", &id()).expect("parse");
        assert_eq!(command.text, "pre:id:post");
    }

    #[test]
    fn empty_and_whitespace_input_is_a_distinct_error() {
        assert_eq!(
            Command::parse("", "hello", &id()),
            Err(CommandError::EmptyQuestion)
        );
        assert_eq!(
            Command::parse("   ", "hello", &id()),
            Err(CommandError::EmptyQuestion)
        );
    }

    #[test]
    fn address_only_input_is_empty() {
        assert_eq!(
            Command::parse("#hello ", "hello", &id()),
            Err(CommandError::EmptyQuestion)
        );
    }
}
