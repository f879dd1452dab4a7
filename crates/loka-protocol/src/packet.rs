//! The question/answer envelope exchanged over the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::PacketId;
use crate::profile::AgentProfile;

/// One request/response exchange, correlated by `id`.
///
/// `a` stays `None` until the dispatcher decides exactly one outcome for the
/// exchange (success, handler failure, method-not-found, not-running or
/// empty-question); after that it is never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub id: PacketId,
    pub q: Question,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Answer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered: Option<DateTime<Utc>>,
}

impl Packet {
    /// Build a fresh unanswered packet around a raw question line.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(PacketId::new(), text)
    }

    pub fn with_id(id: PacketId, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id,
            q: Question {
                text_orig: text.clone(),
                text,
                params: Vec::new(),
            },
            a: None,
            asked: None,
            answered: None,
        }
    }

    /// Whether an outcome has been decided for this exchange.
    pub fn is_answered(&self) -> bool {
        self.a.is_some()
    }
}

/// The question half of a packet.
///
/// `text` is rewritten during parsing (method stripped off, placeholders
/// substituted); the untouched original survives in `text_orig`. `params` is
/// the colon-split head token, with `params[0]` the resolved method name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub text_orig: String,
    #[serde(default)]
    pub params: Vec<String>,
}

/// The answer half, populated exactly once per exchange.
///
/// `error: None` marks the normal outcomes (success, method-not-found,
/// not-running); it is `Some` only when the capability itself failed.
/// `data: None` stands for "no result".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub bot: AgentProfile,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub meta: AnswerMeta,
    pub created: DateTime<Utc>,
}

impl Answer {
    pub fn new(bot: AgentProfile, text: impl Into<String>, meta: AnswerMeta) -> Self {
        Self {
            bot,
            text: text.into(),
            data: None,
            error: None,
            meta,
            created: Utc::now(),
        }
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Routing metadata on an answer: the agent key it came from and the method
/// (or outcome) that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMeta {
    pub format: String,
    pub kind: String,
}

impl AnswerMeta {
    pub fn new(format: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            kind: kind.into(),
        }
    }
}
