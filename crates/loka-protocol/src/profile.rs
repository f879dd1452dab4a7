//! Agent identity ("me").

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Static descriptive record for an agent.
///
/// `key` is the bus-namespace root for every channel the agent touches and
/// must be unique among sibling agents. Everything beyond `key`, `name` and
/// `describe` is free-form presentation metadata (emoji, voice, avatar, ...)
/// kept in `extra` so the envelope stays forward-compatible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub describe: String,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl AgentProfile {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            describe: String::new(),
            extra: IndexMap::new(),
        }
    }

    pub fn describe(mut self, describe: impl Into<String>) -> Self {
        self.describe = describe.into();
        self
    }

    pub fn with_extra(mut self, field: impl Into<String>, value: Value) -> Self {
        self.extra.insert(field.into(), value);
        self
    }
}

/// Text filter an identity may supply (`translate` / `parse` in the profile
/// contract). Installed on the agent at construction and shared with its
/// handlers; the core dispatcher never invokes them itself.
pub trait TextFilter: Send + Sync {
    fn filter(&self, input: &str) -> String;
}

impl<F> TextFilter for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn filter(&self, input: &str) -> String {
        self(input)
    }
}

/// Filter that trims surrounding whitespace, the conventional default.
pub fn trim_filter() -> Arc<dyn TextFilter> {
    Arc::new(|input: &str| input.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_extra_fields_flatten_into_the_envelope() {
        let profile = AgentProfile::new("hello", "Hello World")
            .describe("greets the bus")
            .with_extra("emoji", json!("🌎"));

        let value = serde_json::to_value(&profile).expect("serialize");
        assert_eq!(value["key"], "hello");
        assert_eq!(value["emoji"], "🌎");

        let back: AgentProfile = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back.extra["emoji"], json!("🌎"));
    }

    #[test]
    fn trim_filter_strips_whitespace() {
        let filter = trim_filter();
        assert_eq!(filter.filter("  hi  "), "hi");
    }
}
