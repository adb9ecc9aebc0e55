//! Cached artifact types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// What kind of generated content an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Plain model response text
    #[default]
    Text,
    /// Output of a tool invocation
    ToolResult,
    /// Anything else
    Other,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Text => "text",
            ArtifactKind::ToolResult => "tool_result",
            ArtifactKind::Other => "other",
        }
    }

    /// Parse a stored tag; unknown tags map to `Other`
    pub fn parse(tag: &str) -> Self {
        match tag {
            "text" => ArtifactKind::Text,
            "tool_result" | "tool-result" => ArtifactKind::ToolResult,
            _ => ArtifactKind::Other,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool call attached to a cached response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A generated artifact stored in the response cache
///
/// `size_bytes` is derived from the content and the serialized metadata and
/// is recomputed by the cache on every `put`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub key: String,
    pub content: String,
    pub kind: ArtifactKind,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: usize,
}

impl CachedArtifact {
    /// Create a new artifact; the key is assigned when it is stored
    pub fn new(content: impl Into<String>, kind: ArtifactKind) -> Self {
        let now = Utc::now();
        let mut artifact = Self {
            key: String::new(),
            content: content.into(),
            kind,
            tool_calls: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            accessed_at: now,
            access_count: 1,
            size_bytes: 0,
        };
        artifact.recompute_size();
        artifact
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(content, ArtifactKind::Text)
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self::new(content, ArtifactKind::ToolResult)
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self.recompute_size();
        self
    }

    /// Backdate the artifact (restoring from disk, tests)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        if self.accessed_at < created_at {
            self.accessed_at = created_at;
        }
        self
    }

    /// Content bytes plus serialized metadata bytes
    pub fn compute_size(content: &str, metadata: &HashMap<String, Value>) -> usize {
        let metadata_len = serde_json::to_string(metadata)
            .map(|s| s.len())
            .unwrap_or(0);
        content.len() + metadata_len
    }

    pub fn recompute_size(&mut self) {
        self.size_bytes = Self::compute_size(&self.content, &self.metadata);
    }

    /// True once `now - created_at` exceeds `ttl`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.created_at)
            .to_std()
            .map(|age| age > ttl)
            .unwrap_or(false)
    }

    pub(crate) fn record_access(&mut self, now: DateTime<Utc>) {
        self.accessed_at = now;
        self.access_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_size_covers_content_and_metadata() {
        let artifact = CachedArtifact::text("hello");
        // "{}" for the empty metadata map
        assert_eq!(artifact.size_bytes, 5 + 2);

        let artifact = artifact.with_metadata("model", json!("grok"));
        assert_eq!(artifact.size_bytes, 5 + r#"{"model":"grok"}"#.len());
    }

    #[test]
    fn test_tool_calls_do_not_count_towards_size() {
        let plain = CachedArtifact::tool_result("out");
        let with_calls = CachedArtifact::tool_result("out")
            .with_tool_calls(vec![ToolCall::new("c1", "bash", json!({"cmd": "ls"}))]);
        assert_eq!(plain.size_bytes, with_calls.size_bytes);
    }

    #[test]
    fn test_expiry_uses_created_at() {
        let now = Utc::now();
        let artifact =
            CachedArtifact::text("x").with_created_at(now - chrono::Duration::seconds(10));

        assert!(artifact.is_expired(Duration::from_secs(5), now));
        assert!(!artifact.is_expired(Duration::from_secs(10), now));
        assert!(!artifact.is_expired(Duration::from_secs(60), now));
    }

    #[test]
    fn test_kind_tags() {
        for kind in [ArtifactKind::Text, ArtifactKind::ToolResult, ArtifactKind::Other] {
            assert_eq!(ArtifactKind::parse(kind.as_str()), kind);
        }
        assert_eq!(ArtifactKind::parse("tool-result"), ArtifactKind::ToolResult);
        assert_eq!(ArtifactKind::parse("image"), ArtifactKind::Other);
    }
}
