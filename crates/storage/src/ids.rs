use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque conversation identifier.
///
/// Freshly minted ids are time-ordered UUIDs, but any string read back from disk is accepted
/// as-is so hand-edited or older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn new_v7() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_unique() {
        let first = ConversationId::new_v7();
        let second = ConversationId::new_v7();
        assert_ne!(first, second);
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = ConversationId::from("chat-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"chat-1\"");
        let parsed: ConversationId = serde_json::from_str("\"chat-1\"").unwrap();
        assert_eq!(parsed, id);
    }
}
