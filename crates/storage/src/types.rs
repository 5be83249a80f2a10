use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::ids::ConversationId;

/// Title shown for a conversation that has not received a titled user message yet.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Titles longer than this many characters are cut and end in [`TITLE_ELLIPSIS`].
pub const TITLE_MAX_CHARS: usize = 50;
pub const TITLE_ELLIPSIS: &str = "...";

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One chat turn. Images are base64 payloads in attachment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images,
        }
    }

    pub fn user(content: impl Into<String>, images: Vec<String>) -> Self {
        Self::new(Role::User, content, images)
    }

    /// Empty assistant message that a stream fills in.
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new(), Vec::new())
    }
}

/// Conversation aggregate: messages are append-only and the title is derived once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default, with = "title_text")]
    title: Option<String>,
    #[serde(rename = "timestamp", default)]
    pub created_at: u64,
    #[serde(default)]
    messages: Vec<Message>,
}

/// `title` is always written; an unset title is stored as an empty string.
mod title_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(title: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(title.as_deref().unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let title = Option::<String>::deserialize(deserializer)?;
        Ok(title.filter(|title| !title.is_empty()))
    }
}

impl Conversation {
    /// Creates an empty conversation stamped with the current time.
    pub fn new(id: ConversationId) -> Self {
        Self::with_created_at(id, current_unix_timestamp_seconds())
    }

    pub fn with_created_at(id: ConversationId, created_at: u64) -> Self {
        Self {
            id,
            title: None,
            created_at,
            messages: Vec::new(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn display_title(&self) -> &str {
        self.title().unwrap_or(DEFAULT_CONVERSATION_TITLE)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Appends a user message and derives the title if this is the first titled one.
    ///
    /// Returns the index of the new message.
    pub fn push_user(&mut self, content: impl Into<String>, images: Vec<String>) -> usize {
        let message = Message::user(content, images);
        if self.title.is_none() {
            self.title = derive_title(&message.content);
        }
        self.push(message)
    }

    /// Appends the empty assistant message a stream will write into.
    pub fn push_assistant_placeholder(&mut self) -> usize {
        self.push(Message::assistant_placeholder())
    }

    /// Appends streamed text to the assistant message at `index`.
    ///
    /// Returns false when the index does not point at an assistant message.
    pub fn append_to_assistant(&mut self, index: usize, text: &str) -> bool {
        match self.messages.get_mut(index) {
            Some(message) if message.role == Role::Assistant => {
                message.content.push_str(text);
                true
            }
            _ => false,
        }
    }

    fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }
}

/// Title from the first user message: trimmed, and cut to [`TITLE_MAX_CHARS`] characters with
/// the last three replaced by an ellipsis. Blank text yields no title.
pub fn derive_title(content: &str) -> Option<String> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    if content.chars().count() <= TITLE_MAX_CHARS {
        return Some(content.to_string());
    }

    let keep = TITLE_MAX_CHARS - TITLE_ELLIPSIS.len();
    let mut title = content.chars().take(keep).collect::<String>();
    title.push_str(TITLE_ELLIPSIS);
    Some(title)
}

pub fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
