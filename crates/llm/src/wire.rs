use ganesha_storage::{Message, Role};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn streaming(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            stream: true,
            messages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            images: message.images.clone(),
        }
    }
}

/// One decoded line of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamRecord {
    pub delta: Option<String>,
    pub done: bool,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Option<String>,
}

impl RawRecord {
    /// Chat-shaped `message.content` wins over generate-shaped `response`.
    fn into_delta(self) -> Option<String> {
        self.message
            .and_then(|message| message.content)
            .or(self.response)
    }
}

pub fn parse_record(line: &str) -> Result<StreamRecord, serde_json::Error> {
    let raw: RawRecord = serde_json::from_str(line)?;
    let done = raw.done;
    Ok(StreamRecord {
        delta: raw.into_delta(),
        done,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagsModel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsModel {
    pub name: String,
}
