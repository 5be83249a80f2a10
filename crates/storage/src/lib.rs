pub mod error;
pub mod ids;
pub mod persistence;
pub mod store;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use ids::ConversationId;
pub use persistence::{
    APP_DIRECTORY_NAME, DARK_THEME_KEY, PREFERRED_MODEL_KEY, Persistence, Preferences,
};
pub use store::ConversationStore;
pub use types::{
    Conversation, DEFAULT_CONVERSATION_TITLE, Message, Role, current_unix_timestamp_seconds,
    derive_title,
};
