//! JSON files under the per-application config directory.
//!
//! Loads never fail: a missing, unreadable or malformed file reads as empty/default state.
//! Saves replace the whole file through a temporary sibling and a rename.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::ResultExt;

use super::error::{
    CreateDirectorySnafu, NotAnObjectSnafu, ParseJsonSnafu, ReadFileSnafu, RenameTempFileSnafu,
    SerializeJsonSnafu, StorageResult, WriteFileSnafu,
};
use super::types::Conversation;

pub const APP_DIRECTORY_NAME: &str = "ganesha";
pub const CONVERSATIONS_FILE_NAME: &str = "conversations.json";
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

pub const PREFERRED_MODEL_KEY: &str = "preferred_model";
pub const DARK_THEME_KEY: &str = "dark_theme";

/// Typed view over the preferences file. Unknown keys are ignored here and preserved on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub preferred_model: Option<String>,
    #[serde(default)]
    pub dark_theme: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConversationsFile {
    #[serde(default)]
    conversations: Vec<Conversation>,
}

#[derive(Debug, Clone)]
pub struct Persistence {
    directory: PathBuf,
}

impl Persistence {
    pub fn default_directory() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(APP_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".ganesha"))
    }

    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn conversations_path(&self) -> PathBuf {
        self.directory.join(CONVERSATIONS_FILE_NAME)
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.directory.join(PREFERENCES_FILE_NAME)
    }

    pub fn load_conversations(&self) -> Vec<Conversation> {
        let path = self.conversations_path();
        match self.try_load_conversations(&path) {
            Ok(conversations) => conversations,
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "failed to load conversations; starting empty");
                Vec::new()
            }
        }
    }

    pub fn save_conversations(&self, conversations: &[Conversation]) -> StorageResult<()> {
        #[derive(Serialize)]
        struct ConversationsFileRef<'a> {
            conversations: &'a [Conversation],
        }

        let content = serde_json::to_string_pretty(&ConversationsFileRef { conversations })
            .context(SerializeJsonSnafu {
                stage: "serialize-conversations",
            })?;
        self.replace_file(&self.conversations_path(), &content)?;

        tracing::debug!(
            conversation_count = conversations.len(),
            "saved conversations"
        );
        Ok(())
    }

    pub fn load_preferences(&self) -> Preferences {
        let path = self.preferences_path();
        if !path.exists() {
            return Preferences::default();
        }

        let figment =
            Figment::from(Serialized::defaults(Preferences::default())).merge(Json::file(&path));

        match figment.extract::<Preferences>() {
            Ok(preferences) => preferences,
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "failed to parse preferences; using defaults");
                Preferences::default()
            }
        }
    }

    pub fn load_preference(&self, key: &str) -> Option<Value> {
        let path = self.preferences_path();
        match self.read_preferences_object(&path) {
            Ok(object) => object.and_then(|mut object| object.remove(key)),
            Err(error) => {
                tracing::warn!(path = %path.display(), key, error = %error, "failed to read preference");
                None
            }
        }
    }

    /// Read-merge-write of one key: every other member already on disk is kept verbatim.
    ///
    /// An existing file that cannot be parsed is replaced by a single-key object.
    pub fn save_preference(&self, key: &str, value: impl Into<Value>) -> StorageResult<()> {
        let path = self.preferences_path();
        let existing = match self.read_preferences_object(&path) {
            Ok(object) => object.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "discarding unreadable preferences");
                Map::new()
            }
        };

        let mut merged = Map::with_capacity(existing.len() + 1);
        for (existing_key, existing_value) in existing {
            if existing_key != key {
                merged.insert(existing_key, existing_value);
            }
        }
        merged.insert(key.to_string(), value.into());

        let content = serde_json::to_string_pretty(&Value::Object(merged)).context(
            SerializeJsonSnafu {
                stage: "serialize-preferences",
            },
        )?;
        self.replace_file(&path, &content)?;

        tracing::debug!(key, "saved preference");
        Ok(())
    }

    fn try_load_conversations(&self, path: &Path) -> StorageResult<Vec<Conversation>> {
        let Some(content) = read_optional(path, "read-conversations")? else {
            return Ok(Vec::new());
        };

        let file: ConversationsFile = serde_json::from_str(&content).context(ParseJsonSnafu {
            stage: "parse-conversations",
            path: display_path(path),
        })?;
        Ok(file.conversations)
    }

    fn read_preferences_object(&self, path: &Path) -> StorageResult<Option<Map<String, Value>>> {
        let Some(content) = read_optional(path, "read-preferences")? else {
            return Ok(None);
        };

        let value: Value = serde_json::from_str(&content).context(ParseJsonSnafu {
            stage: "parse-preferences",
            path: display_path(path),
        })?;

        match value {
            Value::Object(object) => Ok(Some(object)),
            _ => NotAnObjectSnafu {
                stage: "parse-preferences",
                path: display_path(path),
            }
            .fail(),
        }
    }

    fn replace_file(&self, path: &Path, content: &str) -> StorageResult<()> {
        std::fs::create_dir_all(&self.directory).context(CreateDirectorySnafu {
            stage: "create-storage-directory",
            path: display_path(&self.directory),
        })?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-file",
            path: display_path(&temp_path),
        })?;

        std::fs::rename(&temp_path, path).context(RenameTempFileSnafu {
            stage: "rename-temporary-file",
            from: display_path(&temp_path),
            to: display_path(path),
        })
    }
}

fn read_optional(path: &Path, stage: &'static str) -> StorageResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(source).context(ReadFileSnafu {
            stage,
            path: display_path(path),
        }),
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ConversationId;
    use crate::types::DEFAULT_CONVERSATION_TITLE;
    use serde_json::json;

    fn persistence() -> (tempfile::TempDir, Persistence) {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::new(dir.path().join("ganesha"));
        (dir, persistence)
    }

    fn sample_conversations() -> Vec<Conversation> {
        let mut first = Conversation::with_created_at(ConversationId::from("one"), 1_700_000_000);
        first.push_user("what is in this picture?", vec!["aGVsbG8=".to_string()]);
        let reply = first.push_assistant_placeholder();
        first.append_to_assistant(reply, "A cat.");

        let mut second = Conversation::with_created_at(ConversationId::from("two"), 1_700_000_100);
        second.push_user("second chat", Vec::new());
        second.push_assistant_placeholder();

        let empty = Conversation::with_created_at(ConversationId::from("three"), 1_700_000_200);
        vec![first, second, empty]
    }

    #[test]
    fn conversations_round_trip() {
        let (_dir, persistence) = persistence();
        let conversations = sample_conversations();

        persistence.save_conversations(&conversations).unwrap();
        assert_eq!(persistence.load_conversations(), conversations);
    }

    #[test]
    fn conversations_file_matches_documented_layout() {
        let (_dir, persistence) = persistence();
        persistence
            .save_conversations(&sample_conversations()[..1])
            .unwrap();

        let raw = std::fs::read_to_string(persistence.conversations_path()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            json!({
                "conversations": [{
                    "id": "one",
                    "title": "what is in this picture?",
                    "timestamp": 1_700_000_000u64,
                    "messages": [
                        { "role": "user", "content": "what is in this picture?", "images": ["aGVsbG8="] },
                        { "role": "assistant", "content": "A cat." }
                    ]
                }]
            })
        );
        assert!(raw.contains('\n'), "file should be pretty-printed");
    }

    #[test]
    fn untitled_conversations_still_write_a_title() {
        let (_dir, persistence) = persistence();
        let fresh = Conversation::with_created_at(ConversationId::from("fresh"), 5);
        let mut image_only = Conversation::with_created_at(ConversationId::from("pic"), 6);
        image_only.push_user("   ", vec!["aW1n".to_string()]);
        let conversations = vec![fresh, image_only];

        persistence.save_conversations(&conversations).unwrap();

        let raw = std::fs::read_to_string(persistence.conversations_path()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            json!({
                "conversations": [
                    { "id": "fresh", "title": "", "timestamp": 5, "messages": [] },
                    {
                        "id": "pic",
                        "title": "",
                        "timestamp": 6,
                        "messages": [{ "role": "user", "content": "   ", "images": ["aW1n"] }]
                    }
                ]
            })
        );

        let loaded = persistence.load_conversations();
        assert_eq!(loaded, conversations);
        assert_eq!(loaded[0].title(), None);
        assert_eq!(loaded[0].display_title(), DEFAULT_CONVERSATION_TITLE);
    }

    #[test]
    fn conversation_without_title_member_still_loads() {
        let (_dir, persistence) = persistence();
        std::fs::create_dir_all(persistence.directory()).unwrap();
        std::fs::write(
            persistence.conversations_path(),
            r#"{ "conversations": [ { "id": "old", "timestamp": 9, "messages": [] } ] }"#,
        )
        .unwrap();

        let loaded = persistence.load_conversations();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title(), None);
    }

    #[test]
    fn missing_or_malformed_conversations_load_empty() {
        let (_dir, persistence) = persistence();
        assert!(persistence.load_conversations().is_empty());

        std::fs::create_dir_all(persistence.directory()).unwrap();
        std::fs::write(persistence.conversations_path(), "{ \"conversations\": [ {").unwrap();
        assert!(persistence.load_conversations().is_empty());
    }

    #[test]
    fn save_replaces_previous_file() {
        let (_dir, persistence) = persistence();
        let conversations = sample_conversations();
        persistence.save_conversations(&conversations).unwrap();
        persistence.save_conversations(&conversations[2..]).unwrap();

        assert_eq!(persistence.load_conversations(), conversations[2..].to_vec());
        assert!(!persistence.conversations_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn preference_saves_merge_with_existing_keys() {
        let (_dir, persistence) = persistence();
        persistence.save_preference(DARK_THEME_KEY, true).unwrap();
        persistence.save_preference(PREFERRED_MODEL_KEY, "x").unwrap();

        assert_eq!(persistence.load_preference(DARK_THEME_KEY), Some(json!(true)));
        assert_eq!(persistence.load_preference(PREFERRED_MODEL_KEY), Some(json!("x")));
        assert_eq!(
            persistence.load_preferences(),
            Preferences {
                preferred_model: Some("x".to_string()),
                dark_theme: true,
            }
        );
    }

    #[test]
    fn unknown_preference_values_survive_saves() {
        let (_dir, persistence) = persistence();
        std::fs::create_dir_all(persistence.directory()).unwrap();
        let unknown = json!({ "width": 800, "panes": [1, 2, { "nested": true }] });
        std::fs::write(
            persistence.preferences_path(),
            serde_json::to_string(&json!({ "window": unknown, "dark_theme": false })).unwrap(),
        )
        .unwrap();

        persistence.save_preference(DARK_THEME_KEY, true).unwrap();
        persistence.save_preference(PREFERRED_MODEL_KEY, "llava").unwrap();

        assert_eq!(persistence.load_preference("window"), Some(unknown));
        assert_eq!(persistence.load_preference(DARK_THEME_KEY), Some(json!(true)));
        assert_eq!(
            persistence.load_preferences().preferred_model.as_deref(),
            Some("llava")
        );
    }

    #[test]
    fn first_preference_save_writes_single_key_object() {
        let (_dir, persistence) = persistence();
        persistence.save_preference(PREFERRED_MODEL_KEY, "mistral").unwrap();

        let raw = std::fs::read_to_string(persistence.preferences_path()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({ "preferred_model": "mistral" }));
    }

    #[test]
    fn malformed_preferences_fall_back_to_defaults() {
        let (_dir, persistence) = persistence();
        std::fs::create_dir_all(persistence.directory()).unwrap();
        std::fs::write(persistence.preferences_path(), "not json").unwrap();

        assert_eq!(persistence.load_preferences(), Preferences::default());
        assert_eq!(persistence.load_preference(DARK_THEME_KEY), None);

        persistence.save_preference(DARK_THEME_KEY, true).unwrap();
        assert_eq!(persistence.load_preference(DARK_THEME_KEY), Some(json!(true)));
    }
}
