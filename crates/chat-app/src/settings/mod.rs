pub mod state;

pub use state::{AppSettings, ENV_PREFIX, SETTINGS_FILE_NAME, SettingsError, SettingsStore};
