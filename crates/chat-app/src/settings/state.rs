use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use ganesha_llm::{ClientConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT};
use ganesha_storage::Persistence;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Environment variables with this prefix override the settings file.
pub const ENV_PREFIX: &str = "GANESHA_";

/// Startup configuration. Read once; the app never writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Base URL of the inference server.
    pub endpoint: String,
    pub request_timeout_secs: u64,
    /// Model used until the user picks one.
    pub default_model: String,
    /// Where conversations and preferences live. Defaults to the per-user config directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            default_model: DEFAULT_MODEL.to_string(),
            data_dir: None,
        }
    }
}

impl AppSettings {
    pub fn client_config(&self) -> ClientConfig {
        let timeout = match self.request_timeout_secs {
            0 => DEFAULT_REQUEST_TIMEOUT,
            secs => Duration::from_secs(secs),
        };
        ClientConfig::new(&self.endpoint, timeout)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(Persistence::default_directory)
    }

    pub fn default_model(&self) -> &str {
        match self.default_model.trim() {
            "" => DEFAULT_MODEL,
            model => model,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("[{stage}] failed to load settings from {}: {source}", path.display()))]
    ExtractSettings {
        stage: &'static str,
        path: PathBuf,
        source: figment::Error,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Layers defaults, the settings file and `GANESHA_*` environment variables.
pub struct SettingsStore {
    settings: AppSettings,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_path() -> PathBuf {
        Persistence::default_directory().join(SETTINGS_FILE_NAME)
    }

    /// Loads settings from `config_path`, falling back to defaults when they cannot be read.
    pub fn new(config_path: PathBuf) -> Self {
        let settings = match Self::try_load(&config_path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(error = %error, "invalid settings; using defaults");
                AppSettings::default()
            }
        };
        Self {
            settings,
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn try_load(path: &Path) -> SettingsResult<AppSettings> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
        }

        Self::figment(path)
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .context(ExtractSettingsSnafu {
                stage: "extract-settings",
                path: path.to_path_buf(),
            })
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppSettings::default())).merge(Json::file(path))
    }
}
