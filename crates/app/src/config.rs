use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use qanoon_api::ApiConfig;
use qanoon_session::{DEFAULT_OAUTH_PROVIDER, SESSION_FILE_NAME, SupabaseConfig};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "qanoon";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "QANOON_";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_AUTH_URL: &str = "http://localhost:54321";
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:5173";

/// Where the client finds the backend and the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default)]
    pub auth_anon_key: String,
    #[serde(default = "default_oauth_provider")]
    pub oauth_provider: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// Unset means requests never time out.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            auth_url: default_auth_url(),
            auth_anon_key: String::new(),
            oauth_provider: default_oauth_provider(),
            redirect_url: default_redirect_url(),
            request_timeout_ms: None,
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        self.api_base_url = normalize_url(&self.api_base_url, default_api_base_url);
        self.auth_url = normalize_url(&self.auth_url, default_auth_url);
        self.auth_anon_key = self.auth_anon_key.trim().to_string();
        self.oauth_provider = if self.oauth_provider.trim().is_empty() {
            default_oauth_provider()
        } else {
            self.oauth_provider.trim().to_ascii_lowercase()
        };
        self.redirect_url = normalize_url(&self.redirect_url, default_redirect_url);
        self.request_timeout_ms = self.request_timeout_ms.filter(|timeout| *timeout > 0);
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn api_config(&self) -> ApiConfig {
        let config = ApiConfig::new(self.api_base_url.clone());
        match self.request_timeout() {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }

    pub fn supabase_config(&self, session_file: PathBuf) -> SupabaseConfig {
        let config = SupabaseConfig::new(self.auth_url.clone(), self.auth_anon_key.clone())
            .with_session_file(session_file);
        match self.request_timeout() {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }
}

/// Layers defaults, the settings file and `QANOON_*` environment variables, in that order.
pub fn load_settings(path: &Path) -> ClientSettings {
    if !path.exists() {
        tracing::debug!(path = ?path, "settings file not found; using defaults and environment");
    }

    let figment = Figment::from(Serialized::defaults(ClientSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed(ENV_PREFIX));

    match figment.extract::<ClientSettings>() {
        Ok(settings) => settings.normalized(),
        Err(error) => {
            tracing::warn!(path = ?path, error = %error, "failed to parse settings file; using defaults and environment");
            load_environment_settings()
        }
    }
}

fn load_environment_settings() -> ClientSettings {
    Figment::from(Serialized::defaults(ClientSettings::default()))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract::<ClientSettings>()
        .map(ClientSettings::normalized)
        .unwrap_or_else(|error| {
            tracing::warn!(error = %error, "failed to parse environment settings; using defaults");
            ClientSettings::default()
        })
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".qanoon"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = load_settings(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The signed-in session is kept next to the settings file.
    pub fn session_file_path(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(|dir| dir.join(SESSION_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(SESSION_FILE_NAME))
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ClientSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = ?self.config_path, "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn normalize_url(value: &str, fallback: fn() -> String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_oauth_provider() -> String {
    DEFAULT_OAUTH_PROVIDER.to_string()
}

fn default_redirect_url() -> String {
    DEFAULT_REDIRECT_URL.to_string()
}
