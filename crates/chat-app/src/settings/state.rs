use std::path::{Path, PathBuf};
use std::sync::Arc;

use aichat_identity::{DEFAULT_IDENTITY_ENDPOINT, IdentityConfig};
use aichat_llm::{
    DEFAULT_GEMINI_MODEL, GenerationConfig, ProviderConfig, RIG_GEMINI_PROVIDER_ID, SafetySetting,
    default_safety_settings,
};
use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::SessionConfig;

pub const SETTINGS_DIRECTORY_NAME: &str = "aichat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "AICHAT_";

/// Unprefixed credential variables accepted as a fallback for `AICHAT_*` ones.
const RAW_CREDENTIAL_VARS: [&str; 2] = ["GEMINI_API_KEY", "FIREBASE_API_KEY"];

/// Process-wide configuration for the chat client.
///
/// Credentials are only ever read from the environment; they are never written back
/// to the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default = "default_safety_settings")]
    pub safety_settings: Vec<SafetySetting>,
    #[serde(default = "default_identity_endpoint")]
    pub identity_endpoint: String,
    #[serde(default, skip_serializing)]
    pub gemini_api_key: String,
    #[serde(default, skip_serializing)]
    pub firebase_api_key: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            endpoint: String::new(),
            model_name: default_model_name(),
            generation: GenerationConfig::default(),
            safety_settings: default_safety_settings(),
            identity_endpoint: default_identity_endpoint(),
            gemini_api_key: String::new(),
            firebase_api_key: String::new(),
        }
    }
}

impl ChatSettings {
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if self.gemini_api_key.trim().is_empty() {
            return None;
        }

        Some(ProviderConfig::new(
            &self.provider_id,
            &self.gemini_api_key,
            &self.endpoint,
        ))
    }

    pub fn to_identity_config(&self) -> Option<IdentityConfig> {
        if self.firebase_api_key.trim().is_empty() {
            return None;
        }

        Some(IdentityConfig::new(
            &self.firebase_api_key,
            &self.identity_endpoint,
        ))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model_id: self.model_name.clone(),
            generation_config: self.generation,
            safety_settings: self.safety_settings.clone(),
        }
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = non_blank_or(self.provider_id, default_provider_id);
        self.endpoint = self.endpoint.trim().to_string();
        self.model_name = non_blank_or(self.model_name, default_model_name);
        self.identity_endpoint = non_blank_or(self.identity_endpoint, default_identity_endpoint);
        self.gemini_api_key = self.gemini_api_key.trim().to_string();
        self.firebase_api_key = self.firebase_api_key.trim().to_string();
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ChatSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".aichat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_sources(&config_path);
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

    pub fn settings(&self) -> Arc<ChatSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ChatSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Defaults, then the JSON file, then environment overrides.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ChatSettings::default()))
            .merge(Json::file(path))
            .merge(Env::raw().only(&RAW_CREDENTIAL_VARS))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn load_from_sources(path: &Path) -> ChatSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        match Self::figment(path).extract::<ChatSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ChatSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ChatSettings) -> Result<(), SettingsError> {
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

        tracing::info!("saved settings to {:?}", self.config_path);
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

fn default_provider_id() -> String {
    RIG_GEMINI_PROVIDER_ID.to_string()
}

fn default_model_name() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_identity_endpoint() -> String {
    DEFAULT_IDENTITY_ENDPOINT.to_string()
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}
