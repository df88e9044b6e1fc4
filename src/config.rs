//! Application config: one JSON file holding the identification provider,
//! narration tuning and the default response language.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "pill_identifier.json";
pub const APP_DIR_NAME: &str = "com.pill-identifier";

// ── Identification Provider ────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyConfig {
    /// "gemini" or "openai" (any OpenAI-compatible chat-completions server)
    pub provider_type: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    /// Unset means the provider's own default model.
    pub model: Option<String>,
    /// Per-request HTTP timeout. The whole identification, retries included,
    /// gets twice this.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl IdentifyConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_api_key(&self.api_key, &self.api_key_env)
    }
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            provider_type: "gemini".to_string(),
            api_key: None,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            base_url: None,
            model: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

// ── Narration ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_rate")]
    pub rate: f32,
    #[serde(default = "default_pitch")]
    pub pitch: f32,
    /// Region preferred when several voices share the requested language.
    #[serde(default = "default_region")]
    pub preferred_region: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            pitch: default_pitch(),
            preferred_region: default_region(),
        }
    }
}

fn default_rate() -> f32 {
    0.9
}

fn default_pitch() -> f32 {
    1.0
}

fn default_region() -> String {
    "IN".to_string()
}

// ── Top-Level Config ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub identify: IdentifyConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            identify: IdentifyConfig::default(),
            speech: SpeechConfig::default(),
            default_language: default_language(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// `<data dir>/com.pill-identifier`, or `./com.pill-identifier` when the
/// platform has no data directory.
pub fn app_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

pub fn load_config(path: &Path) -> AppConfig {
    load_json_config(path, "Config")
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    save_json_config(path, config, "Config")
}

/// Generic load for any Serde config type with a `Default` implementation.
/// Falls back to `T::default()` if the file is missing or unparsable.
pub fn load_json_config<T: DeserializeOwned + Default>(path: &Path, label: &str) -> T {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<T>(&content) {
            Ok(config) => {
                tracing::info!("[{}] Loaded config from {}", label, path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "[{}] Failed to parse config {}: {}, using defaults",
                    label,
                    path.display(),
                    e
                );
                T::default()
            }
        },
        Err(_) => {
            tracing::info!(
                "[{}] No config file at {}, using defaults",
                label,
                path.display()
            );
            T::default()
        }
    }
}

/// Generic save for any Serde config type.
pub fn save_json_config<T: Serialize>(path: &Path, config: &T, label: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write config file: {}", e))?;
    tracing::info!("[{}] Saved config to {}", label, path.display());
    Ok(())
}

/// Resolve an API key: check the direct `api_key` field first,
/// then fall back to reading the environment variable named in `api_key_env`.
pub fn resolve_api_key(api_key: &Option<String>, api_key_env: &Option<String>) -> Option<String> {
    if let Some(ref key) = api_key {
        if !key.is_empty() {
            return Some(key.clone());
        }
    }
    if let Some(ref env_var) = api_key_env {
        if let Ok(key) = std::env::var(env_var) {
            if !key.is_empty() {
                return Some(key);
            }
        }
    }
    None
}
