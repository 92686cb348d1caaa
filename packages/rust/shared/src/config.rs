//! Application configuration for GrantScout.
//!
//! User config lives at `~/.grantscout/grantscout.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GrantScoutError, Result};
use crate::types::SearchConfig;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "grantscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".grantscout";

// ---------------------------------------------------------------------------
// Config structs (matching grantscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default search parameters.
    #[serde(default)]
    pub search: SearchDefaults,

    /// Extraction provider settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Digest delivery settings.
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaults {
    /// Keywords used when none are passed on the command line.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Funding year. `None` means the current calendar year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            year: None,
        }
    }
}

fn default_keywords() -> Vec<String> {
    vec![
        "renewable energy".into(),
        "research and development".into(),
        "small business innovation".into(),
    ]
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Name of the env var holding the provider API key.
    #[serde(default = "default_extraction_key_env")]
    pub api_key_env: String,

    /// Model identifier sent to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Provider API base URL.
    #[serde(default = "default_extraction_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_extraction_key_env(),
            model: default_model(),
            base_url: default_extraction_base_url(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

fn default_extraction_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_extraction_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_extraction_timeout() -> u64 {
    120
}

/// `[notification]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Whether digests are sent after runs that find something new.
    #[serde(default)]
    pub enabled: bool,

    /// Digest recipient address.
    #[serde(default)]
    pub recipient: String,

    /// Mail relay endpoint accepting a JSON message.
    #[serde(default = "default_notification_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the relay token (optional at runtime).
    #[serde(default = "default_notification_key_env")]
    pub api_key_env: String,

    /// Sender address placed in the `from` field.
    #[serde(default = "default_sender")]
    pub sender: String,

    /// Request timeout in seconds.
    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            recipient: String::new(),
            endpoint: default_notification_endpoint(),
            api_key_env: default_notification_key_env(),
            sender: default_sender(),
            timeout_secs: default_notification_timeout(),
        }
    }
}

fn default_notification_endpoint() -> String {
    "http://localhost:8025/api/send".into()
}
fn default_notification_key_env() -> String {
    "GRANTSCOUT_MAIL_TOKEN".into()
}
fn default_sender() -> String {
    "grantscout@localhost".into()
}
fn default_notification_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Build the per-run search parameters from the config file values.
    pub fn search_config(&self, current_year: i32) -> SearchConfig {
        SearchConfig {
            keywords: self.search.keywords.clone(),
            year: self.search.year.unwrap_or(current_year),
            email_recipient: self.notification.recipient.clone(),
            notification_enabled: self.notification.enabled,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.grantscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GrantScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.grantscout/grantscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GrantScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        GrantScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GrantScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GrantScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GrantScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the named env var. Empty values count as missing.
pub fn read_secret(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}
