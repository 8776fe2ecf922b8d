//! Configuration management for CLI tools.
//!
//! Configuration is stored in ~/.dailycast/{app_name}/config.yaml and holds
//! named contexts, similar to kubectl's context management.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".dailycast";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Environment variable consulted when a context has no app id.
pub const ENV_APP_ID: &str = "VOLCENGINE_APP_ID";
/// Environment variable consulted when a context has no access key.
pub const ENV_ACCESS_KEY: &str = "VOLCENGINE_ACCESS_KEY";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application name (not serialized).
    #[serde(skip)]
    pub app_name: String,

    /// Name of the currently active context.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_context: String,

    /// Map of context name to context configuration.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub contexts: HashMap<String, Context>,

    /// Path to the config file (not serialized).
    #[serde(skip)]
    config_path: PathBuf,
}

/// A single context: credentials plus synthesis settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Context name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Volcengine speech credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volcengine: Option<VolcengineCredentials>,

    /// WebSocket endpoint (optional, uses default if empty).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    /// Role to voice mapping, e.g. `host: zh_male_...`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub speakers: HashMap<String, String>,

    /// Audio format (mp3, wav, pcm, ogg_opus).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audio_format: String,

    /// Sample rate in Hz.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sample_rate: i32,

    /// Speech rate offset (-50..100).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub speech_rate: i32,

    #[serde(default, skip_serializing_if = "is_false")]
    pub use_head_music: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub use_tail_music: bool,

    /// Maximum attempts per build (optional).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_attempts: i32,

    /// Per-operation timeout in seconds (optional).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeout: i32,

    /// Directory for date-keyed daily artifacts.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_dir: String,
}

/// Volcengine speech credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolcengineCredentials {
    /// Application ID.
    #[serde(default)]
    pub app_id: String,

    /// Access key (X-Api-Access-Key).
    #[serde(default)]
    pub access_key: String,

    /// Resource ID (optional, uses the podcast resource if empty).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_id: String,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Config {
    /// Gets the default config directory.
    pub fn default_config_dir(app_name: &str) -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join(app_name))
    }

    /// Gets the default config file path.
    pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
        Self::default_config_dir(app_name).map(|dir| dir.join(DEFAULT_CONFIG_FILE))
    }

    /// Returns the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Saves the configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Adds or replaces a context.
    pub fn add_context(&mut self, name: &str, mut ctx: Context) -> anyhow::Result<()> {
        ctx.name = name.to_string();
        self.contexts.insert(name.to_string(), ctx);
        self.save()
    }

    /// Deletes a context.
    pub fn delete_context(&mut self, name: &str) -> anyhow::Result<()> {
        if self.contexts.remove(name).is_none() {
            anyhow::bail!("context '{}' not found", name);
        }
        if self.current_context == name {
            self.current_context.clear();
        }
        self.save()
    }

    /// Sets the current context.
    pub fn use_context(&mut self, name: &str) -> anyhow::Result<()> {
        if !self.contexts.contains_key(name) {
            anyhow::bail!("context '{}' not found", name);
        }
        self.current_context = name.to_string();
        self.save()
    }

    /// Gets a specific context.
    pub fn get_context(&self, name: &str) -> Option<&Context> {
        self.contexts.get(name)
    }

    /// Gets the current context.
    pub fn get_current_context(&self) -> Option<&Context> {
        if self.current_context.is_empty() {
            return None;
        }
        self.contexts.get(&self.current_context)
    }

    /// Resolves the context by name, or current context if name is empty.
    pub fn resolve_context(&self, name: Option<&str>) -> Option<&Context> {
        match name {
            Some(n) if !n.is_empty() => self.get_context(n),
            _ => self.get_current_context(),
        }
    }

    /// Lists all context names, sorted.
    pub fn list_contexts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contexts.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Context {
    /// Returns the credentials, filling empty fields from the environment.
    pub fn credentials(&self) -> anyhow::Result<VolcengineCredentials> {
        self.credentials_with(|key| std::env::var(key).ok())
    }

    /// Like [`credentials`](Self::credentials), reading variables through
    /// `lookup`.
    pub fn credentials_with<F>(&self, lookup: F) -> anyhow::Result<VolcengineCredentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut creds = self.volcengine.clone().unwrap_or_default();

        if creds.app_id.is_empty() {
            creds.app_id = lookup(ENV_APP_ID).unwrap_or_default();
        }
        if creds.access_key.is_empty() {
            creds.access_key = lookup(ENV_ACCESS_KEY).unwrap_or_default();
        }

        if creds.app_id.is_empty() {
            anyhow::bail!(
                "app_id not found in context '{}' or ${}",
                self.name,
                ENV_APP_ID
            );
        }
        if creds.access_key.is_empty() {
            anyhow::bail!(
                "access_key not found in context '{}' or ${}",
                self.name,
                ENV_ACCESS_KEY
            );
        }
        Ok(creds)
    }
}

/// Loads configuration for the specified app, creating an empty file if
/// none exists.
pub fn load_config(app_name: &str, custom_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_config_path(app_name)
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut cfg: Config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content)?
        }
    } else {
        let cfg = Config::default();
        std::fs::write(&config_path, serde_yaml::to_string(&cfg)?)?;
        cfg
    };

    cfg.app_name = app_name.to_string();
    cfg.config_path = config_path;

    Ok(cfg)
}

/// Masks a secret for display.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
    }
}
