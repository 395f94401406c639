//! TOML-based configuration system for GitWikiSync.
//!
//! Sensitive values (the bot password) are stored as `_env` fields that
//! reference environment variable names; the actual secrets are resolved at
//! runtime via [`AppConfig::resolve_env_vars`]. Configuration problems are
//! fatal at startup.

use std::path::{Path, PathBuf};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::mapper::NameMapper;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Wiki connection, bot identity, and daemon-wide settings.
    pub global: GlobalConfig,

    /// One binding per synchronized repository.
    #[serde(default)]
    pub repos: Vec<RepoBinding>,
}

// ---------------------------------------------------------------------------
// Global section
// ---------------------------------------------------------------------------

/// Daemon-wide configuration shared by all repository bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// MediaWiki Action API endpoint (e.g. `https://bg.wikipedia.org/w/api.php`).
    pub api_url: String,

    /// Wiki account the engine writes as. Revisions authored by this account
    /// are excluded from reconciliation.
    pub bot_username: String,

    /// Environment variable holding the bot password.
    pub bot_password_env: String,

    /// Directory containing the working copies, one per binding.
    pub repositories_root: PathBuf,

    /// Seconds to sleep between sync cycles (default 60).
    #[serde(default = "default_sleep_seconds")]
    pub sleep_seconds: u64,

    /// Base URL for commit links in wiki summaries (e.g.
    /// `https://github.com/wikimedia-bg`).
    pub commit_url_base: String,

    /// Paths excluded from synchronization in every binding (glob patterns).
    #[serde(default)]
    pub global_ignore_list: Vec<String>,

    /// Path to the TOML wiki-user → git-identity mapping file.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Resolved bot password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bot_password: Option<String>,
}

fn default_sleep_seconds() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".into()
}

// ---------------------------------------------------------------------------
// Repository bindings
// ---------------------------------------------------------------------------

/// A one-to-one binding between a wiki namespace slice and a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoBinding {
    /// Binding name, also used in log output.
    pub name: String,

    /// Working-copy directory relative to `repositories_root`. Defaults to
    /// the binding name.
    #[serde(default)]
    pub local_path: Option<String>,

    /// Wiki namespace the binding covers (empty string = main namespace).
    pub namespace: String,

    /// Regex selecting which page titles in the namespace are synchronized.
    #[serde(default = "default_title_pattern")]
    pub title_pattern: String,

    /// Match the title pattern case-insensitively.
    #[serde(default)]
    pub title_nocase: bool,

    /// Content extension forced onto root-level page files (without dot).
    #[serde(default)]
    pub force_extension: Option<String>,

    /// Paths excluded from synchronization for this binding (glob patterns).
    #[serde(default)]
    pub ignore_list: Vec<String>,

    /// Commits whose message matches this pattern are never synced to the
    /// wiki.
    #[serde(default = "default_no_sync_pattern")]
    pub no_sync_pattern: String,

    /// Wiki page receiving one audit row per applied change or conflict.
    /// Activity logging is disabled when unset.
    #[serde(default)]
    pub log_page: Option<String>,

    /// Mainline branch of the repository.
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_title_pattern() -> String {
    ".*".into()
}
fn default_no_sync_pattern() -> String {
    r"\bDO\s+NOT\s+(MERGE|SYNC)\b".into()
}
fn default_branch() -> String {
    "master".into()
}

impl RepoBinding {
    /// The working-copy directory for this binding under `root`.
    pub fn working_copy(&self, root: &Path) -> PathBuf {
        root.join(self.local_path.as_deref().unwrap_or(&self.name))
    }

    /// The title filter with case sensitivity applied.
    pub fn title_filter(&self) -> Result<Regex, ConfigError> {
        let pattern = if self.title_nocase {
            format!("(?i){}", self.title_pattern)
        } else {
            self.title_pattern.clone()
        };
        Regex::new(&pattern).map_err(|e| ConfigError::InvalidValue {
            field: format!("repos.{}.title_pattern", self.name),
            detail: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables and populate
    /// the corresponding resolved fields.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.global.bot_password =
            resolve_optional_env(&self.global.bot_password_env, "global.bot_password_env");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global.api_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "global.api_url".into(),
                detail: "wiki API URL must not be empty".into(),
            });
        }
        if self.global.bot_username.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "global.bot_username".into(),
                detail: "bot username must not be empty".into(),
            });
        }
        if self.global.sleep_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "global.sleep_seconds".into(),
                detail: "sleep interval must be > 0".into(),
            });
        }
        if self.repos.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repos".into(),
                detail: "at least one [[repos]] binding is required".into(),
            });
        }
        for binding in &self.repos {
            if binding.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "repos.name".into(),
                    detail: "binding name must not be empty".into(),
                });
            }
            binding.title_filter()?;
            Regex::new(&binding.no_sync_pattern).map_err(|e| ConfigError::InvalidValue {
                field: format!("repos.{}.no_sync_pattern", binding.name),
                detail: e.to_string(),
            })?;
            NameMapper::new(binding.force_extension.as_deref()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: format!("repos.{}.force_extension", binding.name),
                    detail: e.to_string(),
                }
            })?;
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
