//! Shared configuration for scanlink tools.
//!
//! TOML profiles merged with `SCANLINK_*` environment overrides, and
//! translation to `scanlink_core::ClientConfig` plus the `PageOrigin` the
//! client's environment starts from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scanlink_core::{ClientConfig, PageOrigin, ReconnectPolicy};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named channel profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

/// Name used when neither the caller nor the file picks a profile.
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "plain".into()
}
fn default_color() -> String {
    "auto".into()
}

/// A named channel profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Origin of the dashboard page (e.g. "https://dashboard.example.com").
    /// An `https`/`wss` origin selects the secure transport.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Endpoint path on the origin host.
    #[serde(default = "default_path")]
    pub path: String,

    /// Delay between automatic reconnect attempts, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Cap on consecutive automatic attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Whether automatic recovery is enabled at all.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            path: default_path(),
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            auto_reconnect: default_auto_reconnect(),
        }
    }
}

fn default_origin() -> String {
    "http://localhost:8000".into()
}
fn default_path() -> String {
    scanlink_core::config::DEFAULT_PATH.into()
}
fn default_interval_ms() -> u64 {
    5000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_auto_reconnect() -> bool {
    true
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "scanlink", "scanlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("scanlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// A missing file is not an error; defaults apply. Environment variables
/// use a double underscore for nesting, e.g.
/// `SCANLINK_PROFILES__LOCAL__ORIGIN=http://localhost:3000`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SCANLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

impl Config {
    /// Pick a profile: the explicit `name`, else `default_profile`.
    ///
    /// An explicitly named profile must exist. When falling back to the
    /// default name and nothing is configured, built-in defaults apply.
    pub fn resolve_profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        if let Some(name) = name {
            return self
                .profiles
                .get(name)
                .cloned()
                .map(|p| (name.to_owned(), p))
                .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() });
        }

        let name = self
            .default_profile
            .clone()
            .unwrap_or_else(|| DEFAULT_PROFILE.into());
        let profile = self.profiles.get(&name).cloned().unwrap_or_default();
        Ok((name, profile))
    }
}

impl Profile {
    /// Reconnection policy described by this profile.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts,
            auto_reconnect: self.auto_reconnect,
        }
    }

    /// Parse `origin` into the page origin the client environment starts from.
    pub fn page_origin(&self) -> Result<PageOrigin, ConfigError> {
        let url: url::Url = self.origin.parse().map_err(|_| ConfigError::Validation {
            field: "origin".into(),
            reason: format!("invalid URL: {}", self.origin),
        })?;

        PageOrigin::from_url(&url).map_err(|e| ConfigError::Validation {
            field: "origin".into(),
            reason: e.to_string(),
        })
    }

    /// Check every field, returning the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.page_origin()?;

        if !self.path.starts_with('/') {
            return Err(ConfigError::Validation {
                field: "path".into(),
                reason: format!("must start with '/', got '{}'", self.path),
            });
        }

        Ok(())
    }
}

/// Build the client settings and starting origin for a profile.
pub fn profile_to_client_config(profile: &Profile) -> Result<(ClientConfig, PageOrigin), ConfigError> {
    profile.validate()?;
    let origin = profile.page_origin()?;
    let config = ClientConfig::new(profile.path.clone()).with_policy(profile.policy());
    Ok((config, origin))
}
