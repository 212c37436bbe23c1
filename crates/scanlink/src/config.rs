//! CLI configuration, a thin layer over `scanlink_config`.
//!
//! Adds resolution that respects `GlobalOpts` overrides (--origin, --path,
//! --output, --color) on top of the selected profile.

use clap::ValueEnum;

use scanlink_core::{ClientConfig, PageOrigin};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use scanlink_config::{Config, Profile, config_path, load_config, save_config};

/// Everything a channel command needs to start a client.
#[derive(Debug)]
pub struct Session {
    pub profile: String,
    pub client: ClientConfig,
    pub origin: PageOrigin,
    /// Resolved channel address, for messages.
    pub endpoint: String,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| scanlink_config::DEFAULT_PROFILE.into())
}

/// Build the session for the active profile, flags taking priority.
pub fn resolve_session(global: &GlobalOpts, cfg: &Config) -> Result<Session, CliError> {
    let (name, mut profile) = cfg
        .resolve_profile(global.profile.as_deref())
        .map_err(|e| match e {
            scanlink_config::ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: available_profiles(cfg),
            },
            other => other.into(),
        })?;

    if let Some(ref origin) = global.origin {
        profile.origin.clone_from(origin);
    }
    if let Some(ref path) = global.path {
        profile.path.clone_from(path);
    }

    let (client, origin) = scanlink_config::profile_to_client_config(&profile)?;
    let endpoint = scanlink_core::endpoint::resolve(&origin, &client.path)
        .map_err(|e| CliError::Validation {
            field: "origin".into(),
            reason: e.to_string(),
        })?
        .to_string();

    tracing::debug!(profile = %name, %endpoint, "Resolved channel settings");
    Ok(Session {
        profile: name,
        client,
        origin,
        endpoint,
    })
}

/// Comma-separated profile names, sorted, for help text.
pub fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}

/// `--output`, else the config default, else plain.
pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global
        .output
        .or_else(|| OutputFormat::from_str(&cfg.defaults.output, true).ok())
        .unwrap_or(OutputFormat::Plain)
}

/// `--color`, else the config default, else auto.
pub fn color_mode(global: &GlobalOpts, cfg: &Config) -> ColorMode {
    global
        .color
        .or_else(|| ColorMode::from_str(&cfg.defaults.color, true).ok())
        .unwrap_or(ColorMode::Auto)
}
