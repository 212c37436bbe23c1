//! CLI error types with miette diagnostics.
//!
//! Maps channel and config failures into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use scanlink_config::ConfigError;
use scanlink_core::ChannelError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Channel ──────────────────────────────────────────────────────

    #[error("Event channel at {url} failed")]
    #[diagnostic(
        code(scanlink::channel_failed),
        help(
            "Check that the dashboard is running and reachable.\n\
             Try: scanlink watch --origin http://localhost:8000 -vv"
        )
    )]
    ChannelFailed {
        url: String,
        #[source]
        source: ChannelError,
    },

    #[error("Channel did not open within {seconds}s")]
    #[diagnostic(
        code(scanlink::timeout),
        help("Increase the wait with --timeout or check the dashboard's responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("Message was not delivered: {source}")]
    #[diagnostic(code(scanlink::send_failed))]
    SendFailed {
        #[source]
        source: ChannelError,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(scanlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(scanlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: scanlink config init --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(scanlink::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(scanlink::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(
        code(scanlink::json),
        help("Pass a JSON object with a string \"type\" field, e.g. '{{\"type\":\"note\"}}'.")
    )]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ChannelFailed { .. } | Self::SendFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            Self::Config(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { name } => Self::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other),
        }
    }
}
