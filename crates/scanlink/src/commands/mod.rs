//! Command handlers for channel-backed subcommands.

pub mod config_cmd;
pub mod send;
pub mod watch;

use std::time::Duration;

use scanlink_core::{ChannelError, ConnectionState, EventChannel};

use crate::cli::{Command, OutputFormat};
use crate::error::CliError;
use crate::output::StatusLine;

/// Resolved presentation and timing settings shared by handlers.
#[derive(Debug)]
pub struct Context {
    pub format: OutputFormat,
    pub color: bool,
    pub status: StatusLine,
    pub timeout: Duration,
    pub endpoint: String,
}

impl Context {
    /// Wrap a terminal channel error with the endpoint it concerned.
    pub fn failed(&self, source: ChannelError) -> CliError {
        CliError::ChannelFailed {
            url: self.endpoint.clone(),
            source,
        }
    }
}

pub async fn dispatch(cmd: Command, channel: &EventChannel, ctx: &Context) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, channel, ctx).await,
        Command::Send(args) => send::handle(args, channel, ctx).await,
        Command::Config(_) | Command::Completions(_) => unreachable!("handled before dispatch"),
    }
}

/// Wait until the channel opens or gives up, bounded by `ctx.timeout`.
pub async fn wait_until_open(channel: &EventChannel, ctx: &Context) -> Result<(), CliError> {
    let settled = tokio::time::timeout(
        ctx.timeout,
        channel.wait_for(|s| matches!(s.state, ConnectionState::Open | ConnectionState::Failed)),
    )
    .await
    .map_err(|_| CliError::Timeout {
        seconds: ctx.timeout.as_secs(),
    })?;

    match settled {
        Some(status) if status.state == ConnectionState::Open => Ok(()),
        Some(status) => Err(ctx.failed(status.last_error.unwrap_or(
            ChannelError::RetriesExhausted {
                attempts: status.attempts,
            },
        ))),
        None => Err(ctx.failed(ChannelError::NotConnected)),
    }
}
