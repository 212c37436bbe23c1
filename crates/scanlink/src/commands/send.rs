//! `scanlink send`: open the channel, write one event, close.

use scanlink_core::{ChannelEvent, EventChannel};

use crate::cli::SendArgs;
use crate::commands::{Context, wait_until_open};
use crate::error::CliError;
use crate::output::Tone;

pub async fn handle(args: SendArgs, channel: &EventChannel, ctx: &Context) -> Result<(), CliError> {
    let event = parse_event(&args.json)?;

    channel.connect();
    wait_until_open(channel, ctx).await?;

    let before = channel.last_error();
    let kind = event.kind.clone();
    channel.send(event);

    // Flushes the frame and completes the closing handshake.
    channel.shutdown().await;

    match channel.last_error() {
        Some(source) if before.as_ref() != Some(&source) => Err(CliError::SendFailed { source }),
        _ => {
            ctx.status
                .emit(Tone::Good, &format!("Sent {kind} to {}", ctx.endpoint));
            Ok(())
        }
    }
}

/// Parse a JSON object into an event; a non-empty `type` is required.
fn parse_event(json: &str) -> Result<ChannelEvent, CliError> {
    let event: ChannelEvent = serde_json::from_str(json)?;
    if event.kind.trim().is_empty() {
        return Err(CliError::Validation {
            field: "type".into(),
            reason: "must be a non-empty string".into(),
        });
    }
    Ok(event)
}
