//! `scanlink watch`: tail the channel until interrupted.
//!
//! Scan subscriptions are announced again on every open, since the server
//! forgets them when a connection drops.

use tokio::sync::broadcast::error::RecvError;

use scanlink_core::{ChannelError, ChannelNotice, EventChannel};

use crate::cli::WatchArgs;
use crate::commands::Context;
use crate::error::CliError;
use crate::output::{self, Tone};

pub async fn handle(args: WatchArgs, channel: &EventChannel, ctx: &Context) -> Result<(), CliError> {
    // Subscribe before connecting so the first `Opened` is never missed.
    let mut notices = channel.notices();
    channel.connect();
    ctx.status
        .emit(Tone::Info, &format!("Connecting to {}", ctx.endpoint));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0usize;
    // Error notices precede `Failed`; status snapshots may lag behind.
    let mut last_error = None;
    loop {
        let notice = tokio::select! {
            _ = &mut ctrl_c => {
                tracing::debug!("Interrupted");
                return Ok(());
            }
            notice = notices.recv() => notice,
        };

        match notice {
            Ok(ChannelNotice::Opened { channel: id }) => {
                ctx.status
                    .emit(Tone::Good, &format!("Connected ({id})"));
                for scan in &args.scans {
                    channel.subscribe(scan.as_str());
                }
            }
            Ok(ChannelNotice::Closed {
                clean,
                suspended,
                code,
                reason,
                ..
            }) => {
                let how = if suspended {
                    "suspended"
                } else if clean {
                    "closed"
                } else {
                    "lost"
                };
                ctx.status
                    .emit(Tone::Warn, &format!("Connection {how} (code {code}) {reason}"));
            }
            Ok(ChannelNotice::Event(event)) => {
                if args.kind.as_deref().is_some_and(|kind| !event.is_type(kind)) {
                    continue;
                }
                output::print_output(&output::render_event(ctx.format, &event, ctx.color)?);
                printed += 1;
                if args.count.is_some_and(|count| printed >= count) {
                    return Ok(());
                }
            }
            Ok(ChannelNotice::Error(err)) => {
                tracing::debug!(error = %err, "Channel reported an error");
                last_error = Some(err);
            }
            Ok(ChannelNotice::ReconnectScheduled { attempt, delay }) => {
                ctx.status.emit(
                    Tone::Info,
                    &format!("Reconnecting in {}ms (attempt {attempt})", delay.as_millis()),
                );
            }
            Ok(ChannelNotice::Failed { attempts }) => {
                let source = last_error.unwrap_or(ChannelError::RetriesExhausted { attempts });
                return Err(ctx.failed(source));
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Output fell behind, notices dropped");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}
