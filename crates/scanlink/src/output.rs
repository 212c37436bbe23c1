//! Output formatting for events and status lines.
//!
//! Events go to stdout in the format selected by `--output`; connection
//! status goes to stderr so it never mixes with piped event data.

use std::io::{self, IsTerminal, Write};

use chrono::{Local, SecondsFormat};
use owo_colors::OwoColorize;
use scanlink_core::ChannelEvent;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Renderers ────────────────────────────────────────────────────────

/// Render one event in the chosen format.
///
/// - `plain`: `<local time> <type> <payload as compact JSON>`
/// - `json` / `json-compact`: the event object exactly as received
pub fn render_event(
    format: OutputFormat,
    event: &ChannelEvent,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => render_json(event, false),
        OutputFormat::JsonCompact => render_json(event, true),
        OutputFormat::Plain => {
            let time = Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
            let payload = render_json(&event.payload, true)?;
            Ok(if color {
                format!("{} {} {payload}", time.dimmed(), event.kind.cyan().bold())
            } else {
                format!("{time} {} {payload}", event.kind)
            })
        }
    }
}

pub fn render_json<T: serde::Serialize + ?Sized>(
    data: &T,
    compact: bool,
) -> Result<String, CliError> {
    let text = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(text)
}

/// Print the rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
    let _ = stdout.flush();
}

// ── Status lines (stderr) ────────────────────────────────────────────

/// Severity of a connection status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Good,
    Info,
    Warn,
}

/// Reports connection lifecycle on stderr unless `--quiet`.
#[derive(Debug, Clone, Copy)]
pub struct StatusLine {
    pub quiet: bool,
    pub color: bool,
}

impl StatusLine {
    pub fn emit(self, tone: Tone, message: &str) {
        if self.quiet {
            return;
        }
        let marker = match tone {
            Tone::Good => "●",
            Tone::Info => "○",
            Tone::Warn => "!",
        };
        if self.color {
            match tone {
                Tone::Good => eprintln!("{} {message}", marker.green()),
                Tone::Info => eprintln!("{} {}", marker.blue(), message.dimmed()),
                Tone::Warn => eprintln!("{} {message}", marker.yellow().bold()),
            }
        } else {
            eprintln!("{marker} {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ChannelEvent {
        ChannelEvent::new("scan_progress")
            .with("scan_id", "scan-42")
            .with("progress", 40)
    }

    #[test]
    fn compact_json_keeps_type_and_payload() {
        let text = render_event(OutputFormat::JsonCompact, &event(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "scan_progress");
        assert_eq!(value["progress"], 40);
        assert!(!text.contains('\n'));
    }

    #[test]
    fn plain_line_has_type_then_payload() {
        let text = render_event(OutputFormat::Plain, &event(), false).unwrap();
        let mut parts = text.splitn(3, ' ');
        let _time = parts.next().unwrap();
        assert_eq!(parts.next(), Some("scan_progress"));
        assert_eq!(
            parts.next(),
            Some(r#"{"progress":40,"scan_id":"scan-42"}"#)
        );
    }
}
