mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use scanlink_core::{Environment, EventChannel};

use crate::cli::{Cli, Command};
use crate::commands::Context;
use crate::error::CliError;
use crate::output::StatusLine;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands never open a channel
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "scanlink", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = config::load_config()?;
            let session = config::resolve_session(&cli.global, &cfg)?;
            let color = output::should_color(config::color_mode(&cli.global, &cfg));
            let ctx = Context {
                format: config::output_format(&cli.global, &cfg),
                color,
                status: StatusLine {
                    quiet: cli.global.quiet,
                    color,
                },
                timeout: std::time::Duration::from_secs(cli.global.timeout),
                endpoint: session.endpoint.clone(),
            };

            let env = Environment::new(session.origin);
            let channel = EventChannel::spawn(session.client, &env);

            tracing::debug!(command = ?cmd, profile = %session.profile, "dispatching command");
            let result = commands::dispatch(cmd, &channel, &ctx).await;
            channel.shutdown().await;
            result
        }
    }
}
