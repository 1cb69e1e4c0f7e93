// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use std::time::Duration;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use tailmatch::init::BoxError;
use tailmatch::init::agent::Agent;
use tailmatch::init::args::StartArgs;
use tailmatch::init::config::build_monitor_config;
use tailmatch::init::wait;

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Watch directories and match new log lines
    Start(Box<StartArgs>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "tailmatch")]
#[command(bin_name = "tailmatch")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "TAILMATCH_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version())
        }
        Some(Commands::Start(args)) => {
            let _guard = match setup_logging(&opt.log_format) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("ERROR: failed to setup logging: {}", e);
                    return ExitCode::from(1);
                }
            };

            if let Err(e) = run_agent(args) {
                error!(error = e, "Failed to run tailmatch.");
                return ExitCode::from(1);
            }
        }
        None => {
            // Unreachable while a subcommand is required
            eprintln!("ERROR: must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_agent(args: Box<StartArgs>) -> Result<(), BoxError> {
    let config = build_monitor_config(&args)?;
    let shutdown_timeout = Duration::from_secs(args.shutdown_timeout_secs);

    let mut agent_join_set = JoinSet::new();
    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        let agent = Agent::new(config, shutdown_timeout);
        agent_join_set.spawn(async move { agent.run(token).await });
    }

    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        _ = sig_int.recv() => {
            info!("Interrupt received, shutting down.");
            cancel_token.cancel();
        },
        e = wait::wait_for_any_task(&mut agent_join_set) => {
            match e {
                Ok(()) => warn!("Unexpected early exit of agent."),
                Err(e) => return Err(e),
            }
        },
    }

    // The agent enforces its own, shorter, timeouts per stage
    wait::wait_for_tasks_with_timeout(&mut agent_join_set, shutdown_timeout * 3).await?;

    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("notify=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let stdout_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(stdout_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}
