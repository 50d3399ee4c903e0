//! obdwatchd - OBD-II vehicle monitoring daemon
//!
//! Polls a vehicle over its diagnostic adapter and forwards telemetry and
//! trouble codes to the configured report sink.
//!
//! Usage:
//!   obdwatchd [--config <path>] [run]
//!   obdwatchd classify <CODE>...
//!   obdwatchd clear-dtcs [--config <path>]
//!   obdwatchd check-config [--config <path>]
//!
//! Without a config file the daemon polls the scripted demo vehicle and
//! logs every report.

mod config;
mod device;
mod sinks;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use obdwatch_core::{classify, Classification, Reporter};
use obdwatch_obd::{create_link_factory, PollOrchestrator};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::{DaemonConfig, DEFAULT_CONFIG_PATH};
use crate::device::{device_tags, HostIdentity};

#[derive(Parser)]
#[command(name = "obdwatchd")]
#[command(author, version, about = "OBD-II vehicle monitoring daemon")]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (TOML); missing file means built-in defaults
    #[arg(short, long, env = "OBDWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poll loop until interrupted (default)
    Run,

    /// Classify trouble codes and print one JSON object per code
    Classify {
        #[arg(required = true, value_name = "CODE")]
        codes: Vec<String>,
    },

    /// Connect once and clear stored trouble codes
    ClearDtcs,

    /// Validate the config file and print the resolved configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Classify { codes } => classify_codes(&codes),
        Commands::CheckConfig => {
            let config = load_config(&config_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run => {
            let config = load_config(&config_path)?;
            init_tracing(&config);
            log_config_source(&config_path);
            run(config).await
        }
        Commands::ClearDtcs => {
            let config = load_config(&config_path)?;
            init_tracing(&config);
            log_config_source(&config_path);
            clear_dtcs(config).await
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<DaemonConfig> {
    DaemonConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()))
}

fn init_tracing(config: &DaemonConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(log_layer(std::io::stderr, std::io::stderr().is_terminal()))
        .init();
}

/// Human-readable log output; stdout stays free for the `jsonl` sink
fn log_layer<S, W>(make_writer: W, ansi: bool) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_writer(make_writer)
        .with_ansi(ansi)
}

fn log_config_source(path: &Path) {
    if path.exists() {
        tracing::info!(path = %path.display(), "Loaded config");
    } else {
        tracing::info!(
            path = %path.display(),
            "No config file, using defaults (demo vehicle)"
        );
    }
}

/// Build the orchestrator for `config`, with device tags on every report
async fn build_orchestrator(config: &DaemonConfig) -> anyhow::Result<PollOrchestrator> {
    let sink = sinks::create_sink(&config.sink)
        .await
        .context("Failed to open report sink")?;

    let mut reporter = Reporter::new(sink);
    for (key, value) in device_tags(&HostIdentity::detect(), &config.device) {
        reporter = reporter.with_tag(key, value);
    }
    if let Some(mac) = &config.adapter_mac {
        reporter = reporter.with_tag("adapter.mac", mac.as_str());
    }

    let factory = create_link_factory(&config.link).context("Failed to create link")?;
    Ok(PollOrchestrator::new(
        factory,
        config.poll.clone(),
        config.connection.clone(),
        reporter,
    ))
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        adapter_mac = config.adapter_mac.as_deref().unwrap_or("unset"),
        port = config.connection.port.as_deref().unwrap_or("auto"),
        "Starting obdwatchd"
    );

    let mut orchestrator = build_orchestrator(&config).await?;
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    orchestrator.run(cancel).await;
    tracing::info!("obdwatchd stopped");
    Ok(())
}

async fn clear_dtcs(config: DaemonConfig) -> anyhow::Result<()> {
    let mut orchestrator = build_orchestrator(&config).await?;
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = orchestrator.clear_faults(&cancel).await;
    orchestrator.shutdown().await;

    if result.context("Failed to clear trouble codes")? {
        println!("Trouble codes cleared");
    } else {
        println!("Vehicle did not acknowledge the clear request");
    }
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutting down...");
    token.cancel();
}

#[derive(Serialize)]
struct ClassifiedCode<'a> {
    code: &'a str,
    #[serde(flatten)]
    classification: Classification,
    level: &'static str,
}

impl<'a> ClassifiedCode<'a> {
    fn new(code: &'a str) -> Self {
        let classification = classify(code);
        Self {
            code: code.trim(),
            classification,
            level: classification.report_level().as_str(),
        }
    }
}

fn classify_codes(codes: &[String]) -> anyhow::Result<()> {
    for code in codes {
        println!("{}", serde_json::to_string(&ClassifiedCode::new(code))?);
    }
    Ok(())
}
