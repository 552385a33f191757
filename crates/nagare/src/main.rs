//! nagare binary entry point.
//!
//! Usage: nagare [--channel <name>] [--config <path>]
//!
//! Exits with 1 when no channels are configured, when the selected channel
//! does not exist, or on a fatal store error. Ctrl-C stops the listener
//! between messages and exits with 0.

use clap::Parser;
use nagare::{app, HandlerRegistry, NagareConfig, NagareResult};
use nagare::paths::Paths;
use nagare::sink::OUTCOME_TARGET;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::broadcast;
use tracing::{error, info};

/// nagare: checkpointed Redis Streams listener.
#[derive(Parser, Debug)]
#[command(name = "nagare")]
#[command(about = "Run the stream listener for the configured channels")]
struct Args {
    /// Only consume this configured channel.
    #[arg(long)]
    channel: Option<String>,

    /// Path to the JSON configuration file.
    /// Defaults to ~/.nagare/config.json.
    #[arg(long, env = "NAGARE_CONFIG")]
    config: Option<PathBuf>,

    /// Redis URL for the selected connection (overrides the config file).
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Also write tracing output as JSONL. Without a path the file is
    /// ~/.nagare/logs/nagare.jsonl.
    #[arg(long, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,
}

fn log_path(args: &Args) -> NagareResult<Option<PathBuf>> {
    match &args.log_file {
        None => Ok(None),
        Some(Some(path)) => Ok(Some(path.clone())),
        Some(None) => Ok(Some(Paths::new()?.log_file())),
    }
}

fn load_config(args: &Args) -> NagareResult<NagareConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = NagareConfig::load_from_file(path)?;
            config.load_from_env();
            config
        }
        None => NagareConfig::load(&Paths::new()?)?,
    };

    if let Some(url) = &args.redis_url {
        config.override_redis_url(url.clone());
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("nagare: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_path = match log_path(&args) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("nagare: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = observability::init_with_config(observability::LogConfig {
        service_name: "nagare".into(),
        default_level: config.log_level.clone(),
        log_path,
        also_stderr: true,
        file_only_targets: vec![OUTCOME_TARGET.to_string()],
    }) {
        eprintln!("nagare: failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        channel = ?args.channel,
        channels = config.channels.len(),
        "nagare starting..."
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(app::forward_signal(tokio::signal::ctrl_c(), shutdown_tx));

    let registry = HandlerRegistry::with_builtins();

    match app::run_listener(&config, &registry, args.channel.clone(), shutdown_rx).await {
        Ok(exit) => {
            info!(?exit, "Listener stopped");
            ExitCode::from(exit.exit_code() as u8)
        }
        Err(e) => {
            error!(error = %e, "Listener exited with error");
            ExitCode::FAILURE
        }
    }
}
