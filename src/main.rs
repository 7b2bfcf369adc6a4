//! Command-line interface for kafkabeat
//!
//! # Usage Examples
//!
//! ```bash
//! # Consume and publish until Ctrl+C / SIGTERM
//! kafkabeat run --config /etc/kafkabeat/kafkabeat.yml
//!
//! # Override the worker count from the config file
//! kafkabeat run --config kafkabeat.toml --workers 8
//!
//! # Validate the configuration without connecting to Kafka
//! kafkabeat check --config kafkabeat.yml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use kafkabeat::{run_beat, Config, OutputConfig, Settings};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kafkabeat")]
#[command(about = "Consume Kafka topics and publish every record as an event")]
#[command(long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", env = "KAFKABEAT_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the consume, decode and publish pipeline
    Run {
        /// Path to the YAML or TOML config file
        #[arg(long, short, default_value = "kafkabeat.yml", env = "KAFKABEAT_CONFIG")]
        config: PathBuf,

        /// Override `channel_workers` from the config file
        #[arg(long)]
        workers: Option<i64>,
    },
    /// Validate the config file and print the effective settings
    Check {
        /// Path to the YAML or TOML config file
        #[arg(long, short, default_value = "kafkabeat.yml", env = "KAFKABEAT_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { config, workers } => {
            let mut raw = load_config(&config)?;
            if let Some(workers) = workers {
                raw.channel_workers = workers;
            }
            let settings = raw.validate()?;

            let shutdown = CancellationToken::new();
            tokio::spawn(watch_signals(shutdown.clone()));

            let report = run_beat(settings, shutdown).await?;
            info!(
                "kafkabeat stopped: {} messages received, {} events written",
                report.workers.received, report.publisher.written
            );
        }
        Commands::Check { config } => {
            let settings = load_config(&config)?.validate()?;
            print_settings(&config, &settings);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn print_settings(path: &Path, settings: &Settings) {
    let consumer = &settings.consumer;
    let publisher = &settings.publisher;
    let output = match &settings.output {
        OutputConfig::Stdout => "stdout".to_string(),
        OutputConfig::File { path } => format!("file ({})", path.display()),
    };

    println!("Configuration {} is valid", path.display());
    println!("  brokers:             {}", consumer.brokers.join(", "));
    println!("  topics:              {}", consumer.topics.join(", "));
    println!("  client_id:           {}", consumer.client_id);
    println!("  group:               {}", consumer.group_id);
    println!("  offset:              {}", consumer.initial_offset);
    println!("  version:             {}", consumer.version);
    println!("  channel_buffer_size: {}", consumer.channel_buffer_size);
    println!("  commit_interval:     {:?}", consumer.commit_interval);
    println!("  codec:               {}", settings.codec);
    println!("  publish_mode:        {}", publisher.mode);
    println!("  queue_size:          {}", publisher.queue_size);
    println!("  bulk_max_size:       {}", publisher.bulk_max_size);
    println!("  channel_workers:     {}", settings.workers);
    println!("  output:              {output}");
}

/// Cancel `shutdown` on Ctrl+C, or on SIGTERM where available.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = terminate.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {e}");
                if !wait_for_ctrl_c().await {
                    return;
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if !wait_for_ctrl_c().await {
            return;
        }
    }

    shutdown.cancel();
}

async fn wait_for_ctrl_c() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down");
            true
        }
        Err(e) => {
            warn!("Cannot listen for Ctrl+C: {e}");
            false
        }
    }
}
