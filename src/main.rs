// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Microclimate: urban micro-climate readings from public webcams
//!
//! Fetches webcam images on a fixed cycle, estimates sun, shadow and wetness
//! for each, and streams the readings to WebSocket subscribers.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use microclimate::analysis;
use microclimate::config::AppConfig;
use microclimate::pipeline::{Pipeline, TestFetchOutcome};
use microclimate::web;

/// Microclimate CLI - urban micro-climate map backend
#[derive(Parser, Debug)]
#[command(name = "microclimate")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Sun, shadow and wetness readings from public webcams", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "microclimate.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Settings that can also come from the environment
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Address to bind the API server to
    #[arg(long, env = "API_HOST", global = true)]
    host: Option<String>,

    /// Port for the API server
    #[arg(long, env = "API_PORT", global = true)]
    port: Option<u16>,

    /// Seconds between fetch cycles
    #[arg(long, env = "FETCH_INTERVAL_SECONDS", global = true)]
    interval: Option<u64>,

    /// Per-image fetch timeout in seconds
    #[arg(long, env = "IMAGE_TIMEOUT_SECONDS", global = true)]
    timeout: Option<u64>,
}

impl Overrides {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(interval) = self.interval {
            config.fetch.interval_secs = interval;
        }
        if let Some(timeout) = self.timeout {
            config.fetch.timeout_secs = timeout;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the fetch scheduler and the API server (default)
    Serve,

    /// Classify a local image file
    Analyze {
        /// Image to analyze
        path: PathBuf,

        /// Output format
        #[arg(long, default_value = "json", value_parser = ["text", "json"])]
        format: String,
    },

    /// Fetch one configured source once and report the outcome
    Probe {
        /// Source id from the configuration
        source_id: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "microclimate.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("Microclimate v{}", env!("CARGO_PKG_VERSION"));
    }

    // Load configuration
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    cli.overrides.apply(&mut config);
    config.validate()?;

    match cli.command {
        Some(Commands::Serve) | None => run_serve(config).await,
        Some(Commands::Analyze { path, format }) => run_analyze(&path, &format).await,
        Some(Commands::Probe { source_id }) => run_probe(config, &source_id).await,
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
    }
}

/// Run the scheduler and API server until Ctrl+C or SIGTERM
async fn run_serve(config: AppConfig) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(&config).context("failed to build pipeline")?);
    info!(
        "Monitoring {} sources every {}s",
        config.enabled_sources().count(),
        config.fetch.interval_secs
    );

    let scheduler = pipeline.scheduler().start();

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let server_token = shutdown.clone();
    let served = web::start_server(&config.server, Arc::clone(&pipeline), async move {
        server_token.cancelled().await;
    })
    .await;

    scheduler.stop().await;

    served.context("API server failed")?;
    info!("Microclimate stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Classify a single local image
async fn run_analyze(path: &Path, format: &str) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let source_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("local")
        .to_string();

    let result = analysis::classify(&bytes, &source_id, Utc::now())
        .with_context(|| format!("failed to analyze {}", path.display()))?;

    match format {
        "text" => {
            println!("{}:", path.display());
            println!("  Sun exposure:    {:.3}", result.sun_exposure);
            println!("  Shadow exposure: {:.3}", result.shadow_exposure);
            println!("  Wetness score:   {:.3}", result.wetness_score);
            println!("  Brightness:      {:.3}", result.brightness);
        }
        _ => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    Ok(())
}

/// Fetch one source once
async fn run_probe(config: AppConfig, source_id: &str) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(&config)?;

    match pipeline.test_fetch(source_id).await? {
        TestFetchOutcome::Success { image_size } => {
            println!("{}: fetched {} bytes", source_id, image_size);
        }
        TestFetchOutcome::Demo => {
            println!("{}: synthetic source, nothing to fetch", source_id);
        }
        TestFetchOutcome::Failure { reason, message } => {
            warn!("Probe of {} failed", source_id);
            bail!("{}: {} ({})", source_id, message, reason);
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output, force } => {
            if output.exists() && !force {
                bail!("{} already exists. Use --force to overwrite", output.display());
            }
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            println!("Configuration at {:?} is valid", config_path);
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Interval: {}s, timeout: {}s", config.fetch.interval_secs, config.fetch.timeout_secs);
            println!(
                "  Sources: {} configured, {} enabled",
                config.sources.len(),
                config.enabled_sources().count()
            );
        }
    }

    Ok(())
}
