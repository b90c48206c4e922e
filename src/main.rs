//! Ancile - Website Security Compliance Auditor
//!
//! Batch-audits websites against a fixed compliance checklist: transport
//! security, vulnerable component versions, information exposure, and
//! security response headers.

mod app;
mod engine;
mod error;
mod http;
mod input;
mod probe;
mod render;
mod reporting;

pub use error::*;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::{App, Config};

/// Website Security Compliance Auditor
#[derive(Parser, Debug)]
#[command(name = "ancile")]
#[command(author, version, about = "Website Security Compliance Auditor", long_about = None)]
struct Cli {
    /// Target list CSV (url,site_name,priority,notes)
    #[arg(short, long, env = "ANCILE_INPUT")]
    input: Option<PathBuf>,

    /// Audit a single URL instead of an input file
    #[arg(short, long, conflicts_with = "input")]
    target: Option<String>,

    /// Directory for emitted reports
    #[arg(short, long, default_value = "results", env = "ANCILE_OUTPUT")]
    output: PathBuf,

    /// Configuration file path
    #[arg(short, long, env = "ANCILE_CONFIG")]
    config: Option<String>,

    /// Override the configured target concurrency
    #[arg(long, env = "ANCILE_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ANCILE_LOG_LEVEL")]
    log_level: String,

    /// Log file path (enables file logging)
    #[arg(long, env = "ANCILE_LOG_FILE")]
    log_file: Option<String>,

    /// Enable JSON structured logging
    #[arg(long, env = "ANCILE_LOG_JSON")]
    log_json: bool,

    /// Generate default configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls ring crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let cli = Cli::parse();

    if cli.generate_config {
        return generate_default_config(&cli);
    }

    init_logging(&cli)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting ancile");

    let config = load_config(&cli)?;

    if cli.validate_config {
        tracing::info!("Configuration is valid");
        println!("Configuration is valid");
        return Ok(());
    }

    let app = App::new(config, cli.output.clone());

    let result = match (&cli.target, &cli.input) {
        (Some(url), _) => app.run_single(url).await?,
        (None, Some(path)) => app.run_batch(path).await?,
        (None, None) => {
            anyhow::bail!("either --input <CSV> or --target <URL> is required");
        }
    };

    app.print_summary(&result);

    Ok(())
}

/// Initialize the logging system
fn init_logging(cli: &Cli) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = &cli.log_file {
        let file_appender = if log_path.contains('/') || log_path.contains('\\') {
            let path = std::path::Path::new(log_path);
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("ancile.log");
            RollingFileAppender::new(Rotation::DAILY, dir, filename)
        } else {
            let log_dir = Config::data_dir()
                .map(|d| d.join("logs"))
                .unwrap_or_else(|_| PathBuf::from("."));
            std::fs::create_dir_all(&log_dir).ok();
            RollingFileAppender::new(Rotation::DAILY, log_dir, log_path)
        };

        if cli.log_json {
            let file_layer = fmt::layer().json().with_writer(file_appender).with_ansi(false);
            subscriber.with(file_layer).init();
        } else {
            let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
            subscriber.with(file_layer).init();
        }
    } else if cli.log_json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        // Console progress goes to stdout; logs keep to stderr.
        subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    Ok(())
}

/// Load configuration with CLI overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(concurrency) = cli.concurrency {
        config.scanner.max_concurrent_targets = concurrency;
    }

    validate_config(&config)?;

    Ok(config)
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.scanner.max_concurrent_targets == 0 {
        anyhow::bail!("scanner.max_concurrent_targets must be greater than 0");
    }

    if config.scanner.request_timeout == 0 {
        anyhow::bail!("scanner.request_timeout must be greater than 0");
    }

    if config.scanner.target_timeout < config.scanner.probe_timeout {
        anyhow::bail!("scanner.target_timeout must not be below scanner.probe_timeout");
    }

    match config.scanner.renderer.as_str() {
        "http" | "chrome" => {}
        other => anyhow::bail!("scanner.renderer must be \"http\" or \"chrome\", got {:?}", other),
    }

    if config.policy.jquery_min_version.is_empty() {
        anyhow::bail!("policy.jquery_min_version must not be empty");
    }

    for version in &config.policy.legacy_tls_versions {
        if crate::probe::transport::TlsVersion::from_policy_name(version).is_none() {
            anyhow::bail!("policy.legacy_tls_versions contains unknown version {:?}", version);
        }
    }

    Ok(())
}

/// Generate default configuration file
fn generate_default_config(cli: &Cli) -> Result<()> {
    let config = Config::default();
    config
        .save(cli.config.as_deref())
        .context("Failed to write default configuration")?;
    println!("Default configuration written");
    Ok(())
}
