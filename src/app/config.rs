//! Application configuration management
//!
//! The `[policy]` section is versioned data, not code: the legacy-TLS cutoff,
//! leak-signature lists, and sensitive paths are product decisions that ship
//! as configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Scanner settings
    pub scanner: ScannerConfig,

    /// Compliance policy
    pub policy: PolicyConfig,

    /// Reporting settings
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Maximum concurrently in-flight targets
    pub max_concurrent_targets: usize,

    /// Hard wall-clock budget per target in seconds
    pub target_timeout: u64,

    /// Timeout per probe in seconds
    pub probe_timeout: u64,

    /// Timeout per network request/handshake in seconds
    pub request_timeout: u64,

    /// Retry count for transient network errors
    pub retry_count: u32,

    /// Base backoff between retries in milliseconds (doubles per attempt)
    pub retry_backoff_ms: u64,

    /// Maximum redirect depth
    pub max_redirects: usize,

    /// User agent string
    pub user_agent: String,

    /// Page renderer: "http" (fetch + parse) or "chrome" (headless browser)
    pub renderer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Policy revision, echoed into reports
    pub version: String,

    /// Minimum acceptable jQuery version
    pub jquery_min_version: String,

    /// TLS versions that must be refused by the host ("1.0", "1.1")
    pub legacy_tls_versions: Vec<String>,

    /// Minimum Strict-Transport-Security max-age in seconds
    pub hsts_min_max_age: u64,

    /// Content signatures marking a directory-listing surface
    pub directory_listing_signatures: Vec<String>,

    /// Content signatures marking an exposed login surface
    pub login_signatures: Vec<String>,

    /// Content signatures marking a leaked password/secret surface
    pub password_signatures: Vec<String>,

    /// Paths that must not be publicly accessible
    pub sensitive_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Report formats to emit: "json", "csv", "markdown"
    pub formats: Vec<String>,

    /// Base file name for emitted reports
    pub basename: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_targets: 4,
            target_timeout: 120,
            probe_timeout: 30,
            request_timeout: 10,
            retry_count: 2,
            retry_backoff_ms: 500,
            max_redirects: 10,
            user_agent: format!("ancile/{}", env!("CARGO_PKG_VERSION")),
            renderer: "http".to_string(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: "2024.1".to_string(),
            jquery_min_version: "3.5.0".to_string(),
            legacy_tls_versions: vec!["1.0".to_string(), "1.1".to_string()],
            hsts_min_max_age: 31_536_000,
            directory_listing_signatures: vec![
                "index of /".to_string(),
                "parent directory".to_string(),
                "directory listing for".to_string(),
            ],
            login_signatures: vec![
                "type=\"password\"".to_string(),
                "type='password'".to_string(),
                "wp-login".to_string(),
            ],
            password_signatures: vec![
                ".env".to_string(),
                "wp-config".to_string(),
                "database.sql".to_string(),
                "backup.zip".to_string(),
            ],
            sensitive_paths: vec![
                "/.env".to_string(),
                "/.git/config".to_string(),
                "/wp-config.php".to_string(),
                "/phpmyadmin/".to_string(),
                "/backup/".to_string(),
            ],
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            formats: vec![
                "json".to_string(),
                "csv".to_string(),
                "markdown".to_string(),
            ],
            basename: "compliance".to_string(),
        }
    }
}

impl ScannerConfig {
    pub fn target_budget(&self) -> Duration {
        Duration::from_secs(self.target_timeout)
    }

    pub fn probe_budget(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    pub fn request_budget(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;

            let config: Config = toml::from_str(&contents)
                .with_context(|| "Failed to parse configuration file")?;

            tracing::info!("Loaded configuration from {:?}", config_path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)?;

        tracing::info!("Saved configuration to {:?}", config_path);
        Ok(())
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "ancile", "ancile")
            .context("Failed to determine config directory")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get data directory path (log files land here)
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "ancile", "ancile")
            .context("Failed to determine data directory")?;

        Ok(dirs.data_dir().to_path_buf())
    }
}
