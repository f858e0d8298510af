//! Configuration module for fafgear-exporter.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the exporter
#[derive(Parser, Debug)]
#[command(name = "fafgear-exporter")]
#[command(author = "fafgear-exporter authors")]
#[command(version = "0.1.0")]
#[command(about = "Exports gear server status as Prometheus metrics", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on for telemetry (e.g., 0.0.0.0:9101 or :9101)
    #[arg(long = "web.listen-address")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path")]
    pub telemetry_path: Option<String>,

    /// Address from where to collect statistics
    #[arg(long = "metric.fetch-address")]
    pub fetch_address: Option<String>,

    /// Deadline for one status exchange in milliseconds
    #[arg(long = "metric.fetch-timeout")]
    pub fetch_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP exposition configuration
#[derive(Debug, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            telemetry_path: default_telemetry_path(),
        }
    }
}

/// Status server to scrape
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_fetch_address")]
    pub address: String,
    /// Deadline for one status exchange in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: default_fetch_address(),
            timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:9101".to_string()
}

fn default_telemetry_path() -> String {
    "/metrics".to_string()
}

fn default_fetch_address() -> String {
    "127.0.0.1:1370".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_address: String,
    pub telemetry_path: String,
    pub fetch_address: String,
    pub fetch_timeout: Duration,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let telemetry_path = cli
            .telemetry_path
            .unwrap_or(toml_config.web.telemetry_path);
        if !telemetry_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "telemetry path must start with '/': {telemetry_path}"
            )));
        }

        let timeout_ms = cli
            .fetch_timeout_ms
            .unwrap_or(toml_config.target.timeout_ms);
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            listen_address: normalize_listen_address(
                cli.listen_address
                    .unwrap_or(toml_config.web.listen_address),
            ),
            telemetry_path,
            fetch_address: cli.fetch_address.unwrap_or(toml_config.target.address),
            fetch_timeout: Duration::from_millis(timeout_ms),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Expand a host-less `:port` address to the IPv4 wildcard.
fn normalize_listen_address(address: String) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
