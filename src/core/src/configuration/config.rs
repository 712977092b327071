use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::{debug, info};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 7860;
pub const DEFAULT_INPUT_DIR: &str = "temp_inputs";
pub const DEFAULT_PUBLIC_DIR: &str = "served_outputs";
pub const DEFAULT_SIMULATION_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_SAMPLES: u32 = 16;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 32 * 1024 * 1024;
pub const PUBLIC_BASE_URL_ENV: &str = "PUBLIC_API_URL";

/// Ten years, far beyond any sensible retention and safely inside chrono's range.
const MAX_RETENTION_SECS: u64 = 10 * 365 * 86_400;

/// Application configuration, built once at start-up and shared read-only.
///
/// The configuration is read either from the command line (with environment
/// fallbacks for the deployment-specific values) or, when `--config <FILE>`
/// is given, from a TOML file. It replaces every piece of module-level state
/// the gateway would otherwise need: directory roots, the simulation switch,
/// the public base URL and the collaborator invocation.
///
/// # Fields Overview
///
/// - `bind_address`/`port`: where the HTTP server listens
/// - `input_dir`: scratch root for uploaded images
/// - `public_dir`: root served under `/served_outputs`, one directory per session
/// - `public_base_url`: base for result URLs; derived from the request when unset
/// - `simulate`: generate placeholder images instead of running the collaborator
/// - `collaborator`: how the external synthesis program is started
/// - `retention`: lifecycle of scratch files and session directories
#[derive(Parser, Deserialize, Debug, Clone)]
#[command(name = "tryon")]
#[command(version)]
#[command(about = "HTTP gateway for virtual try-on image synthesis")]
#[serde(default)]
pub struct Config {
    /// Read the configuration from a TOML file instead of the command line
    #[arg(long = "config", value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Network address to bind the server to
    #[arg(long, env = "TRYON_BIND_ADDRESS", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind_address: String,

    /// TCP port of the HTTP server
    #[arg(long, env = "TRYON_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Scratch directory for uploaded images
    #[arg(long, default_value = DEFAULT_INPUT_DIR)]
    pub input_dir: PathBuf,

    /// Public root, mounted at `/served_outputs`
    #[arg(long, default_value = DEFAULT_PUBLIC_DIR)]
    pub public_dir: PathBuf,

    /// Absolute base URL used for result links, e.g. `https://host:7860`
    #[arg(long, env = PUBLIC_BASE_URL_ENV)]
    pub public_base_url: Option<String>,

    /// Produce placeholder images instead of invoking the collaborator
    #[arg(long, env = "TRYON_SIMULATE", action = clap::ArgAction::SetTrue)]
    pub simulate: bool,

    /// Artificial delay of a simulated run in milliseconds
    #[arg(long, default_value_t = DEFAULT_SIMULATION_DELAY_MS)]
    pub simulation_delay_ms: u64,

    /// Largest `sample` value accepted from a caller
    #[arg(long, default_value_t = DEFAULT_MAX_SAMPLES)]
    pub max_samples: u32,

    /// Largest accepted multipart body in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,

    #[command(flatten)]
    pub collaborator: CollaboratorConfig,

    #[command(flatten)]
    pub retention: RetentionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            public_dir: PathBuf::from(DEFAULT_PUBLIC_DIR),
            public_base_url: None,
            simulate: false,
            simulation_delay_ms: DEFAULT_SIMULATION_DELAY_MS,
            max_samples: DEFAULT_MAX_SAMPLES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            collaborator: CollaboratorConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Config {
    /// Builds the configuration for this process.
    ///
    /// Parses the command line; if it names a configuration file, that file
    /// replaces the command-line values. The result is validated before it is
    /// returned.
    ///
    /// # Panics
    /// Like every `clap` entry point, exits the process with a usage message
    /// when the arguments cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = Config::parse();
        let config = match cli.config_file {
            Some(ref path) => Config::from_file(path)?,
            None => cli,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML configuration file. Missing keys take their defaults and
    /// an unset `public_base_url` falls back to `PUBLIC_API_URL`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Reading configuration file {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let mut config = Config::from_toml_str(&content)?;
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.public_base_url.is_none() {
            if let Ok(url) = std::env::var(PUBLIC_BASE_URL_ENV) {
                debug!("Using {} from environment", PUBLIC_BASE_URL_ENV);
                self.public_base_url = Some(url);
            }
        }
    }

    /// Checks value ranges and mode-specific requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_samples == 0 {
            return Err(ConfigError::NotInRange(
                "max_samples must be at least 1".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::NotInRange(
                "max_upload_bytes must be at least 1".to_string(),
            ));
        }
        if self.retention.retention_secs > MAX_RETENTION_SECS {
            return Err(ConfigError::NotInRange(format!(
                "retention_secs must not exceed {}",
                MAX_RETENTION_SECS
            )));
        }
        if !self.simulate && self.collaborator.program.trim().is_empty() {
            return Err(ConfigError::MissingProgram(
                "collaborator program is required unless simulation is enabled".to_string(),
            ));
        }
        if let Some(ref url) = self.public_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::NotInRange(format!(
                    "public_base_url must be an absolute http(s) URL, got {}",
                    url
                )));
            }
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| {
                ConfigError::NotInRange(format!(
                    "invalid bind address {}:{}: {}",
                    self.bind_address, self.port, e
                ))
            })
    }

    pub fn simulation_delay(&self) -> Duration {
        Duration::from_millis(self.simulation_delay_ms)
    }

    /// Base URL used when the request carries no usable `Host` header.
    pub fn fallback_base_url(&self) -> String {
        let host = match self.bind_address.as_str() {
            "0.0.0.0" | "::" => "localhost",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}
