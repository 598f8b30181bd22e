//! Settings file management
//!
//! Settings come from defaults, an optional JSON file, the environment and
//! command line flags, each layer overriding the previous one.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compose::gateway::ComposeBinary;
use crate::errors::ControllerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Compose project configuration
    #[serde(default)]
    pub compose: ComposeSettings,

    /// Runtime command deadlines
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Maximum graceful shutdown delay in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            compose: ComposeSettings::default(),
            gateway: GatewaySettings::default(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file, or defaults when no file is given
    pub async fn load(path: Option<PathBuf>) -> Result<Self, ControllerError> {
        match path {
            Some(path) => File::new(path).read_json().await,
            None => Ok(Self::default()),
        }
    }

    /// Override with environment variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("COMPOSE_FILE") {
            self.compose.compose_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("ENV_FILE") {
            self.compose.env_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("API_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("API_PORT") {
            self.server.port = parse_port(&v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v.parse().map_err(ControllerError::ConfigError)?;
        }
        Ok(())
    }

    /// Override with `--key=value` command line flags
    pub fn apply_cli(&mut self, args: &HashMap<String, String>) -> Result<(), ControllerError> {
        if let Some(v) = args.get("compose-file") {
            self.compose.compose_file = PathBuf::from(v);
        }
        if let Some(v) = args.get("env-file") {
            self.compose.env_file = PathBuf::from(v);
        }
        if let Some(v) = args.get("host") {
            self.server.host = v.clone();
        }
        if let Some(v) = args.get("port") {
            self.server.port = parse_port(v)?;
        }
        if let Some(v) = args.get("log-level") {
            self.log_level = v.parse().map_err(ControllerError::ConfigError)?;
        }
        Ok(())
    }
}

fn parse_port(value: &str) -> Result<u16, ControllerError> {
    value
        .parse()
        .map_err(|_| ControllerError::ConfigError(format!("Invalid port: {}", value)))
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Compose project settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeSettings {
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    /// Project name override
    #[serde(default)]
    pub project_name: Option<String>,

    #[serde(default)]
    pub binary: ComposeBinary,
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("data/compose.yaml")
}

fn default_env_file() -> PathBuf {
    PathBuf::from("data/.env")
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            compose_file: default_compose_file(),
            env_file: default_env_file(),
            project_name: None,
            binary: ComposeBinary::default(),
        }
    }
}

/// Runtime command deadlines in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Deadline for whole-stack `up`, `down` and recreation
    #[serde(default = "default_compose_timeout")]
    pub compose_timeout_secs: u64,
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_operation_timeout() -> u64 {
    60
}

fn default_compose_timeout() -> u64 {
    600
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            compose_timeout_secs: default_compose_timeout(),
        }
    }
}
