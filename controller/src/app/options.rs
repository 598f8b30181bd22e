//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::compose::gateway::{ComposeBinary, GatewayOptions};
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Server configuration
    pub server: ServerOptions,

    /// Compose project configuration
    pub compose: ComposeOptions,

    /// Runtime command deadlines
    pub gateway: GatewayOptions,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            compose: ComposeOptions::default(),
            gateway: GatewayOptions::default(),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            compose: ComposeOptions {
                compose_file: settings.compose.compose_file.clone(),
                env_file: settings.compose.env_file.clone(),
                project_name: settings.compose.project_name.clone(),
                binary: settings.compose.binary,
            },
            gateway: GatewayOptions {
                probe_timeout: Duration::from_secs(settings.gateway.probe_timeout_secs),
                operation_timeout: Duration::from_secs(settings.gateway.operation_timeout_secs),
                compose_timeout: Duration::from_secs(settings.gateway.compose_timeout_secs),
            },
            max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
        }
    }
}

/// Compose project options
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Compose file describing the stack
    pub compose_file: PathBuf,

    /// Env file the stack reads its variables from
    pub env_file: PathBuf,

    /// Project name override; derived from the compose file when unset
    pub project_name: Option<String>,

    /// Compose front-end to invoke
    pub binary: ComposeBinary,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            compose_file: PathBuf::from("data/compose.yaml"),
            env_file: PathBuf::from("data/.env"),
            project_name: None,
            binary: ComposeBinary::default(),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}
