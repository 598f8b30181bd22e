//! Compose gateway
//!
//! Translates deployment operations into calls against the container runtime.
//! The gateway holds configuration only; every call observes the runtime live.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const LOG_BUFFER: usize = 256;

/// Log lines of a container as they are written, ending with an error if
/// the runtime stops following the log abnormally
pub type LogStream = mpsc::Receiver<Result<String, GatewayError>>;

/// Errors returned by the container runtime adapter
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The runtime binary or daemon cannot be reached
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// The command ran and exited unsuccessfully
    #[error("`{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The command did not finish within its deadline
    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    /// The command output could not be understood
    #[error("unexpected runtime output: {0}")]
    Parse(String),
}

/// Single-container action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }

    /// Whether `status` satisfies the post-condition of this action
    pub fn is_satisfied_by(&self, status: &ContainerStatus) -> bool {
        match self {
            ContainerAction::Start | ContainerAction::Restart => status.state.is_running(),
            ContainerAction::Stop => !status.state.is_running(),
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ContainerAction::Start),
            "stop" => Ok(ContainerAction::Stop),
            "restart" => Ok(ContainerAction::Restart),
            other => Err(format!(
                "invalid action '{}', expected one of: start, stop, restart",
                other
            )),
        }
    }
}

/// Container runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    NotCreated,
    Unknown,
}

impl ContainerState {
    pub fn from_docker(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Removing => "removing",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
            ContainerState::NotCreated => "not created",
            ContainerState::Unknown => "unknown",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }

    /// Not running and not on its way anywhere
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            ContainerState::Created
                | ContainerState::Exited
                | ContainerState::Dead
                | ContainerState::NotCreated
        )
    }
}

/// Container health check state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn from_docker(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "starting" => Some(HealthState::Starting),
            "healthy" => Some(HealthState::Healthy),
            "unhealthy" => Some(HealthState::Unhealthy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Starting => "starting",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

/// Live status of one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub state: ContainerState,
    pub health: Option<HealthState>,
    pub started_at: Option<String>,
}

impl ContainerStatus {
    pub fn new(state: ContainerState) -> Self {
        Self {
            state,
            health: None,
            started_at: None,
        }
    }

    pub fn not_created() -> Self {
        Self::new(ContainerState::NotCreated)
    }

    /// Running, and healthy if a health check is defined
    pub fn is_up(&self) -> bool {
        self.state.is_running()
            && !matches!(
                self.health,
                Some(HealthState::Starting) | Some(HealthState::Unhealthy)
            )
    }
}

/// Status of a compose service's container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service: String,
    pub container: String,
    pub status: ContainerStatus,
}

/// What a `down` removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownReport {
    pub removed_containers: Vec<String>,
    pub removed_volumes: Vec<String>,
}

/// Adapter over the container runtime's compose primitives
#[async_trait]
pub trait ComposeGateway: Send + Sync {
    /// Quick reachability check of the runtime daemon
    async fn ensure_available(&self) -> Result<(), GatewayError>;

    /// Create and start every service (`up -d`)
    async fn up(&self) -> Result<(), GatewayError>;

    /// Stop and remove the project's containers, and its volumes when asked
    async fn down(&self, remove_volumes: bool) -> Result<DownReport, GatewayError>;

    /// Force-recreate the given services; an empty list recreates the whole stack
    async fn recreate(&self, services: &[String]) -> Result<(), GatewayError>;

    /// Status of every existing container of the project
    async fn services_status(&self) -> Result<Vec<ServiceStatus>, GatewayError>;

    /// Apply an action to a single container
    async fn container_action(
        &self,
        container: &str,
        action: ContainerAction,
    ) -> Result<(), GatewayError>;

    /// Live status of a single container
    async fn container_status(&self, container: &str) -> Result<ContainerStatus, GatewayError>;

    /// Follow a container's log from its first line
    ///
    /// Dropping the stream stops following.
    async fn container_logs(&self, container: &str) -> Result<LogStream, GatewayError>;
}

/// Which compose front-end to invoke
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComposeBinary {
    /// `docker compose` plugin
    #[default]
    Docker,
    /// Standalone `docker-compose`
    DockerCompose,
}

/// Gateway deadlines
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Deadline for the availability probe
    pub probe_timeout: Duration,

    /// Deadline for single-container actions and status queries
    pub operation_timeout: Duration,

    /// Deadline for whole-stack compose operations
    pub compose_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(60),
            compose_timeout: Duration::from_secs(600),
        }
    }
}

/// Gateway backed by the docker CLI
#[derive(Debug, Clone)]
pub struct CliGateway {
    binary: ComposeBinary,
    compose_file: PathBuf,
    env_file: PathBuf,
    project_name: String,
    options: GatewayOptions,
}

impl CliGateway {
    pub fn new(
        binary: ComposeBinary,
        compose_file: impl Into<PathBuf>,
        env_file: impl Into<PathBuf>,
        project_name: impl Into<String>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            binary,
            compose_file: compose_file.into(),
            env_file: env_file.into(),
            project_name: project_name.into(),
            options,
        }
    }

    fn compose_command(&self, args: &[&str]) -> (Command, String) {
        let mut cmd = match self.binary {
            ComposeBinary::Docker => {
                let mut cmd = Command::new("docker");
                cmd.arg("compose");
                cmd
            }
            ComposeBinary::DockerCompose => Command::new("docker-compose"),
        };
        cmd.arg("-f")
            .arg(&self.compose_file)
            .arg("--env-file")
            .arg(&self.env_file)
            .arg("-p")
            .arg(&self.project_name)
            .args(args);
        (cmd, format!("compose {}", args.join(" ")))
    }

    fn docker_command(args: &[&str]) -> (Command, String) {
        let mut cmd = Command::new("docker");
        cmd.args(args);
        (cmd, format!("docker {}", args.join(" ")))
    }

    async fn exec(
        &self,
        (mut cmd, label): (Command, String),
        deadline: Duration,
    ) -> Result<String, GatewayError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {}", label);
        let output = match timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(GatewayError::Unavailable(format!(
                    "failed to run {}: {}",
                    label, e
                )))
            }
            Err(_) => {
                return Err(GatewayError::Timeout {
                    command: label,
                    after: deadline,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_daemon_unreachable(&stderr) {
                return Err(GatewayError::Unavailable(stderr));
            }
            return Err(GatewayError::CommandFailed {
                command: label,
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn project_volumes(&self) -> Result<Vec<String>, GatewayError> {
        let filter = format!("label=com.docker.compose.project={}", self.project_name);
        let stdout = self
            .exec(
                Self::docker_command(&["volume", "ls", "-q", "--filter", &filter]),
                self.options.operation_timeout,
            )
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl ComposeGateway for CliGateway {
    async fn ensure_available(&self) -> Result<(), GatewayError> {
        let result = self
            .exec(
                Self::docker_command(&["info", "--format", "{{.ServerVersion}}"]),
                self.options.probe_timeout,
            )
            .await;

        match result {
            Ok(version) => {
                debug!("Docker daemon reachable (server {})", version.trim());
                Ok(())
            }
            Err(GatewayError::Unavailable(msg)) => Err(GatewayError::Unavailable(msg)),
            Err(e) => Err(GatewayError::Unavailable(e.to_string())),
        }
    }

    async fn up(&self) -> Result<(), GatewayError> {
        self.exec(
            self.compose_command(&["up", "-d"]),
            self.options.compose_timeout,
        )
        .await?;
        info!("Compose up completed for project {}", self.project_name);
        Ok(())
    }

    async fn down(&self, remove_volumes: bool) -> Result<DownReport, GatewayError> {
        let removed_containers = self
            .services_status()
            .await?
            .into_iter()
            .map(|s| s.container)
            .collect();
        let removed_volumes = if remove_volumes {
            self.project_volumes().await?
        } else {
            Vec::new()
        };

        let args: &[&str] = if remove_volumes {
            &["down", "-v", "--remove-orphans"]
        } else {
            &["down"]
        };
        self.exec(self.compose_command(args), self.options.compose_timeout)
            .await?;
        info!(
            "Compose down completed for project {} (volumes removed: {})",
            self.project_name, remove_volumes
        );

        Ok(DownReport {
            removed_containers,
            removed_volumes,
        })
    }

    async fn recreate(&self, services: &[String]) -> Result<(), GatewayError> {
        let mut args = vec!["up", "-d", "--force-recreate"];
        if !services.is_empty() {
            args.push("--no-deps");
            args.extend(services.iter().map(String::as_str));
        }
        self.exec(self.compose_command(&args), self.options.compose_timeout)
            .await?;
        Ok(())
    }

    async fn services_status(&self) -> Result<Vec<ServiceStatus>, GatewayError> {
        let stdout = self
            .exec(
                self.compose_command(&["ps", "-a", "--format", "json"]),
                self.options.operation_timeout,
            )
            .await?;
        parse_ps_output(&stdout)
    }

    async fn container_action(
        &self,
        container: &str,
        action: ContainerAction,
    ) -> Result<(), GatewayError> {
        self.exec(
            Self::docker_command(&[action.as_str(), container]),
            self.options.operation_timeout,
        )
        .await?;
        Ok(())
    }

    async fn container_status(&self, container: &str) -> Result<ContainerStatus, GatewayError> {
        let result = self
            .exec(
                Self::docker_command(&["inspect", "--format", "{{json .State}}", container]),
                self.options.operation_timeout,
            )
            .await;

        match result {
            Ok(stdout) => parse_inspect_state(&stdout),
            Err(GatewayError::CommandFailed { stderr, .. }) if is_missing_object(&stderr) => {
                Ok(ContainerStatus::not_created())
            }
            Err(e) => Err(e),
        }
    }

    async fn container_logs(&self, container: &str) -> Result<LogStream, GatewayError> {
        let (mut cmd, label) =
            Self::docker_command(&["logs", "--follow", "--tail", "all", container]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {}", label);
        let mut child = cmd.spawn().map_err(|e| {
            GatewayError::Unavailable(format!("failed to run {}: {}", label, e))
        })?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(GatewayError::Unavailable(format!(
                "{} started without output pipes",
                label
            )));
        };

        let (tx, rx) = mpsc::channel(LOG_BUFFER);
        tokio::spawn(async move {
            let mut stdout = BufReader::new(stdout).lines();
            let mut stderr = BufReader::new(stderr).lines();
            let (mut stdout_open, mut stderr_open) = (true, true);
            let mut last_stderr = String::new();

            while stdout_open || stderr_open {
                let (line, from_stderr) = tokio::select! {
                    line = stdout.next_line(), if stdout_open => (line, false),
                    line = stderr.next_line(), if stderr_open => (line, true),
                    _ = tx.closed() => {
                        debug!("Log reader of {} dropped", label);
                        return;
                    }
                };

                match line {
                    Ok(Some(line)) => {
                        if from_stderr {
                            last_stderr.clone_from(&line);
                        }
                        if tx.send(Ok(line)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) if from_stderr => stderr_open = false,
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GatewayError::Parse(format!(
                                "unreadable output of {}: {}",
                                label, e
                            ))))
                            .await;
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => debug!("{} finished", label),
                Ok(status) => {
                    let err = if is_daemon_unreachable(&last_stderr) {
                        GatewayError::Unavailable(last_stderr)
                    } else {
                        GatewayError::CommandFailed {
                            command: label,
                            code: status.code(),
                            stderr: last_stderr,
                        }
                    };
                    let _ = tx.send(Err(err)).await;
                }
                Err(e) => warn!("Unable to reap {}: {}", label, e),
            }
        });

        Ok(rx)
    }
}

fn is_daemon_unreachable(stderr: &str) -> bool {
    stderr.contains("Cannot connect to the Docker daemon")
        || stderr.contains("Is the docker daemon running")
        || stderr.contains("error during connect")
}

fn is_missing_object(stderr: &str) -> bool {
    stderr.contains("No such object") || stderr.contains("No such container")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    service: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    health: String,
}

impl From<PsEntry> for ServiceStatus {
    fn from(entry: PsEntry) -> Self {
        ServiceStatus {
            service: entry.service,
            container: entry.name,
            status: ContainerStatus {
                state: ContainerState::from_docker(&entry.state),
                health: HealthState::from_docker(&entry.health),
                started_at: None,
            },
        }
    }
}

/// Parse `compose ps --format json`
///
/// Older compose releases print one JSON array, newer ones one object per line.
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ServiceStatus>, GatewayError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| GatewayError::Parse(e.to_string()))?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| GatewayError::Parse(e.to_string())))
            .collect::<Result<_, _>>()?
    };

    Ok(entries.into_iter().map(ServiceStatus::from).collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    #[serde(default)]
    status: String,
}

/// Parse `docker inspect --format '{{json .State}}'`
pub fn parse_inspect_state(stdout: &str) -> Result<ContainerStatus, GatewayError> {
    let state: InspectState =
        serde_json::from_str(stdout.trim()).map_err(|e| GatewayError::Parse(e.to_string()))?;

    Ok(ContainerStatus {
        state: ContainerState::from_docker(&state.status),
        health: state
            .health
            .and_then(|h| HealthState::from_docker(&h.status)),
        started_at: state
            .started_at
            .filter(|s| !s.is_empty() && !s.starts_with("0001-01-01")),
    })
}
