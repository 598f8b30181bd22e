//! Controller API models

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target state a caller may request for the whole deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Running,
    Stopped,
    Restarting,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Running => "running",
            DesiredState::Stopped => "stopped",
            DesiredState::Restarting => "restarting",
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(DesiredState::Running),
            "stopped" => Ok(DesiredState::Stopped),
            "restarting" => Ok(DesiredState::Restarting),
            other => Err(format!(
                "invalid desired_state '{}', expected one of: running, stopped, restarting",
                other
            )),
        }
    }
}

/// Observed state of the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrentState {
    Running,
    Stopped,
    Restarting,
    Transitioning,
}

impl CurrentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrentState::Running => "running",
            CurrentState::Stopped => "stopped",
            CurrentState::Restarting => "restarting",
            CurrentState::Transitioning => "transitioning",
        }
    }
}

impl fmt::Display for CurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static deployment description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub changelog: String,
    pub documentation_url: Option<String>,
}

/// Outcome of a transition's backend sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionResult {
    Pending,
    Succeeded,
    Failed,
}

/// Latest accepted transition and how it ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionReport {
    pub transition_id: Uuid,
    pub desired_state: DesiredState,
    pub result: TransitionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Deployment status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfoResponse {
    pub metadata: DeploymentMetadata,
    pub current_state: CurrentState,
    pub desired_state: DesiredState,
    pub last_state_change: Option<DateTime<Utc>>,
    /// Absent until a transition is accepted, and again after removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<TransitionReport>,
}

/// Deployment transition request
///
/// `desired_state` stays a plain string so that unknown values surface as an
/// invalid state rather than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTransitionRequest {
    pub desired_state: String,
}

/// Deployment transition response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTransitionResponse {
    pub success: bool,
    pub desired_state: DesiredState,
    pub current_state: CurrentState,
    pub transitioning: bool,
    pub message: String,
    pub transition_id: Uuid,
}

/// Deployment removal response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDeleteResponse {
    pub success: bool,
    pub message: String,
    pub removed_containers: Vec<String>,
    pub removed_volumes: Vec<String>,
}

/// Ping response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub success: bool,
    pub message: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Environment variable with its schema information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVariable {
    pub name: String,
    pub value: String,
    pub description: String,
    pub default: Option<String>,
    #[serde(rename = "type")]
    pub var_type: String,
    pub advanced: bool,
}

/// Environment variable list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVariablesResponse {
    pub variables: Vec<EnvVariable>,
}

/// Bulk environment update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkEnvUpdateRequest {
    pub variables: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub recreate_services: bool,
}

fn default_true() -> bool {
    true
}

/// Bulk environment update response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvUpdateResponse {
    pub message: String,
    /// Names whose value changed, in ascending key order
    pub updated: Vec<String>,
}

/// Container information with live status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub container_name: String,
    pub image: String,
    pub status: String,
    pub health: Option<String>,
    pub started_at: Option<String>,
    pub ports: Vec<String>,
    pub depends_on: Vec<String>,
}

/// Container list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainersInfoResponse {
    pub containers: Vec<ContainerInfo>,
}

/// Container control request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerControlRequest {
    pub action: String,
}

/// Container control response carrying the verified status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerControlResponse {
    pub success: bool,
    pub container: String,
    pub action: String,
    pub status: ContainerInfo,
    pub message: String,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
