//! Deployment state machine
//!
//! Records the caller's intent synchronously and converges the backend in a
//! background task. Callers poll [`DeploymentStateMachine::status`] to observe
//! convergence. The outcome of the latest accepted sequence is kept as a
//! [`TransitionReport`], so a failed sequence is distinguishable from one that
//! settled.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use openapi_server::models::{
    CurrentState, DeploymentMetadata, DesiredState, TransitionReport, TransitionResult,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compose::gateway::{ComposeGateway, DownReport, GatewayError};
use crate::compose::topology::ComposeTopology;
use crate::deploy::fsm::{aggregate_state, desired_from_observed, ComposeOp, TransitionPlan};
use crate::errors::ControllerError;

#[derive(Debug)]
struct MachineState {
    current: CurrentState,
    desired: DesiredState,
    last_state_change: Option<DateTime<Utc>>,
    /// Bumped on every accepted transition and on destroy
    generation: u64,
    in_flight: usize,
    last_transition: Option<TransitionReport>,
}

/// Point-in-time view of the deployment
#[derive(Debug, Clone)]
pub struct DeploymentSnapshot {
    pub metadata: DeploymentMetadata,
    pub current_state: CurrentState,
    pub desired_state: DesiredState,
    pub last_state_change: Option<DateTime<Utc>>,
    pub last_transition: Option<TransitionReport>,
}

/// Receipt for an accepted transition
///
/// Dropping `handle` detaches the backend sequence; awaiting it waits for
/// the sequence to finish.
#[derive(Debug)]
pub struct TransitionTicket {
    pub transition_id: Uuid,
    pub desired_state: DesiredState,
    /// Cached state before this request was accepted
    pub previous_state: CurrentState,
    pub accepted_at: DateTime<Utc>,
    pub handle: JoinHandle<()>,
}

pub struct DeploymentStateMachine {
    gateway: Arc<dyn ComposeGateway>,
    services: Arc<Vec<String>>,
    metadata: DeploymentMetadata,
    state: Arc<Mutex<MachineState>>,
}

impl DeploymentStateMachine {
    /// Create a machine that assumes a stopped stack until initialized
    pub fn new(gateway: Arc<dyn ComposeGateway>, topology: &ComposeTopology) -> Self {
        Self {
            gateway,
            services: Arc::new(topology.service_names()),
            metadata: topology.metadata().clone(),
            state: Arc::new(Mutex::new(MachineState {
                current: CurrentState::Stopped,
                desired: DesiredState::Stopped,
                last_state_change: None,
                generation: 0,
                in_flight: 0,
                last_transition: None,
            })),
        }
    }

    /// Seed current and desired state from the live backend
    pub async fn initialize(&self) {
        match self.gateway.services_status().await {
            Ok(statuses) => {
                let observed = aggregate_state(&self.services, &statuses);
                let mut state = self.state.lock().await;
                state.current = observed;
                state.desired = desired_from_observed(observed);
                info!(
                    "Deployment observed as {} at startup (desired {})",
                    state.current, state.desired
                );
            }
            Err(e) => {
                warn!(
                    "Unable to observe deployment at startup, assuming stopped: {}",
                    e
                );
            }
        }
    }

    pub fn metadata(&self) -> &DeploymentMetadata {
        &self.metadata
    }

    /// Last requested target
    pub async fn desired_state(&self) -> DesiredState {
        self.state.lock().await.desired
    }

    /// Cached current state, without querying the backend
    pub async fn cached_state(&self) -> CurrentState {
        self.state.lock().await.current
    }

    /// Accept a desired state and start converging towards it
    ///
    /// Returns once the intent is recorded; never waits for the backend.
    /// A newer request supersedes an older one without cancelling it.
    pub async fn request_transition(
        &self,
        desired: &str,
    ) -> Result<TransitionTicket, ControllerError> {
        let desired: DesiredState = desired.parse().map_err(ControllerError::InvalidState)?;

        if let Err(e) = self.gateway.ensure_available().await {
            warn!("Rejecting transition to {}: {}", desired, e);
            return Err(ControllerError::BackendUnavailable(e.to_string()));
        }

        let transition_id = Uuid::new_v4();
        let accepted_at = Utc::now();
        let (previous_state, generation) = {
            let mut state = self.state.lock().await;
            let previous = state.current;
            state.desired = desired;
            state.last_state_change = Some(accepted_at);
            state.generation += 1;
            state.in_flight += 1;
            state.last_transition = Some(TransitionReport {
                transition_id,
                desired_state: desired,
                result: TransitionResult::Pending,
                error: None,
                finished_at: None,
            });
            (previous, state.generation)
        };

        info!(
            "Accepted transition {} to {} (current {})",
            transition_id, desired, previous_state
        );

        let handle = tokio::spawn(run_transition(
            self.gateway.clone(),
            self.state.clone(),
            self.services.clone(),
            TransitionPlan::for_target(desired),
            generation,
            transition_id,
        ));

        Ok(TransitionTicket {
            transition_id,
            desired_state: desired,
            previous_state,
            accepted_at,
            handle,
        })
    }

    /// Recompute the current state from the backend
    pub async fn status(&self) -> Result<DeploymentSnapshot, ControllerError> {
        let statuses = self.gateway.services_status().await.map_err(|e| {
            error!("Unable to query deployment status: {}", e);
            ControllerError::from(e)
        })?;
        let observed = aggregate_state(&self.services, &statuses);

        let mut state = self.state.lock().await;
        let current_state = if state.in_flight > 0 {
            if state.desired == DesiredState::Restarting {
                CurrentState::Restarting
            } else {
                CurrentState::Transitioning
            }
        } else {
            state.current = observed;
            observed
        };

        Ok(DeploymentSnapshot {
            metadata: self.metadata.clone(),
            current_state,
            desired_state: state.desired,
            last_state_change: state.last_state_change,
            last_transition: state.last_transition.clone(),
        })
    }

    /// Stop every service and remove the project's volumes
    ///
    /// Irreversible, and deliberately not part of the desired-state vocabulary.
    pub async fn destroy(&self) -> Result<DownReport, ControllerError> {
        if let Err(e) = self.gateway.ensure_available().await {
            warn!("Rejecting deployment removal: {}", e);
            return Err(ControllerError::BackendUnavailable(e.to_string()));
        }

        info!("Removing deployment containers and volumes");
        let report = self.gateway.down(true).await.map_err(|e| {
            error!("Failed to remove deployment: {}", e);
            ControllerError::from(e)
        })?;

        let mut state = self.state.lock().await;
        state.desired = DesiredState::Stopped;
        state.current = CurrentState::Stopped;
        state.last_state_change = Some(Utc::now());
        state.generation += 1;
        state.last_transition = None;

        info!(
            "Deployment removed ({} containers, {} volumes)",
            report.removed_containers.len(),
            report.removed_volumes.len()
        );
        Ok(report)
    }
}

async fn execute_plan(
    gateway: &dyn ComposeGateway,
    plan: &TransitionPlan,
) -> Result<(), GatewayError> {
    for step in plan.steps() {
        match step {
            ComposeOp::Up => gateway.up().await?,
            ComposeOp::Down => {
                gateway.down(false).await?;
            }
        }
    }
    Ok(())
}

async fn run_transition(
    gateway: Arc<dyn ComposeGateway>,
    state: Arc<Mutex<MachineState>>,
    services: Arc<Vec<String>>,
    plan: TransitionPlan,
    generation: u64,
    transition_id: Uuid,
) {
    let result = execute_plan(gateway.as_ref(), &plan).await;

    let refresh = {
        let mut state = state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        let latest = state.generation == generation;
        if latest {
            if let Some(report) = state.last_transition.as_mut() {
                report.finished_at = Some(Utc::now());
                match &result {
                    Ok(()) => report.result = TransitionResult::Succeeded,
                    Err(e) => {
                        report.result = TransitionResult::Failed;
                        report.error = Some(e.to_string());
                    }
                }
            }
        }

        match &result {
            Ok(()) if latest => {
                state.current = plan.settled_state();
                info!(
                    "Transition {} to {} completed",
                    transition_id,
                    plan.target()
                );
            }
            Ok(()) => {
                debug!(
                    "Transition {} to {} completed after being superseded",
                    transition_id,
                    plan.target()
                );
            }
            Err(e) => {
                error!(
                    "Transition {} to {} failed: {}",
                    transition_id,
                    plan.target(),
                    e
                );
            }
        }

        state.in_flight == 0 && (result.is_err() || !latest)
    };

    if refresh {
        refresh_cache(gateway.as_ref(), &state, &services).await;
    }
}

async fn refresh_cache(
    gateway: &dyn ComposeGateway,
    state: &Mutex<MachineState>,
    services: &[String],
) {
    match gateway.services_status().await {
        Ok(statuses) => {
            let observed = aggregate_state(services, &statuses);
            let mut state = state.lock().await;
            if state.in_flight == 0 {
                state.current = observed;
            }
        }
        Err(e) => {
            warn!("Unable to refresh deployment state: {}", e);
        }
    }
}
