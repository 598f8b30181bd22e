//! Deployment state vocabulary and transition planning

use openapi_server::models::{CurrentState, DesiredState};

use crate::compose::gateway::ServiceStatus;

/// Whole-stack compose operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeOp {
    /// `up -d`
    Up,

    /// `down`, volumes kept
    Down,
}

/// Backend operations that move the stack to a desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    target: DesiredState,
    steps: Vec<ComposeOp>,
}

impl TransitionPlan {
    /// Plan for reaching `target` from any state
    ///
    /// A restart is a down that must complete before the up is issued.
    pub fn for_target(target: DesiredState) -> Self {
        let steps = match target {
            DesiredState::Running => vec![ComposeOp::Up],
            DesiredState::Stopped => vec![ComposeOp::Down],
            DesiredState::Restarting => vec![ComposeOp::Down, ComposeOp::Up],
        };
        Self { target, steps }
    }

    pub fn target(&self) -> DesiredState {
        self.target
    }

    pub fn steps(&self) -> &[ComposeOp] {
        &self.steps
    }

    /// State the stack is in once every step succeeded
    pub fn settled_state(&self) -> CurrentState {
        match self.target {
            DesiredState::Running | DesiredState::Restarting => CurrentState::Running,
            DesiredState::Stopped => CurrentState::Stopped,
        }
    }
}

/// Derive the deployment state from its services' live statuses
///
/// Services without a container count as stopped. An empty topology is stopped.
pub fn aggregate_state(services: &[String], statuses: &[ServiceStatus]) -> CurrentState {
    let mut up = 0;
    let mut down = 0;

    for service in services {
        match statuses.iter().find(|s| &s.service == service) {
            Some(s) if s.status.is_up() => up += 1,
            Some(s) if s.status.state.is_down() => down += 1,
            Some(_) => {}
            None => down += 1,
        }
    }

    if down == services.len() {
        CurrentState::Stopped
    } else if up == services.len() {
        CurrentState::Running
    } else {
        CurrentState::Transitioning
    }
}

/// Initial desired state for an observed state
pub fn desired_from_observed(observed: CurrentState) -> DesiredState {
    match observed {
        CurrentState::Running => DesiredState::Running,
        _ => DesiredState::Stopped,
    }
}
