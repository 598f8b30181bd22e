//! Server state

use std::sync::Arc;

use crate::config::store::ConfigStore;
use crate::containers::controller::ContainerController;
use crate::deploy::machine::DeploymentStateMachine;
use crate::env::manager::EnvironmentManager;

/// Server state shared across handlers
pub struct ServerState {
    pub store: Arc<ConfigStore>,
    pub machine: Arc<DeploymentStateMachine>,
    pub env_manager: Arc<EnvironmentManager>,
    pub containers: Arc<ContainerController>,
}

impl ServerState {
    pub fn new(
        store: Arc<ConfigStore>,
        machine: Arc<DeploymentStateMachine>,
        env_manager: Arc<EnvironmentManager>,
        containers: Arc<ContainerController>,
    ) -> Self {
        Self {
            store,
            machine,
            env_manager,
            containers,
        }
    }
}
