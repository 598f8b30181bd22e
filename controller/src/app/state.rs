//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::compose::gateway::{CliGateway, ComposeGateway};
use crate::config::store::ConfigStore;
use crate::containers::controller::ContainerController;
use crate::deploy::machine::DeploymentStateMachine;
use crate::env::manager::EnvironmentManager;
use crate::errors::ControllerError;
use crate::server::state::ServerState;

/// Main application state
pub struct AppState {
    /// Variables and topology
    pub store: Arc<ConfigStore>,

    /// Container runtime adapter
    pub gateway: Arc<dyn ComposeGateway>,

    /// Deployment lifecycle
    pub machine: Arc<DeploymentStateMachine>,

    /// Bulk variable updates
    pub env_manager: Arc<EnvironmentManager>,

    /// Single container control
    pub containers: Arc<ContainerController>,
}

impl AppState {
    /// Load the compose project and wire the components against the docker CLI
    pub async fn init(options: &AppOptions) -> Result<Self, ControllerError> {
        info!("Initializing application state...");

        let store = ConfigStore::load(
            &options.compose.compose_file,
            &options.compose.env_file,
            options.compose.project_name.as_deref(),
        )
        .await?;

        let gateway: Arc<dyn ComposeGateway> = Arc::new(CliGateway::new(
            options.compose.binary,
            &options.compose.compose_file,
            &options.compose.env_file,
            store.topology().project_name(),
            options.gateway.clone(),
        ));

        let state = Self::with_gateway(Arc::new(store), gateway);
        state.machine.initialize().await;
        Ok(state)
    }

    /// Wire the components around an existing store and gateway
    pub fn with_gateway(store: Arc<ConfigStore>, gateway: Arc<dyn ComposeGateway>) -> Self {
        let machine = Arc::new(DeploymentStateMachine::new(
            gateway.clone(),
            store.topology(),
        ));
        let env_manager = Arc::new(EnvironmentManager::new(
            store.clone(),
            gateway.clone(),
            machine.clone(),
        ));
        let containers = Arc::new(ContainerController::new(store.clone(), gateway.clone()));

        Self {
            store,
            gateway,
            machine,
            env_manager,
            containers,
        }
    }

    /// State shared with the HTTP handlers
    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            self.store.clone(),
            self.machine.clone(),
            self.env_manager.clone(),
            self.containers.clone(),
        )
    }
}
