//! Container controller
//!
//! Start, stop and restart single service containers. A control call only
//! succeeds once the container's live status matches the action.

use std::sync::Arc;

use futures::future::join_all;
use openapi_server::models::ContainerInfo;
use tracing::{debug, error, info, warn};

use crate::compose::gateway::{
    ComposeGateway, ContainerAction, ContainerState, ContainerStatus, GatewayError, LogStream,
};
use crate::compose::topology::ServiceDef;
use crate::config::store::ConfigStore;
use crate::errors::ControllerError;

pub struct ContainerController {
    store: Arc<ConfigStore>,
    gateway: Arc<dyn ComposeGateway>,
}

impl ContainerController {
    pub fn new(store: Arc<ConfigStore>, gateway: Arc<dyn ComposeGateway>) -> Self {
        Self { store, gateway }
    }

    fn service(&self, name: &str) -> Result<&ServiceDef, ControllerError> {
        self.store.topology().service(name).ok_or_else(|| {
            warn!("Service not found: {}", name);
            ControllerError::ContainerNotFound(format!(
                "service '{}' is not defined in the compose file",
                name
            ))
        })
    }

    /// Every compose service with its live status
    pub async fn list(&self) -> Result<Vec<ContainerInfo>, ControllerError> {
        let services = self.store.topology().services();
        let statuses = join_all(
            services
                .iter()
                .map(|service| self.gateway.container_status(&service.container_name)),
        )
        .await;

        services
            .iter()
            .zip(statuses)
            .map(|(service, status)| -> Result<ContainerInfo, ControllerError> {
                Ok(container_info(service, &status?))
            })
            .collect()
    }

    /// One compose service with its live status
    pub async fn get(&self, name: &str) -> Result<ContainerInfo, ControllerError> {
        let service = self.service(name)?;
        let status = self.gateway.container_status(&service.container_name).await?;
        Ok(container_info(service, &status))
    }

    /// Apply `action` to the service's container and verify the result
    pub async fn control(&self, name: &str, action: &str) -> Result<ContainerInfo, ControllerError> {
        let action: ContainerAction = action.parse().map_err(ControllerError::ValidationError)?;
        let service = self.service(name)?;
        let container = service.container_name.as_str();

        let before = self.gateway.container_status(container).await?;
        if before.state == ContainerState::NotCreated {
            warn!("Container {} for service {} does not exist", container, name);
            return Err(ControllerError::ContainerNotFound(format!(
                "container '{}' has not been created",
                container
            )));
        }

        info!("Executing {} on container {}", action, container);
        self.gateway
            .container_action(container, action)
            .await
            .map_err(|e| action_error(container, action, e))?;

        let after = self
            .gateway
            .container_status(container)
            .await
            .map_err(|e| action_error(container, action, e))?;
        debug!("Container {} is {} after {}", container, after.state.as_str(), action);

        if !action.is_satisfied_by(&after) {
            error!(
                "Container {} is {} after {}",
                container,
                after.state.as_str(),
                action
            );
            return Err(ControllerError::VerificationFailed(format!(
                "container '{}' is {} after {}",
                container,
                after.state.as_str(),
                action
            )));
        }

        info!("Container {} {} verified", container, action);
        Ok(container_info(service, &after))
    }

    /// Follow the log of the service's container
    pub async fn logs(&self, name: &str) -> Result<LogStream, ControllerError> {
        let service = self.service(name)?;
        let container = service.container_name.as_str();

        let status = self.gateway.container_status(container).await?;
        if status.state == ContainerState::NotCreated {
            warn!("No container to follow for service {}", name);
            return Err(ControllerError::ContainerNotFound(format!(
                "container '{}' has not been created",
                container
            )));
        }

        info!("Following logs of container {}", container);
        Ok(self.gateway.container_logs(container).await?)
    }
}

fn action_error(container: &str, action: ContainerAction, err: GatewayError) -> ControllerError {
    match err {
        GatewayError::Unavailable(msg) => {
            error!("Runtime unavailable during {} of {}: {}", action, container, msg);
            ControllerError::BackendUnavailable(msg)
        }
        other => {
            error!("Failed to {} container {}: {}", action, container, other);
            ControllerError::VerificationFailed(format!(
                "{} of container '{}' not confirmed: {}",
                action, container, other
            ))
        }
    }
}

fn container_info(service: &ServiceDef, status: &ContainerStatus) -> ContainerInfo {
    ContainerInfo {
        name: service.name.clone(),
        container_name: service.container_name.clone(),
        image: service.image.clone(),
        status: status.state.as_str().to_string(),
        health: status.health.map(|h| h.as_str().to_string()),
        started_at: status.started_at.clone(),
        ports: service.ports.clone(),
        depends_on: service.depends_on.clone(),
    }
}
