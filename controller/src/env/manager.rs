//! Environment manager
//!
//! Bulk variable updates. Only keys that already exist and whose value
//! differs are written; nothing is ever added. A request with any invalid
//! value is rejected before anything is applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use openapi_server::models::DesiredState;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::compose::gateway::ComposeGateway;
use crate::config::envfile::{is_single_line, EnvFile};
use crate::config::store::ConfigStore;
use crate::deploy::machine::DeploymentStateMachine;
use crate::errors::ControllerError;

/// Success message of a bulk update, whatever it changed
pub const UPDATE_MESSAGE: &str = "Environment variables updated";

/// Outcome of a bulk update
#[derive(Debug)]
pub struct EnvUpdate {
    /// Names whose value changed, in ascending key order
    pub updated: Vec<String>,

    /// Background recreation of the affected services, if one was dispatched
    pub recreation: Option<JoinHandle<()>>,
}

pub struct EnvironmentManager {
    store: Arc<ConfigStore>,
    gateway: Arc<dyn ComposeGateway>,
    machine: Arc<DeploymentStateMachine>,
}

impl EnvironmentManager {
    pub fn new(
        store: Arc<ConfigStore>,
        gateway: Arc<dyn ComposeGateway>,
        machine: Arc<DeploymentStateMachine>,
    ) -> Self {
        Self {
            store,
            gateway,
            machine,
        }
    }

    fn validate(
        &self,
        env: &EnvFile,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), ControllerError> {
        let schema = self.store.topology().env_schema();
        for (name, value) in variables {
            match env.get(name) {
                Some(current) if current != value.as_str() => {}
                _ => continue,
            }
            if !is_single_line(value) {
                warn!("Rejecting multi-line value for {}", name);
                return Err(ControllerError::ValidationError(format!(
                    "value of {} must be a single line",
                    name
                )));
            }
            if let Some(entry) = schema.get(name) {
                entry.check_value(value).map_err(|reason| {
                    warn!("Rejecting value for {}: {}", name, reason);
                    ControllerError::ValidationError(format!("{}: {}", name, reason))
                })?;
            }
        }
        Ok(())
    }

    /// Apply `variables` to the store and optionally recreate consumers
    pub async fn update_variables(
        &self,
        variables: &BTreeMap<String, String>,
        recreate_services: bool,
    ) -> Result<EnvUpdate, ControllerError> {
        debug!("Bulk environment update with {} variables", variables.len());

        let updated = {
            let mut env = self.store.lock_env().await;
            self.validate(&env, variables)?;
            let mut updated = Vec::new();

            for (name, value) in variables {
                let current = env.get(name).map(str::to_string);
                match current {
                    None => debug!("Ignoring unknown variable {}", name),
                    Some(current) if &current == value => {
                        debug!("Variable {} unchanged", name)
                    }
                    Some(_) => {
                        env.set(name, value);
                        updated.push(name.clone());
                    }
                }
            }

            if !updated.is_empty() {
                if let Err(e) = self.store.persist(&env).await {
                    warn!(
                        "Variables {:?} applied in memory but not written to {}: {}",
                        updated,
                        self.store.env_path().display(),
                        e
                    );
                    return Err(ControllerError::Persistence {
                        message: format!(
                            "failed to write {}: {}",
                            self.store.env_path().display(),
                            e
                        ),
                        updated,
                    });
                }
            }

            updated
        };

        if updated.is_empty() {
            info!("No environment variables changed");
            return Ok(EnvUpdate {
                updated,
                recreation: None,
            });
        }

        if !recreate_services {
            info!(
                "Updated {} variables, recreation skipped by request",
                updated.len()
            );
            return Ok(EnvUpdate {
                updated,
                recreation: None,
            });
        }

        if self.machine.desired_state().await == DesiredState::Stopped {
            info!(
                "Updated {} variables, deployment is stopped; recreation skipped",
                updated.len()
            );
            return Ok(EnvUpdate {
                updated,
                recreation: None,
            });
        }

        let services = self.store.topology().services_consuming(&updated);
        if services.is_empty() {
            info!(
                "Updated {} variables, no service references them; recreating the whole stack",
                updated.len()
            );
        } else {
            info!(
                "Updated {} variables, recreating services {:?}",
                updated.len(),
                services
            );
        }

        let gateway = self.gateway.clone();
        let machine = self.machine.clone();
        let recreation = tokio::spawn(async move {
            if machine.desired_state().await == DesiredState::Stopped {
                info!("Deployment stopped before recreation of {:?}, skipping", services);
                return;
            }
            match gateway.recreate(&services).await {
                Ok(()) => info!("Recreated services {:?}", services),
                Err(e) => error!("Failed to recreate services {:?}: {}", services, e),
            }
        });

        Ok(EnvUpdate {
            updated,
            recreation: Some(recreation),
        })
    }
}
