//! Config store
//!
//! In-process source of truth for the deployment's variables and topology.

use std::path::Path;

use openapi_server::models::EnvVariable;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::compose::topology::ComposeTopology;
use crate::config::envfile::EnvFile;
use crate::errors::ControllerError;
use crate::filesys::file::File;

pub struct ConfigStore {
    env_file: File,
    env: Mutex<EnvFile>,
    topology: ComposeTopology,
}

impl ConfigStore {
    pub fn new(env_file: File, env: EnvFile, topology: ComposeTopology) -> Self {
        Self {
            env_file,
            env: Mutex::new(env),
            topology,
        }
    }

    /// Load the compose topology and the env file snapshot
    ///
    /// A missing env file yields an empty variable set.
    pub async fn load(
        compose_file: &Path,
        env_file: &Path,
        project_override: Option<&str>,
    ) -> Result<Self, ControllerError> {
        let topology = ComposeTopology::load(compose_file, project_override).await?;
        info!(
            "Loaded compose project '{}' with {} services",
            topology.project_name(),
            topology.services().len()
        );

        let file = File::new(env_file);
        let env = if file.exists().await {
            EnvFile::parse(&file.read_string().await?)
        } else {
            warn!(
                "Env file {} does not exist, starting with no variables",
                env_file.display()
            );
            EnvFile::default()
        };
        debug!("Loaded {} variables from {}", env.len(), env_file.display());

        Ok(Self::new(file, env, topology))
    }

    pub fn topology(&self) -> &ComposeTopology {
        &self.topology
    }

    pub fn env_path(&self) -> &Path {
        self.env_file.path()
    }

    /// Exclusive access to the variable set for a read-modify-write
    pub(crate) async fn lock_env(&self) -> MutexGuard<'_, EnvFile> {
        self.env.lock().await
    }

    /// Rewrite the env file from `env`
    pub(crate) async fn persist(&self, env: &EnvFile) -> Result<(), ControllerError> {
        self.env_file.write_atomic(env.render().as_bytes()).await
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.env.lock().await.get(key).map(str::to_string)
    }

    /// Current variables in file order, with schema information where known
    pub async fn variables(&self) -> Vec<EnvVariable> {
        let env = self.env.lock().await;
        let schema = self.topology.env_schema();

        env.entries()
            .map(|(name, value)| {
                let entry = schema.get(name).cloned().unwrap_or_default();
                EnvVariable {
                    name: name.to_string(),
                    value: value.to_string(),
                    description: entry.description,
                    default: entry.default,
                    var_type: if entry.var_type.is_empty() {
                        "string".to_string()
                    } else {
                        entry.var_type
                    },
                    advanced: entry.advanced,
                }
            })
            .collect()
    }
}
