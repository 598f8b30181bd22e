//! Utility functions

use colored::*;
use serde::{Deserialize, Serialize};

use crate::app::options::AppOptions;
use crate::compose::gateway::{CliGateway, ComposeGateway};
use crate::compose::topology::ComposeTopology;
use crate::filesys::file::File;

/// Version information for the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

fn report(ok: bool, label: &str, detail: &str) -> bool {
    if ok {
        println!("{} {} {}", "✓".green(), label, detail.dimmed());
    } else {
        println!("{} {} {}", "✗".red(), label, detail.red());
    }
    ok
}

/// Check the compose file, env file and docker daemon and print a report
///
/// Returns whether every check passed.
pub async fn run_diagnostic(options: &AppOptions) -> bool {
    println!("{}", "Deployment controller diagnostic".bold());

    let compose_file = &options.compose.compose_file;
    let topology = match ComposeTopology::load(compose_file, options.compose.project_name.as_deref()).await {
        Ok(topology) => {
            report(
                true,
                "Compose file",
                &format!(
                    "{} (project '{}', {} services)",
                    compose_file.display(),
                    topology.project_name(),
                    topology.services().len()
                ),
            );
            Some(topology)
        }
        Err(e) => {
            report(false, "Compose file", &format!("{}: {}", compose_file.display(), e));
            None
        }
    };

    let env_file = &options.compose.env_file;
    let env_ok = report(
        File::new(env_file).exists().await,
        "Env file",
        &env_file.display().to_string(),
    );

    let docker_ok = match &topology {
        Some(topology) => {
            let gateway = CliGateway::new(
                options.compose.binary,
                compose_file,
                env_file,
                topology.project_name(),
                options.gateway.clone(),
            );
            match gateway.ensure_available().await {
                Ok(()) => report(true, "Docker daemon", "reachable"),
                Err(e) => report(false, "Docker daemon", &e.to_string()),
            }
        }
        None => report(false, "Docker daemon", "skipped, compose file unusable"),
    };

    topology.is_some() && env_ok && docker_ok
}
