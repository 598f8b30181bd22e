//! Deployment controller - Entry Point
//!
//! REST control plane for a single Docker Compose deployment.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::Context;
use deployctl::app::options::AppOptions;
use deployctl::app::run::run;
use deployctl::logs::{init_logging, LogOptions};
use deployctl::storage::settings::Settings;
use deployctl::utils::{run_diagnostic, version_info};

use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = start().await {
        eprintln!("deployctl: {:#}", e);
        std::process::exit(1);
    }
}

async fn start() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version)?);
        return Ok(());
    }

    // Layer the settings
    let mut settings = Settings::load(cli_args.get("config").map(PathBuf::from))
        .await
        .context("unable to read settings file")?;
    settings
        .apply_env(|key| env::var(key).ok())
        .context("invalid environment configuration")?;
    settings
        .apply_cli(&cli_args)
        .context("invalid command line configuration")?;
    let options = AppOptions::from(&settings);

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        if !run_diagnostic(&options).await {
            anyhow::bail!("diagnostic failed");
        }
        return Ok(());
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
    };
    let _log_guard = init_logging(log_options).context("failed to initialize logging")?;

    info!(
        "Running deployment controller {} ({}) with options: {:?}",
        version.version, version.git_hash, options
    );
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the deployment controller: {e}");
        return Err(e).context("controller stopped with an error");
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
