//! Watchkeep - application watchdog
//!
//! Supervises a configurable set of named applications, each backed by an
//! OS service and/or processes, and restarts them on request when they are
//! judged unhealthy.

mod autostart;
mod cli;
mod config;
mod console;
mod engine;
mod error;
mod process;
mod remedy;
mod service;
mod status;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use autostart::AutostartEntry;
use cli::{AutostartAction, Cli, Commands};
use config::ConfigStore;
use console::{ConsentPrompt, DenyAll, StdinPrompt};
use engine::{EngineHandle, MonitoringEngine};
use error::{Error, Result};
use process::{ProcessControl, SystemProcessProbe};
use remedy::RemediationCoordinator;
use service::{ServiceControl, SystemdServiceProbe};
use status::CycleCompleted;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match cli.command {
        // Commands that don't require config
        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
            Ok(())
        }
        Commands::Autostart { action } => {
            let entry = AutostartEntry::for_current_user()?;
            match action {
                AutostartAction::Enable => {
                    let exe = std::env::current_exe()?;
                    entry.enable(&exe.to_string_lossy())?;
                    println!("Launch at login enabled");
                }
                AutostartAction::Disable => {
                    entry.disable()?;
                    println!("Launch at login disabled");
                }
                AutostartAction::Status => {
                    if entry.is_enabled() {
                        println!("Launch at login is enabled");
                    } else {
                        println!("Launch at login is disabled");
                    }
                }
            }
            Ok(())
        }

        Commands::Check => {
            let config = config::load_strict(&cli.config)?;
            println!(
                "Configuration OK: {} application(s), monitoring every {} minute(s)",
                config.applications.len(),
                config.interval.total_minutes()
            );
            Ok(())
        }

        Commands::Run => run_watchdog(&cli.config),
        Commands::Status { json } => run_status(&cli.config, json),
        Commands::Restart {
            application,
            non_interactive,
        } => run_restart(&cli.config, &application, non_interactive),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn system_probes() -> (Arc<dyn ServiceControl>, Arc<dyn ProcessControl>) {
    (
        Arc::new(SystemdServiceProbe::new()),
        Arc::new(SystemProcessProbe::new()),
    )
}

fn new_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Io(std::io::Error::other(e)))
}

/// Run the watchdog until interrupted
fn run_watchdog(config_path: &std::path::Path) -> Result<()> {
    let store = Arc::new(ConfigStore::load(config_path));
    let config = store.snapshot();
    info!(
        "Starting watchkeep: {} application(s), monitoring every {} minute(s)",
        config.applications.len(),
        config.interval.total_minutes()
    );

    sync_autostart_entry(&config);

    let (service, process) = system_probes();
    let rt = new_runtime()?;

    rt.block_on(async {
        let mut engine = MonitoringEngine::new(config, service, process);
        let handle = engine.handle();

        let engine_task = tokio::spawn(async move { engine.run().await });

        wait_for_signals(&store, &handle, config_path).await?;

        info!("Shutting down");
        handle.shutdown().await;
        let _ = engine_task.await;
        Ok(())
    })
}

/// Block until Ctrl+C, reloading configuration on SIGHUP
async fn wait_for_signals(
    store: &ConfigStore,
    handle: &EngineHandle,
    config_path: &std::path::Path,
) -> Result<()> {
    let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                return Ok(());
            }
            _ = hangup.recv() => {
                let config = store.reload();
                info!(
                    "Configuration reloaded from '{}': {} application(s), every {} minute(s)",
                    config_path.display(),
                    config.applications.len(),
                    config.interval.total_minutes()
                );
                sync_autostart_entry(&config);
                handle.apply_configuration(config).await?;
            }
        }
    }
}

/// Reconcile the login entry with the configured auto-start flag
fn sync_autostart_entry(config: &config::WatchdogConfiguration) {
    let entry = match AutostartEntry::for_current_user() {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Cannot manage the launch-at-login entry: {}", e);
            return;
        }
    };

    let result = if config.auto_start {
        std::env::current_exe()
            .map_err(Error::from)
            .and_then(|exe| entry.enable(&exe.to_string_lossy()))
    } else if entry.is_enabled() {
        entry.disable()
    } else {
        Ok(())
    };

    if let Err(e) = result {
        warn!("Failed to update the launch-at-login entry: {}", e);
    }
}

/// Probe everything once and print the status set
fn run_status(config_path: &std::path::Path, json: bool) -> Result<()> {
    let store = ConfigStore::load(config_path);
    let config = store.snapshot();
    let (service, process) = system_probes();
    let rt = new_runtime()?;

    let event = rt.block_on(async {
        let mut engine = MonitoringEngine::new(config, service, process);
        let handle = engine.handle();
        let mut events = handle.subscribe();
        let engine_task = tokio::spawn(async move { engine.run().await });

        // The engine's startup tick runs the first cycle.
        let event = events.recv().await.map_err(|_| Error::EngineStopped)?;

        handle.shutdown().await;
        let _ = engine_task.await;
        Ok::<CycleCompleted, Error>(event)
    })?;

    print_statuses(&event, json)?;
    Ok(())
}

fn print_statuses(event: &CycleCompleted, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&event.statuses)?);
        return Ok(());
    }

    if event.statuses.is_empty() {
        println!("No applications configured");
        return Ok(());
    }

    for snapshot in &event.statuses {
        println!("{} ({})", snapshot.summary(), snapshot.health());
    }
    Ok(())
}

/// Restart one application by name, then print the refreshed status set
fn run_restart(
    config_path: &std::path::Path,
    application_name: &str,
    non_interactive: bool,
) -> Result<()> {
    let store = ConfigStore::load(config_path);
    let config = store.snapshot();
    let application = config
        .get_application(application_name)
        .cloned()
        .ok_or_else(|| Error::ApplicationNotFound(application_name.to_string()))?;

    let (service, process) = system_probes();
    let consent: Box<dyn ConsentPrompt> = if non_interactive {
        Box::new(DenyAll)
    } else {
        Box::new(StdinPrompt::new())
    };

    let rt = new_runtime()?;
    let event = rt.block_on(async {
        let mut engine = MonitoringEngine::new(config, service.clone(), process.clone());
        let handle = engine.handle();
        let engine_task = tokio::spawn(async move { engine.run().await });

        let coordinator =
            RemediationCoordinator::new(service, process, consent, handle.clone());
        tokio::task::spawn_blocking(move || coordinator.restart(&application))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        // Wait for a cycle that reflects the restart outcome.
        let event = loop {
            match handle.refresh_now().await? {
                Some(event) => break event,
                None => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        };

        handle.shutdown().await;
        let _ = engine_task.await;
        Ok::<CycleCompleted, Error>(event)
    })?;

    print_statuses(&event, false)?;
    Ok(())
}
