//! OS service probing and control
//!
//! Queries and restarts services through `systemctl`. All failures are
//! folded into result values; nothing here panics or propagates an error
//! past the probe boundary.

use crate::status::ServiceQueryResult;
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Ceiling for one service state transition during a restart
const TRANSITION_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll cadence while waiting for a state transition
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a service restart attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// The service reached the running state
    Success,
    /// The service manager refused the request for lack of privilege
    RequiresElevation(String),
    /// The restart failed for another reason
    Failure(String),
    /// No service name was configured
    Skipped,
}

/// Seam for querying and restarting OS services
pub trait ServiceControl: Send + Sync {
    /// Query the current state of `service_name`
    fn query_status(&self, service_name: &str) -> ServiceQueryResult;

    /// Stop and start `service_name`, waiting for each transition
    fn restart_service(&self, service_name: &str) -> RestartOutcome;
}

/// Coarse unit state as reported by the service manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitState {
    Running,
    Starting,
    Stopping,
    Stopped,
    Failed,
    Unknown,
}

impl UnitState {
    /// Running or start-pending both count as healthy, so a service that is
    /// mid-startup does not flap to unhealthy.
    fn counts_as_running(self) -> bool {
        matches!(self, UnitState::Running | UnitState::Starting)
    }

    fn is_stopped(self) -> bool {
        matches!(self, UnitState::Stopped | UnitState::Failed)
    }
}

fn classify_active_state(active_state: &str) -> UnitState {
    match active_state {
        "active" | "reloading" => UnitState::Running,
        "activating" => UnitState::Starting,
        "deactivating" => UnitState::Stopping,
        "inactive" => UnitState::Stopped,
        "failed" => UnitState::Failed,
        _ => UnitState::Unknown,
    }
}

/// Whether service-manager output describes a permission refusal
fn is_access_denied(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("access denied")
        || lower.contains("permission denied")
        || lower.contains("interactive authentication required")
        || lower.contains("authentication is required")
}

/// Whether service-manager output describes a missing unit
fn is_unit_not_found(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("could not be found")
        || lower.contains("not loaded")
        || lower.contains("no such unit")
}

/// `systemctl`-backed [`ServiceControl`] implementation
#[derive(Debug, Default)]
pub struct SystemdServiceProbe;

impl SystemdServiceProbe {
    /// Create a probe talking to the system service manager
    pub fn new() -> Self {
        Self
    }

    /// Read LoadState/ActiveState for a unit
    fn query_unit(&self, service_name: &str) -> std::result::Result<(bool, UnitState), String> {
        let output = Command::new("systemctl")
            .args([
                "show",
                service_name,
                "--property=LoadState,ActiveState",
                "--no-pager",
            ])
            .output()
            .map_err(|e| format!("failed to run systemctl: {}", e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !stderr.trim().is_empty() {
            return Err(stderr.trim().to_string());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut loaded = false;
        let mut state = UnitState::Unknown;
        for line in stdout.lines() {
            if let Some((key, value)) = line.split_once('=') {
                match key {
                    "LoadState" => loaded = value == "loaded",
                    "ActiveState" => state = classify_active_state(value),
                    _ => {}
                }
            }
        }

        Ok((loaded, state))
    }

    /// Wait until `predicate` holds for the unit state, or time out
    fn wait_for_state<F>(&self, service_name: &str, predicate: F) -> bool
    where
        F: Fn(UnitState) -> bool,
    {
        let start = Instant::now();
        loop {
            match self.query_unit(service_name) {
                Ok((_, state)) if predicate(state) => return true,
                Ok(_) | Err(_) => {}
            }

            if start.elapsed() > TRANSITION_TIMEOUT {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Run one systemctl verb against a unit, capturing stderr
    fn run_verb(&self, verb: &str, service_name: &str) -> std::result::Result<(), String> {
        let output = Command::new("systemctl")
            .args([verb, service_name])
            .output()
            .map_err(|e| format!("failed to run systemctl {}: {}", verb, e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            Err(format!("systemctl {} {} failed", verb, service_name))
        } else {
            Err(stderr)
        }
    }
}

impl ServiceControl for SystemdServiceProbe {
    fn query_status(&self, service_name: &str) -> ServiceQueryResult {
        let service_name = service_name.trim();
        if service_name.is_empty() {
            return ServiceQueryResult::not_configured();
        }

        match self.query_unit(service_name) {
            Ok((loaded, state)) => {
                if !loaded {
                    return ServiceQueryResult::default();
                }
                ServiceQueryResult {
                    exists: true,
                    running: state.counts_as_running(),
                    access_denied: false,
                    error: None,
                }
            }
            Err(message) if is_access_denied(&message) => ServiceQueryResult {
                exists: true,
                running: false,
                access_denied: true,
                error: Some(message),
            },
            Err(message) if is_unit_not_found(&message) => ServiceQueryResult::default(),
            Err(message) => ServiceQueryResult {
                exists: true,
                running: false,
                access_denied: false,
                error: Some(message),
            },
        }
    }

    fn restart_service(&self, service_name: &str) -> RestartOutcome {
        let service_name = service_name.trim();
        if service_name.is_empty() {
            return RestartOutcome::Skipped;
        }

        let state = match self.query_unit(service_name) {
            Ok((loaded, _)) if !loaded => {
                return RestartOutcome::Failure(format!("unit '{}' not found", service_name));
            }
            Ok((_, state)) => state,
            Err(message) if is_access_denied(&message) => {
                return RestartOutcome::RequiresElevation(message);
            }
            Err(message) => return RestartOutcome::Failure(message),
        };

        // A stop already in flight just needs to run out.
        if state == UnitState::Stopping && !self.wait_for_state(service_name, UnitState::is_stopped)
        {
            return RestartOutcome::Failure(format!(
                "service '{}' did not stop within {}s",
                service_name,
                TRANSITION_TIMEOUT.as_secs()
            ));
        }

        if !matches!(state, UnitState::Stopped | UnitState::Failed | UnitState::Stopping) {
            debug!("Stopping service '{}'", service_name);
            if let Err(message) = self.run_verb("stop", service_name) {
                if is_access_denied(&message) {
                    return RestartOutcome::RequiresElevation(message);
                }
                return RestartOutcome::Failure(message);
            }

            if !self.wait_for_state(service_name, UnitState::is_stopped) {
                return RestartOutcome::Failure(format!(
                    "service '{}' did not stop within {}s",
                    service_name,
                    TRANSITION_TIMEOUT.as_secs()
                ));
            }
        }

        debug!("Starting service '{}'", service_name);
        if let Err(message) = self.run_verb("start", service_name) {
            if is_access_denied(&message) {
                return RestartOutcome::RequiresElevation(message);
            }
            return RestartOutcome::Failure(message);
        }

        if !self.wait_for_state(service_name, UnitState::counts_as_running) {
            warn!(
                "Service '{}' did not reach running within {}s",
                service_name,
                TRANSITION_TIMEOUT.as_secs()
            );
            return RestartOutcome::Failure(format!(
                "service '{}' did not start within {}s",
                service_name,
                TRANSITION_TIMEOUT.as_secs()
            ));
        }

        RestartOutcome::Success
    }
}
