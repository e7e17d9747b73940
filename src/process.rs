//! Process table probing and control
//!
//! Enumerates, terminates, and launches processes for the monitored
//! applications. Matching is done on normalized names (trimmed, `.exe`
//! stripped, case-insensitive); results report the original display names.

use crate::config::normalize_process_name;
use crate::status::ProcessQueryResult;
use std::collections::HashSet;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{info, warn};

/// How long to wait for a killed process to leave the process table
const KILL_WAIT: Duration = Duration::from_secs(10);

/// Poll cadence while waiting for a killed process to exit
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Seam for querying and controlling processes
pub trait ProcessControl: Send + Sync {
    /// Which of `target_names` are currently running
    fn query_processes(&self, target_names: &[String]) -> ProcessQueryResult;

    /// Forcefully terminate every process matching `target_names`
    ///
    /// Returns whether at least one process was actually terminated.
    fn kill_processes(&self, target_names: &[String], application_name: &str) -> bool;

    /// Launch `executable_path` detached from the watchdog
    fn start_process(&self, executable_path: &str, application_name: &str) -> bool;
}

/// Canonicalize and deduplicate target names for matching
fn normalize_targets(target_names: &[String]) -> HashSet<String> {
    target_names
        .iter()
        .map(|name| normalize_process_name(name).to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// `sysinfo`-backed [`ProcessControl`] implementation
#[derive(Debug, Default)]
pub struct SystemProcessProbe;

impl SystemProcessProbe {
    /// Create a probe over the live process table
    pub fn new() -> Self {
        Self
    }

    /// One full refresh of the process table
    fn scan() -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        system
    }

    /// Collect (pid, display name) for every process matching the targets
    fn matching_processes(system: &System, targets: &HashSet<String>) -> Vec<(Pid, String)> {
        let mut matches = Vec::new();
        for (pid, process) in system.processes() {
            let display_name = process.name().to_string_lossy().to_string();
            let normalized = normalize_process_name(&display_name).to_lowercase();
            if !normalized.is_empty() && targets.contains(&normalized) {
                matches.push((*pid, display_name));
            }
        }
        matches
    }

    /// Wait for `pid` to leave the process table, bounded by [`KILL_WAIT`]
    fn wait_for_exit(system: &mut System, pid: Pid) -> bool {
        let start = Instant::now();
        loop {
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::nothing(),
            );
            if system.process(pid).is_none() {
                return true;
            }
            if start.elapsed() > KILL_WAIT {
                return false;
            }
            std::thread::sleep(KILL_POLL_INTERVAL);
        }
    }
}

impl ProcessControl for SystemProcessProbe {
    fn query_processes(&self, target_names: &[String]) -> ProcessQueryResult {
        let targets = normalize_targets(target_names);
        if targets.is_empty() {
            return ProcessQueryResult::empty();
        }

        let system = Self::scan();
        let running = Self::matching_processes(&system, &targets)
            .into_iter()
            .map(|(_, name)| name)
            .collect();

        ProcessQueryResult {
            running_processes: running,
        }
    }

    fn kill_processes(&self, target_names: &[String], application_name: &str) -> bool {
        let targets = normalize_targets(target_names);
        if targets.is_empty() {
            return false;
        }

        let mut system = Self::scan();
        let matches = Self::matching_processes(&system, &targets);

        let mut terminated_any = false;
        for (pid, display_name) in matches {
            let Some(process) = system.process(pid) else {
                continue;
            };

            info!(
                "Terminating process {} (PID {}) for {}",
                display_name, pid, application_name
            );
            if !process.kill() {
                warn!(
                    "Failed to terminate process {} for {}",
                    display_name, application_name
                );
                continue;
            }

            terminated_any = true;
            if !Self::wait_for_exit(&mut system, pid) {
                warn!(
                    "Process {} (PID {}) did not exit within {}s",
                    display_name,
                    pid,
                    KILL_WAIT.as_secs()
                );
            }
        }

        terminated_any
    }

    fn start_process(&self, executable_path: &str, application_name: &str) -> bool {
        let executable_path = executable_path.trim();
        if executable_path.is_empty() || !Path::new(executable_path).is_file() {
            return false;
        }

        let spawn = Command::new(executable_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawn {
            Ok(_) => {
                info!(
                    "Launched executable for {}: {}",
                    application_name, executable_path
                );
                true
            }
            Err(e) => {
                warn!(
                    "Failed to start executable for {}: {}",
                    application_name, e
                );
                false
            }
        }
    }
}
