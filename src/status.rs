//! Per-cycle status records and the derived health classification

use crate::config::MonitoredApplication;
use chrono::{DateTime, Local};
use serde::Serialize;

/// Derived health of a monitored application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplicationHealth {
    /// Monitoring is switched off globally or for this application
    MonitoringDisabled,
    /// The backing service or at least one target process is running
    Healthy,
    /// Neither the service nor any target process is running
    Unhealthy,
}

impl std::fmt::Display for ApplicationHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationHealth::MonitoringDisabled => write!(f, "monitoring disabled"),
            ApplicationHealth::Healthy => write!(f, "healthy"),
            ApplicationHealth::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result of querying one OS service
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceQueryResult {
    /// The service is known to the service manager
    pub exists: bool,
    /// The service is running (or start-pending)
    pub running: bool,
    /// The query was refused for lack of privilege
    pub access_denied: bool,
    /// Failure detail for anything else
    pub error: Option<String>,
}

impl ServiceQueryResult {
    /// Result for an application with no service configured
    pub fn not_configured() -> Self {
        Self::default()
    }

    /// Whether the query carries an error message
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// Result of scanning the process table for an application's targets
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessQueryResult {
    /// Display names of the matching processes actually observed running
    pub running_processes: Vec<String>,
}

impl ProcessQueryResult {
    /// Result for an empty target set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any target process was observed
    pub fn any_running(&self) -> bool {
        !self.running_processes.is_empty()
    }
}

/// Immutable per-cycle record for one application
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusSnapshot {
    /// The application definition in effect when the cycle ran
    pub application: MonitoredApplication,
    /// Global monitoring flag at capture time
    pub global_monitoring_enabled: bool,
    /// Service probe result
    pub service: ServiceQueryResult,
    /// Process probe result
    pub process: ProcessQueryResult,
}

impl ApplicationStatusSnapshot {
    /// Build a snapshot from one application's probe results
    pub fn new(
        application: &MonitoredApplication,
        global_monitoring_enabled: bool,
        service: ServiceQueryResult,
        process: ProcessQueryResult,
    ) -> Self {
        Self {
            application: application.clone(),
            global_monitoring_enabled,
            service,
            process,
        }
    }

    /// The backing service is running
    pub fn service_running(&self) -> bool {
        self.service.running
    }

    /// At least one target process is running
    pub fn process_running(&self) -> bool {
        self.process.any_running()
    }

    /// Monitoring is on both globally and for this application
    pub fn effective_monitoring_enabled(&self) -> bool {
        self.global_monitoring_enabled && self.application.monitoring_enabled
    }

    /// Derived health classification
    pub fn health(&self) -> ApplicationHealth {
        if !self.effective_monitoring_enabled() {
            return ApplicationHealth::MonitoringDisabled;
        }

        if self.service_running() || self.process_running() {
            ApplicationHealth::Healthy
        } else {
            ApplicationHealth::Unhealthy
        }
    }

    /// One-line human-readable summary for the cycle log
    pub fn summary(&self) -> String {
        let service_part = if !self.service.exists {
            "service not configured".to_string()
        } else if self.service.access_denied {
            "service access denied".to_string()
        } else if self.service.has_error() {
            format!("service error: {}", self.service.error.as_deref().unwrap_or(""))
        } else if self.service_running() {
            "service running".to_string()
        } else {
            "service stopped".to_string()
        };

        let process_part = if self.application.process_names.is_empty() {
            "process not configured".to_string()
        } else if self.process_running() {
            format!("process running ({})", self.process.running_processes.join(", "))
        } else {
            "process stopped".to_string()
        };

        let monitoring_part = if self.effective_monitoring_enabled() {
            "monitoring active"
        } else {
            "monitoring disabled"
        };

        format!(
            "[{}] {}; {}; {}",
            self.application.name, service_part, process_part, monitoring_part
        )
    }
}

/// Notification published after every completed monitoring cycle
#[derive(Debug, Clone)]
pub struct CycleCompleted {
    /// When the cycle finished
    pub timestamp: DateTime<Local>,
    /// Fresh status records for every configured application
    pub statuses: Vec<ApplicationStatusSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        global: bool,
        app_enabled: bool,
        service_running: bool,
        process_running: bool,
    ) -> ApplicationStatusSnapshot {
        let application = MonitoredApplication {
            name: "Test".to_string(),
            service_name: "testd".to_string(),
            process_names: vec!["test".to_string()],
            monitoring_enabled: app_enabled,
            ..Default::default()
        };
        ApplicationStatusSnapshot::new(
            &application,
            global,
            ServiceQueryResult {
                exists: true,
                running: service_running,
                ..Default::default()
            },
            ProcessQueryResult {
                running_processes: if process_running {
                    vec!["test".to_string()]
                } else {
                    Vec::new()
                },
            },
        )
    }

    #[test]
    fn test_health_disabled_globally() {
        assert_eq!(
            snapshot(false, true, true, true).health(),
            ApplicationHealth::MonitoringDisabled
        );
    }

    #[test]
    fn test_health_disabled_per_application() {
        assert_eq!(
            snapshot(true, false, true, true).health(),
            ApplicationHealth::MonitoringDisabled
        );
    }

    #[test]
    fn test_health_process_only_is_healthy() {
        assert_eq!(snapshot(true, true, false, true).health(), ApplicationHealth::Healthy);
    }

    #[test]
    fn test_health_service_only_is_healthy() {
        assert_eq!(snapshot(true, true, true, false).health(), ApplicationHealth::Healthy);
    }

    #[test]
    fn test_health_nothing_running_is_unhealthy() {
        assert_eq!(snapshot(true, true, false, false).health(), ApplicationHealth::Unhealthy);
    }

    #[test]
    fn test_summary_mentions_running_processes() {
        let s = snapshot(true, true, false, true);
        let line = s.summary();
        assert!(line.contains("[Test]"));
        assert!(line.contains("service stopped"));
        assert!(line.contains("process running (test)"));
        assert!(line.contains("monitoring active"));
    }

    #[test]
    fn test_summary_not_configured_service() {
        let mut s = snapshot(true, true, false, false);
        s.service = ServiceQueryResult::not_configured();
        assert!(s.summary().contains("service not configured"));
    }
}
