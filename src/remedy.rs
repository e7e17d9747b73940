//! Restart orchestration with privilege-escalation handling
//!
//! A restart is entered only on explicit user action. The coordinator tries
//! the service path first, falls back to process termination plus relaunch,
//! and remembers per service whether a prior attempt hit an access-denied
//! refusal so later attempts can short-circuit to process-only mode once
//! the user consents. The memory is session-scoped and never persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::config::MonitoredApplication;
use crate::console::ConsentPrompt;
use crate::engine::EngineHandle;
use crate::process::ProcessControl;
use crate::service::{RestartOutcome, ServiceControl};

/// Session-scoped record for one service name
#[derive(Debug, Clone, Copy, Default)]
struct ElevationMemory {
    /// The last restart attempt failed with an access-denied refusal
    requires_elevation: bool,
    /// The user has been asked about the process-only fallback this session
    prompted: bool,
    /// The user accepted the process-only fallback
    consented: bool,
}

/// Coordinates the restart state machine for one application at a time
pub struct RemediationCoordinator {
    service: Arc<dyn ServiceControl>,
    process: Arc<dyn ProcessControl>,
    consent: Box<dyn ConsentPrompt>,
    engine: EngineHandle,
    memory: Mutex<HashMap<String, ElevationMemory>>,
}

impl RemediationCoordinator {
    /// Create a coordinator over the given probes and consent prompt
    pub fn new(
        service: Arc<dyn ServiceControl>,
        process: Arc<dyn ProcessControl>,
        consent: Box<dyn ConsentPrompt>,
        engine: EngineHandle,
    ) -> Self {
        Self {
            service,
            process,
            consent,
            engine,
            memory: Mutex::new(HashMap::new()),
        }
    }

    /// Restart one application
    ///
    /// Fire-and-forget: every partial failure is logged, nothing propagates,
    /// and the real outcome is judged by the refresh cycle triggered at the
    /// end. The only early exit is a declined consent prompt, which aborts
    /// the whole restart with no action taken.
    pub fn restart(&self, application: &MonitoredApplication) {
        info!("Restart requested for {}", application.name);

        let service_name = application.service_name.trim().to_string();
        let memory_key = service_name.to_lowercase();

        let mut skip_service = false;
        if !service_name.is_empty() {
            let recorded = self.recall(&memory_key);
            if recorded.consented {
                skip_service = true;
            } else if recorded.requires_elevation && !recorded.prompted {
                let accepted = self.consent.confirm(&format!(
                    "Restarting the service '{}' requires elevated privileges. \
                     Terminate and relaunch the processes for {} instead?",
                    service_name, application.name
                ));
                if !accepted {
                    self.record(&memory_key, |m| {
                        m.prompted = true;
                        m.consented = false;
                    });
                    info!(
                        "Restart of {} aborted: process-only fallback declined",
                        application.name
                    );
                    return;
                }
                self.record(&memory_key, |m| {
                    m.prompted = true;
                    m.consented = true;
                });
                skip_service = true;
            }
        }

        if !service_name.is_empty() && !skip_service {
            match self.service.restart_service(&service_name) {
                RestartOutcome::Success => {
                    self.forget(&memory_key);
                    info!("Restarted service for {}", application.name);
                }
                RestartOutcome::RequiresElevation(message) => {
                    self.record(&memory_key, |m| m.requires_elevation = true);
                    warn!(
                        "Service restart for {} requires elevation: {}",
                        application.name, message
                    );
                }
                RestartOutcome::Failure(message) => {
                    warn!("Service restart failed for {}: {}", application.name, message);
                }
                RestartOutcome::Skipped => {}
            }
        }

        // Process supervision is additive to the service path, so both
        // always run. Killing with no matches is a no-op.
        let terminated = self
            .process
            .kill_processes(&application.process_names, &application.name);
        if terminated {
            info!("Terminated processes for {}", application.name);
        }

        if !application.executable_path.trim().is_empty() {
            self.process
                .start_process(&application.executable_path, &application.name);
        }

        if self.engine.request_refresh().is_err() {
            warn!("Could not trigger a refresh after restarting {}", application.name);
        }
    }

    fn recall(&self, key: &str) -> ElevationMemory {
        self.memory
            .lock()
            .expect("elevation memory lock poisoned")
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    fn record<F: FnOnce(&mut ElevationMemory)>(&self, key: &str, apply: F) {
        let mut memory = self.memory.lock().expect("elevation memory lock poisoned");
        apply(memory.entry(key.to_string()).or_default());
    }

    fn forget(&self, key: &str) {
        self.memory
            .lock()
            .expect("elevation memory lock poisoned")
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchdogConfiguration;
    use crate::engine::MonitoringEngine;
    use crate::status::{ProcessQueryResult, ServiceQueryResult};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct ScriptedServiceProbe {
        outcomes: Mutex<Vec<RestartOutcome>>,
        restarts: AtomicUsize,
    }

    impl ScriptedServiceProbe {
        fn new(outcomes: Vec<RestartOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                restarts: AtomicUsize::new(0),
            }
        }
    }

    impl ServiceControl for ScriptedServiceProbe {
        fn query_status(&self, _service_name: &str) -> ServiceQueryResult {
            ServiceQueryResult::default()
        }

        fn restart_service(&self, _service_name: &str) -> RestartOutcome {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                RestartOutcome::Success
            } else {
                outcomes.remove(0)
            }
        }
    }

    #[derive(Default)]
    struct RecordingProcessProbe {
        kills: AtomicUsize,
        starts: AtomicUsize,
    }

    impl ProcessControl for RecordingProcessProbe {
        fn query_processes(&self, _target_names: &[String]) -> ProcessQueryResult {
            ProcessQueryResult::empty()
        }

        fn kill_processes(&self, _target_names: &[String], _application_name: &str) -> bool {
            self.kills.fetch_add(1, Ordering::SeqCst);
            false
        }

        fn start_process(&self, _executable_path: &str, _application_name: &str) -> bool {
            self.starts.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct ScriptedPrompt {
        answer: bool,
        asked: AtomicBool,
    }

    impl ScriptedPrompt {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                asked: AtomicBool::new(false),
            }
        }
    }

    impl ConsentPrompt for ScriptedPrompt {
        fn confirm(&self, _question: &str) -> bool {
            self.asked.store(true, Ordering::SeqCst);
            self.answer
        }
    }

    fn test_application() -> MonitoredApplication {
        MonitoredApplication {
            name: "App".to_string(),
            service_name: "appd".to_string(),
            process_names: vec!["app".to_string()],
            executable_path: "/opt/app/run".to_string(),
            monitoring_enabled: true,
        }
    }

    fn idle_engine_handle() -> EngineHandle {
        let engine = MonitoringEngine::new(
            WatchdogConfiguration::default(),
            Arc::new(ScriptedServiceProbe::new(Vec::new())),
            Arc::new(RecordingProcessProbe::default()),
        );
        engine.handle()
    }

    fn coordinator(
        service: Arc<ScriptedServiceProbe>,
        process: Arc<RecordingProcessProbe>,
        prompt: ScriptedPrompt,
    ) -> RemediationCoordinator {
        RemediationCoordinator::new(
            service as Arc<dyn ServiceControl>,
            process as Arc<dyn ProcessControl>,
            Box::new(prompt),
            idle_engine_handle(),
        )
    }

    #[test]
    fn test_success_runs_kill_and_start() {
        let service = Arc::new(ScriptedServiceProbe::new(vec![RestartOutcome::Success]));
        let process = Arc::new(RecordingProcessProbe::default());
        let coordinator = coordinator(
            Arc::clone(&service),
            Arc::clone(&process),
            ScriptedPrompt::new(true),
        );

        coordinator.restart(&test_application());

        assert_eq!(service.restarts.load(Ordering::SeqCst), 1);
        assert_eq!(process.kills.load(Ordering::SeqCst), 1);
        assert_eq!(process.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_declined_consent_aborts_without_action() {
        let service = Arc::new(ScriptedServiceProbe::new(vec![
            RestartOutcome::RequiresElevation("access denied".into()),
        ]));
        let process = Arc::new(RecordingProcessProbe::default());
        let prompt = ScriptedPrompt::new(false);
        let coordinator = coordinator(Arc::clone(&service), Arc::clone(&process), prompt);
        let application = test_application();

        // First attempt records the elevation refusal but still falls through
        // to the process path.
        coordinator.restart(&application);
        assert_eq!(process.kills.load(Ordering::SeqCst), 1);

        // Second attempt prompts; the decline aborts everything.
        coordinator.restart(&application);
        assert_eq!(service.restarts.load(Ordering::SeqCst), 1);
        assert_eq!(process.kills.load(Ordering::SeqCst), 1);
        assert_eq!(process.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_accepted_consent_skips_service_path() {
        let service = Arc::new(ScriptedServiceProbe::new(vec![
            RestartOutcome::RequiresElevation("access denied".into()),
        ]));
        let process = Arc::new(RecordingProcessProbe::default());
        let coordinator = coordinator(
            Arc::clone(&service),
            Arc::clone(&process),
            ScriptedPrompt::new(true),
        );
        let application = test_application();

        coordinator.restart(&application);
        assert_eq!(service.restarts.load(Ordering::SeqCst), 1);

        // Consent granted on the second attempt; the service path is skipped
        // and only processes are handled, now and on every later attempt.
        coordinator.restart(&application);
        coordinator.restart(&application);
        assert_eq!(service.restarts.load(Ordering::SeqCst), 1);
        assert_eq!(process.kills.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_successful_service_restart_clears_memory() {
        let service = Arc::new(ScriptedServiceProbe::new(vec![
            RestartOutcome::RequiresElevation("access denied".into()),
            RestartOutcome::Success,
        ]));
        let process = Arc::new(RecordingProcessProbe::default());
        let prompt = ScriptedPrompt::new(false);
        let coordinator = coordinator(Arc::clone(&service), Arc::clone(&process), prompt);
        let application = test_application();

        // Records the elevation refusal.
        coordinator.restart(&application);
        assert!(coordinator.recall("appd").requires_elevation);

        // Prompted, declined: aborts and marks the prompt as spent.
        coordinator.restart(&application);
        assert_eq!(service.restarts.load(Ordering::SeqCst), 1);

        // No re-prompt this session; the service path is retried and now
        // succeeds, wiping the memory entry.
        coordinator.restart(&application);
        assert_eq!(service.restarts.load(Ordering::SeqCst), 2);
        assert!(!coordinator.recall("appd").requires_elevation);
        assert!(!coordinator.recall("appd").prompted);
    }

    #[test]
    fn test_no_service_name_goes_straight_to_processes() {
        let service = Arc::new(ScriptedServiceProbe::new(Vec::new()));
        let process = Arc::new(RecordingProcessProbe::default());
        let coordinator = coordinator(
            Arc::clone(&service),
            Arc::clone(&process),
            ScriptedPrompt::new(true),
        );

        let mut application = test_application();
        application.service_name = String::new();
        coordinator.restart(&application);

        assert_eq!(service.restarts.load(Ordering::SeqCst), 0);
        assert_eq!(process.kills.load(Ordering::SeqCst), 1);
        assert_eq!(process.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blank_executable_path_is_not_launched() {
        let service = Arc::new(ScriptedServiceProbe::new(Vec::new()));
        let process = Arc::new(RecordingProcessProbe::default());
        let coordinator = coordinator(
            Arc::clone(&service),
            Arc::clone(&process),
            ScriptedPrompt::new(true),
        );

        let mut application = test_application();
        application.executable_path = "   ".to_string();
        coordinator.restart(&application);

        assert_eq!(process.starts.load(Ordering::SeqCst), 0);
    }
}
