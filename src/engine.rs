//! The monitoring engine
//!
//! Owns the periodic probe cycle. A timer tick and on-demand refresh
//! requests funnel into the same cycle function; a binary gate with a
//! non-blocking try-acquire ensures at most one cycle body runs at a time,
//! and a trigger arriving mid-cycle is dropped rather than queued. Each
//! completed cycle atomically replaces the latest status set and broadcasts
//! a completion notification.

use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::WatchdogConfiguration;
use crate::error::{Error, Result};
use crate::process::ProcessControl;
use crate::service::ServiceControl;
use crate::status::{ApplicationStatusSnapshot, CycleCompleted};

/// Events the engine receives
enum EngineEvent {
    /// Run a cycle now; `ack` resolves with the outcome, or `None` when the
    /// trigger was dropped because a cycle was already in progress
    Refresh {
        ack: Option<oneshot::Sender<Option<CycleCompleted>>>,
    },
    /// Swap the working configuration and reschedule the timer
    ApplyConfiguration(WatchdogConfiguration),
    /// Stop the engine event loop
    Shutdown,
}

/// Probe every configured application once and build the status set
///
/// Disabled applications are still probed so their last-known state stays
/// current; their computed health collapses to `MonitoringDisabled`.
fn run_cycle(
    config: &WatchdogConfiguration,
    service: &dyn ServiceControl,
    process: &dyn ProcessControl,
) -> Vec<ApplicationStatusSnapshot> {
    let mut statuses = Vec::with_capacity(config.applications.len());
    for application in &config.applications {
        let service_status = service.query_status(&application.service_name);
        let process_status = process.query_processes(&application.process_names);
        let snapshot = ApplicationStatusSnapshot::new(
            application,
            config.global_monitoring_enabled,
            service_status,
            process_status,
        );
        info!("{}", snapshot.summary());
        statuses.push(snapshot);
    }
    statuses
}

/// The monitoring engine event loop
pub struct MonitoringEngine {
    rx: mpsc::Receiver<EngineEvent>,
    tx: mpsc::Sender<EngineEvent>,
    config: WatchdogConfiguration,
    service: Arc<dyn ServiceControl>,
    process: Arc<dyn ProcessControl>,
    cycle_gate: Arc<Semaphore>,
    latest: Arc<Mutex<Vec<ApplicationStatusSnapshot>>>,
    completed_tx: broadcast::Sender<CycleCompleted>,
}

impl MonitoringEngine {
    /// Create an engine over the given probes
    pub fn new(
        config: WatchdogConfiguration,
        service: Arc<dyn ServiceControl>,
        process: Arc<dyn ProcessControl>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(100);
        let (completed_tx, _) = broadcast::channel(16);
        Self {
            rx,
            tx,
            config,
            service,
            process,
            cycle_gate: Arc::new(Semaphore::new(1)),
            latest: Arc::new(Mutex::new(Vec::new())),
            completed_tx,
        }
    }

    /// Get a handle for triggering and observing the engine
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.tx.clone(),
            latest: Arc::clone(&self.latest),
            completed_tx: self.completed_tx.clone(),
        }
    }

    /// Run the engine event loop
    ///
    /// This should be spawned as a tokio task. The periodic timer fires
    /// immediately on entry and then at the configured interval.
    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.config.monitoring_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                _ = ticker.tick() => None,
                event = self.rx.recv() => Some(event),
            };

            match event {
                None => self.start_cycle(None),
                Some(Some(EngineEvent::Refresh { ack })) => self.start_cycle(ack),
                Some(Some(EngineEvent::ApplyConfiguration(config))) => {
                    info!(
                        "Configuration applied; monitoring every {} minute(s)",
                        config.interval.total_minutes()
                    );
                    self.config = config;
                    ticker = tokio::time::interval(self.config.monitoring_interval());
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                }
                Some(Some(EngineEvent::Shutdown)) | Some(None) => break,
            }
        }

        debug!("Monitoring engine stopped");
    }

    /// Launch one cycle unless another is already in flight
    fn start_cycle(&self, ack: Option<oneshot::Sender<Option<CycleCompleted>>>) {
        let Ok(permit) = Arc::clone(&self.cycle_gate).try_acquire_owned() else {
            debug!("Monitoring cycle already in progress; trigger dropped");
            if let Some(ack) = ack {
                let _ = ack.send(None);
            }
            return;
        };

        let config = self.config.clone();
        let service = Arc::clone(&self.service);
        let process = Arc::clone(&self.process);
        let latest = Arc::clone(&self.latest);
        let completed_tx = self.completed_tx.clone();

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                run_cycle(&config, service.as_ref(), process.as_ref())
            })
            .await;

            match result {
                Ok(statuses) => {
                    *latest.lock().expect("status lock poisoned") = statuses.clone();
                    let event = CycleCompleted {
                        timestamp: Local::now(),
                        statuses,
                    };
                    let _ = completed_tx.send(event.clone());
                    if let Some(ack) = ack {
                        let _ = ack.send(Some(event));
                    }
                }
                Err(e) => {
                    error!("Monitoring cycle failure: {}", e);
                    if let Some(ack) = ack {
                        let _ = ack.send(None);
                    }
                }
            }

            drop(permit);
        });
    }
}

/// Handle for interacting with a running engine
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineEvent>,
    latest: Arc<Mutex<Vec<ApplicationStatusSnapshot>>>,
    completed_tx: broadcast::Sender<CycleCompleted>,
}

impl EngineHandle {
    /// Trigger a cycle and await its outcome
    ///
    /// Resolves with `None` when the trigger was dropped because another
    /// cycle was already running.
    pub async fn refresh_now(&self) -> Result<Option<CycleCompleted>> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(EngineEvent::Refresh { ack: Some(ack_tx) })
            .await
            .map_err(|_| Error::EngineStopped)?;
        ack_rx.await.map_err(|_| Error::EngineStopped)
    }

    /// Trigger a cycle without waiting for it (usable from sync code)
    pub fn request_refresh(&self) -> Result<()> {
        self.tx
            .try_send(EngineEvent::Refresh { ack: None })
            .map_err(|_| Error::EngineStopped)
    }

    /// Swap the engine's working configuration and reschedule the timer
    ///
    /// The in-flight cycle, if any, continues uninterrupted.
    pub async fn apply_configuration(&self, config: WatchdogConfiguration) -> Result<()> {
        self.tx
            .send(EngineEvent::ApplyConfiguration(config))
            .await
            .map_err(|_| Error::EngineStopped)
    }

    /// Clone of the most recently published status set
    pub fn latest_snapshot(&self) -> Vec<ApplicationStatusSnapshot> {
        self.latest.lock().expect("status lock poisoned").clone()
    }

    /// Subscribe to cycle-completed notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CycleCompleted> {
        self.completed_tx.subscribe()
    }

    /// Ask the engine to stop
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineEvent::Shutdown).await;
    }
}
