//! Watchdog configuration: types, normalization, and the on-disk store
//!
//! The configuration persists as a JSON document with a single top-level
//! `"WatchdogConfig"` key wrapping the settings object, so sibling sections
//! can be added later without a schema break. Older documents that carry a
//! single-string `ProcessName` are upgraded in place on load.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, warn};

/// Upper bound for the monitoring interval, in minutes (one week)
const MAX_INTERVAL_MINUTES: i64 = 7 * 24 * 60;

/// Unit for the monitoring interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IntervalUnit {
    /// Interval magnitude counts minutes
    #[default]
    Minutes,
    /// Interval magnitude counts hours
    Hours,
    /// Interval magnitude counts days
    Days,
}

impl IntervalUnit {
    fn minutes_per_unit(self) -> i64 {
        match self {
            IntervalUnit::Minutes => 1,
            IntervalUnit::Hours => 60,
            IntervalUnit::Days => 24 * 60,
        }
    }
}

impl std::fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntervalUnit::Minutes => write!(f, "minutes"),
            IntervalUnit::Hours => write!(f, "hours"),
            IntervalUnit::Days => write!(f, "days"),
        }
    }
}

/// Monitoring interval: a positive magnitude plus a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IntervalSetting {
    /// Interval magnitude in units of `unit`
    pub value: i64,
    /// Unit the magnitude is expressed in
    pub unit: IntervalUnit,
}

impl Default for IntervalSetting {
    fn default() -> Self {
        Self {
            value: 5,
            unit: IntervalUnit::Minutes,
        }
    }
}

impl IntervalSetting {
    /// Total interval in minutes, clamped to [1, 10080]
    pub fn total_minutes(&self) -> i64 {
        let magnitude = self.value.max(1).min(MAX_INTERVAL_MINUTES);
        (magnitude * self.unit.minutes_per_unit()).clamp(1, MAX_INTERVAL_MINUTES)
    }

    /// Interval as a [`Duration`]
    pub fn to_duration(&self) -> Duration {
        Duration::from_secs(self.total_minutes() as u64 * 60)
    }

    /// Re-clamp the stored magnitude. Idempotent.
    pub fn normalize(&mut self) {
        self.value = self.value.max(1).min(MAX_INTERVAL_MINUTES);
    }
}

/// Canonicalize a process-name target: trim and strip a `.exe` suffix
pub fn normalize_process_name(name: &str) -> String {
    let trimmed = name.trim();
    let bytes = trimmed.as_bytes();
    let stripped = if bytes.len() >= 4 && bytes[bytes.len() - 4..].eq_ignore_ascii_case(b".exe") {
        &trimmed[..trimmed.len() - 4]
    } else {
        trimmed
    };
    stripped.to_string()
}

/// One named unit of supervision, backed by a service and/or processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MonitoredApplication {
    /// Unique display name (case-insensitive identity)
    pub name: String,

    /// OS service backing this application, empty when none
    pub service_name: String,

    /// Process-name targets, matched case-insensitively with `.exe` stripped
    pub process_names: Vec<String>,

    /// Executable used to relaunch the application, empty when none
    pub executable_path: String,

    /// Per-application monitoring toggle
    pub monitoring_enabled: bool,
}

impl Default for MonitoredApplication {
    fn default() -> Self {
        Self {
            name: String::new(),
            service_name: String::new(),
            process_names: Vec::new(),
            executable_path: String::new(),
            monitoring_enabled: true,
        }
    }
}

impl MonitoredApplication {
    /// Trim identity fields and canonicalize/deduplicate process targets
    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.service_name = self.service_name.trim().to_string();
        self.executable_path = self.executable_path.trim().to_string();

        let mut seen: HashSet<String> = HashSet::new();
        let mut targets = Vec::new();
        for raw in &self.process_names {
            let normalized = normalize_process_name(raw);
            if normalized.is_empty() {
                continue;
            }
            if seen.insert(normalized.to_lowercase()) {
                targets.push(normalized);
            }
        }
        self.process_names = targets;
    }
}

/// Aggregate root for all watchdog settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WatchdogConfiguration {
    /// Monitoring interval
    pub interval: IntervalSetting,

    /// Launch the watchdog at login
    pub auto_start: bool,

    /// Master monitoring switch
    pub global_monitoring_enabled: bool,

    /// Applications under supervision (order is display order only)
    pub applications: Vec<MonitoredApplication>,
}

impl Default for WatchdogConfiguration {
    fn default() -> Self {
        Self {
            interval: IntervalSetting::default(),
            auto_start: false,
            global_monitoring_enabled: true,
            applications: Vec::new(),
        }
    }
}

impl WatchdogConfiguration {
    /// Clamp the interval and canonicalize every application. Idempotent.
    pub fn normalize(&mut self) {
        self.interval.normalize();
        for application in &mut self.applications {
            application.normalize();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for application in &self.applications {
            if application.name.trim().is_empty() {
                return Err(Error::ConfigValidation(
                    "Application name must not be empty".into(),
                ));
            }
            if !names.insert(application.name.trim().to_lowercase()) {
                return Err(Error::ConfigValidation(format!(
                    "Duplicate application name: {}",
                    application.name
                )));
            }
        }
        Ok(())
    }

    /// Monitoring interval as a [`Duration`]
    pub fn monitoring_interval(&self) -> Duration {
        self.interval.to_duration()
    }

    /// Find an application by its case-insensitive display name
    pub fn get_application(&self, name: &str) -> Option<&MonitoredApplication> {
        self.applications
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name.trim()))
    }
}

/// Build the out-of-the-box configuration with one example application
pub fn default_configuration() -> WatchdogConfiguration {
    let mut config = WatchdogConfiguration {
        interval: IntervalSetting {
            value: 5,
            unit: IntervalUnit::Minutes,
        },
        auto_start: false,
        global_monitoring_enabled: true,
        applications: vec![MonitoredApplication {
            name: "Docker".to_string(),
            service_name: "docker".to_string(),
            process_names: vec!["dockerd".to_string()],
            executable_path: String::new(),
            monitoring_enabled: true,
        }],
    };
    config.normalize();
    config
}

/// Top-level key wrapping the configuration object on disk
const WRAPPER_KEY: &str = "WatchdogConfig";

/// Upgrade legacy document shapes in place before deserialization
///
/// Handles a single-string `ProcessName`, a string-valued `ProcessNames`,
/// and missing `MonitoringEnabled`/`ProcessNames` fields.
fn upgrade_legacy(config_node: &mut Value) {
    let Some(apps) = config_node
        .get_mut("Applications")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for app in apps {
        let Some(obj) = app.as_object_mut() else {
            continue;
        };

        match obj.get("ProcessNames") {
            Some(Value::String(single)) => {
                let single = single.clone();
                obj.insert("ProcessNames".into(), json!([single]));
            }
            Some(Value::Array(_)) => {}
            _ => {
                if let Some(Value::String(legacy)) = obj.get("ProcessName") {
                    let legacy = legacy.clone();
                    obj.insert("ProcessNames".into(), json!([legacy]));
                } else {
                    obj.insert("ProcessNames".into(), json!([]));
                }
            }
        }
        obj.remove("ProcessName");

        if !obj.get("MonitoringEnabled").is_some_and(Value::is_boolean) {
            obj.insert("MonitoringEnabled".into(), json!(true));
        }
    }
}

/// Parse a configuration document, applying legacy upgrades
fn parse_document(raw: &str) -> Result<WatchdogConfiguration> {
    let root: Value = serde_json::from_str(raw)?;
    let mut config_node = match root {
        Value::Object(mut map) => map.remove(WRAPPER_KEY).unwrap_or(Value::Object(Default::default())),
        _ => Value::Object(Default::default()),
    };
    upgrade_legacy(&mut config_node);
    let mut config: WatchdogConfiguration = serde_json::from_value(config_node)?;
    for application in &mut config.applications {
        if application.process_names.is_empty() && !application.service_name.trim().is_empty() {
            application.process_names.push(application.service_name.clone());
        }
    }
    config.normalize();
    Ok(config)
}

/// Render a configuration to its wrapped on-disk document
fn render_document(config: &WatchdogConfiguration) -> Result<String> {
    let root = json!({ WRAPPER_KEY: config });
    Ok(serde_json::to_string_pretty(&root)?)
}

/// Parse `path` strictly, propagating read, parse, and validation errors
///
/// Used by the `check` command; everything else goes through the tolerant
/// [`ConfigStore::load`].
pub fn load_strict(path: &Path) -> Result<WatchdogConfiguration> {
    let raw = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config = parse_document(&raw)?;
    config.validate()?;
    Ok(config)
}

/// Thread-safe owner of the mutable configuration
///
/// All mutation goes through [`ConfigStore::update`]; readers always get a
/// defensive copy. Disk failures are logged and swallowed so the watchdog
/// keeps running on a stale or default configuration.
pub struct ConfigStore {
    path: PathBuf,
    current: Mutex<WatchdogConfiguration>,
}

impl ConfigStore {
    /// Load the store from `path`, falling back to defaults on any failure
    pub fn load(path: &Path) -> Self {
        let config = Self::load_from_disk(path);
        Self {
            path: path.to_path_buf(),
            current: Mutex::new(config),
        }
    }

    /// Deep copy of the current configuration, safe to mutate
    pub fn snapshot(&self) -> WatchdogConfiguration {
        self.current.lock().expect("config lock poisoned").clone()
    }

    /// Apply `updater` to a copy of the current configuration
    ///
    /// Runs inside the store's exclusive section: the result is normalized,
    /// validated, persisted, and swapped in as the new current state. On a
    /// validation error the previous configuration is kept.
    pub fn update<F>(&self, updater: F) -> Result<WatchdogConfiguration>
    where
        F: FnOnce(WatchdogConfiguration) -> WatchdogConfiguration,
    {
        let mut guard = self.current.lock().expect("config lock poisoned");
        let mut updated = updater(guard.clone());
        updated.normalize();
        updated.validate()?;
        self.save_to_disk(&updated);
        *guard = updated.clone();
        Ok(updated)
    }

    /// Re-read the configuration file, replacing in-memory state
    ///
    /// Does not persist; a missing or malformed file falls back to defaults
    /// just like startup.
    pub fn reload(&self) -> WatchdogConfiguration {
        let config = Self::load_from_disk(&self.path);
        let mut guard = self.current.lock().expect("config lock poisoned");
        *guard = config.clone();
        config
    }

    fn load_from_disk(path: &Path) -> WatchdogConfiguration {
        if !path.exists() {
            return default_configuration();
        }

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to read config file '{}': {}", path.display(), e);
                return default_configuration();
            }
        };

        match parse_document(&raw) {
            Ok(config) => config,
            Err(e) => {
                error!(
                    "Failed to parse config file '{}', reverting to defaults: {}",
                    path.display(),
                    e
                );
                default_configuration()
            }
        }
    }

    fn save_to_disk(&self, config: &WatchdogConfiguration) {
        let document = match render_document(config) {
            Ok(document) => document,
            Err(e) => {
                error!("Failed to serialize configuration: {}", e);
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!("Failed to create config directory '{}': {}", parent.display(), e);
                }
            }
        }

        if let Err(e) = fs::write(&self.path, document) {
            error!("Failed to persist configuration to '{}': {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn app(name: &str) -> MonitoredApplication {
        MonitoredApplication {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_interval_clamps_low() {
        let mut interval = IntervalSetting {
            value: 0,
            unit: IntervalUnit::Minutes,
        };
        interval.normalize();
        assert_eq!(interval.value, 1);
        assert_eq!(interval.total_minutes(), 1);

        let negative = IntervalSetting {
            value: -30,
            unit: IntervalUnit::Hours,
        };
        assert_eq!(negative.total_minutes(), 60);
    }

    #[test]
    fn test_interval_clamps_high() {
        let interval = IntervalSetting {
            value: 30,
            unit: IntervalUnit::Days,
        };
        assert_eq!(interval.total_minutes(), 10_080);

        let minutes = IntervalSetting {
            value: 999_999,
            unit: IntervalUnit::Minutes,
        };
        assert_eq!(minutes.total_minutes(), 10_080);
    }

    #[test]
    fn test_interval_duration() {
        let interval = IntervalSetting {
            value: 2,
            unit: IntervalUnit::Hours,
        };
        assert_eq!(interval.to_duration(), Duration::from_secs(2 * 60 * 60));
    }

    #[test]
    fn test_process_name_normalization() {
        assert_eq!(normalize_process_name("  MyApp.EXE "), "MyApp");
        assert_eq!(normalize_process_name("myapp.exe"), "myapp");
        assert_eq!(normalize_process_name("MyApp"), "MyApp");
        assert_eq!(normalize_process_name("   "), "");
        assert_eq!(normalize_process_name(".exe"), "");
    }

    #[test]
    fn test_application_dedupes_process_names() {
        let mut application = app("Example");
        application.process_names = vec![
            "MyApp.EXE".to_string(),
            "myapp.exe".to_string(),
            "MyApp".to_string(),
            "  ".to_string(),
        ];
        application.normalize();
        assert_eq!(application.process_names, vec!["MyApp".to_string()]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let mut config = WatchdogConfiguration {
            interval: IntervalSetting {
                value: 0,
                unit: IntervalUnit::Days,
            },
            auto_start: true,
            global_monitoring_enabled: false,
            applications: vec![MonitoredApplication {
                name: "  Sonarr  ".to_string(),
                service_name: " sonarr ".to_string(),
                process_names: vec!["Sonarr.exe".to_string(), "SONARR".to_string()],
                executable_path: " /opt/sonarr/Sonarr ".to_string(),
                monitoring_enabled: true,
            }],
        };

        config.normalize();
        let once = config.clone();
        config.normalize();
        assert_eq!(config, once);
        assert_eq!(config.applications[0].process_names, vec!["Sonarr".to_string()]);
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let config = WatchdogConfiguration {
            applications: vec![app("Plex"), app("plex")],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = WatchdogConfiguration {
            applications: vec![app("   ")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_get_application_case_insensitive() {
        let config = WatchdogConfiguration {
            applications: vec![app("Plex")],
            ..Default::default()
        };
        assert!(config.get_application("PLEX").is_some());
        assert!(config.get_application(" plex ").is_some());
        assert!(config.get_application("radarr").is_none());
    }

    #[test]
    fn test_legacy_single_string_process_name() {
        let raw = r#"{
            "WatchdogConfig": {
                "Interval": { "Value": 10, "Unit": "Minutes" },
                "Applications": [
                    { "Name": "Legacy", "ServiceName": "legacy", "ProcessName": "Legacy.exe" }
                ]
            }
        }"#;

        let config = parse_document(raw).unwrap();
        assert_eq!(config.applications.len(), 1);
        assert_eq!(config.applications[0].process_names, vec!["Legacy".to_string()]);
        assert!(config.applications[0].monitoring_enabled);
        assert!(config.global_monitoring_enabled);
    }

    #[test]
    fn test_string_valued_process_names_upgraded() {
        let raw = r#"{
            "WatchdogConfig": {
                "Applications": [
                    { "Name": "Odd", "ProcessNames": "odd.exe" }
                ]
            }
        }"#;

        let config = parse_document(raw).unwrap();
        assert_eq!(config.applications[0].process_names, vec!["odd".to_string()]);
    }

    #[test]
    fn test_empty_process_names_fall_back_to_service_name() {
        let raw = r#"{
            "WatchdogConfig": {
                "Applications": [
                    { "Name": "Svc", "ServiceName": "svcd" }
                ]
            }
        }"#;

        let config = parse_document(raw).unwrap();
        assert_eq!(config.applications[0].process_names, vec!["svcd".to_string()]);
    }

    #[test]
    fn test_missing_wrapper_key_yields_defaults() {
        let config = parse_document("{}").unwrap();
        assert_eq!(config.interval, IntervalSetting::default());
        assert!(config.applications.is_empty());
    }

    #[test]
    fn test_load_strict_reports_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_strict(&dir.path().join("absent.json")),
            Err(Error::ConfigRead { .. })
        ));

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_strict(&path), Err(Error::ConfigParse(_))));

        let dup = dir.path().join("dup.json");
        fs::write(
            &dup,
            r#"{"WatchdogConfig":{"Applications":[{"Name":"A"},{"Name":"a"}]}}"#,
        )
        .unwrap();
        assert!(matches!(load_strict(&dup), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watchkeep.json");

        let store = ConfigStore::load(&path);
        let updated = store
            .update(|mut config| {
                config.applications.push(MonitoredApplication {
                    name: "Radarr".to_string(),
                    service_name: "radarr".to_string(),
                    process_names: vec!["Radarr.exe".to_string(), "radarr".to_string()],
                    executable_path: "/opt/radarr/Radarr".to_string(),
                    monitoring_enabled: false,
                });
                config.interval = IntervalSetting {
                    value: 2,
                    unit: IntervalUnit::Hours,
                };
                config
            })
            .unwrap();
        assert_eq!(updated.applications.len(), 2);

        let reloaded = ConfigStore::load(&path).snapshot();
        assert_eq!(reloaded, updated);
        assert_eq!(
            reloaded.get_application("radarr").unwrap().process_names,
            vec!["Radarr".to_string()]
        );
    }

    #[test]
    fn test_missing_file_builds_default() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(&dir.path().join("absent.json"));
        let config = store.snapshot();
        assert_eq!(config.applications.len(), 1);
        assert_eq!(config.applications[0].name, "Docker");
        assert!(config.global_monitoring_enabled);
    }

    #[test]
    fn test_malformed_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::load(&path);
        assert_eq!(store.snapshot(), default_configuration());
    }

    #[test]
    fn test_update_rejects_duplicate_and_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(&dir.path().join("watchkeep.json"));
        let before = store.snapshot();

        let result = store.update(|mut config| {
            config.applications.push(app("docker"));
            config
        });
        assert!(result.is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_snapshot_is_defensive_copy() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::load(&dir.path().join("watchkeep.json"));

        let mut snapshot = store.snapshot();
        snapshot.applications.clear();
        snapshot.global_monitoring_enabled = false;

        assert_eq!(store.snapshot().applications.len(), 1);
        assert!(store.snapshot().global_monitoring_enabled);
    }
}
