//! Auto-start-at-login toggling
//!
//! Manages an XDG autostart desktop entry for the watchdog. Every
//! operation is idempotent; a missing entry disables cleanly.

use crate::error::{Error, Result};
use std::fs;
use std::path::PathBuf;

/// Entry file name inside the autostart directory
const ENTRY_FILE: &str = "watchkeep.desktop";

/// Toggles whether the watchdog launches at login
#[derive(Debug)]
pub struct AutostartEntry {
    directory: PathBuf,
}

impl AutostartEntry {
    /// Entry in the user's XDG autostart directory
    pub fn for_current_user() -> Result<Self> {
        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .ok_or_else(|| Error::Autostart("no home directory for the current user".into()))?;
        Ok(Self {
            directory: config_home.join("autostart"),
        })
    }

    /// Entry rooted at an explicit autostart directory
    pub fn in_directory(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn entry_path(&self) -> PathBuf {
        self.directory.join(ENTRY_FILE)
    }

    /// Register `executable_path` to launch at login
    pub fn enable(&self, executable_path: &str) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        let entry = format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name=Watchkeep\n\
             Comment=Application watchdog\n\
             Exec=\"{}\" run\n\
             X-GNOME-Autostart-enabled=true\n",
            executable_path
        );
        fs::write(self.entry_path(), entry)?;
        Ok(())
    }

    /// Remove the login entry; succeeds when it never existed
    pub fn disable(&self) -> Result<()> {
        match fs::remove_file(self.entry_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a login entry is currently present
    pub fn is_enabled(&self) -> bool {
        self.entry_path().is_file()
    }
}
