//! Command-line interface for Watchkeep
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Watchkeep - application watchdog
#[derive(Parser)]
#[command(name = "watchkeep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "watchkeep.json")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the watchdog until interrupted (SIGHUP reloads the configuration)
    Run,

    /// Probe every configured application once and print the results
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Restart one application (service first, then processes)
    Restart {
        /// Application display name (case-insensitive)
        application: String,

        /// Answer no to any consent prompt instead of asking
        #[arg(long)]
        non_interactive: bool,
    },

    /// Validate the configuration file
    Check,

    /// Manage the launch-at-login entry
    Autostart {
        #[command(subcommand)]
        action: AutostartAction,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Actions for the autostart command
#[derive(Subcommand)]
pub enum AutostartAction {
    /// Register the watchdog to launch at login
    Enable,

    /// Remove the launch-at-login entry
    Disable,

    /// Show whether launch at login is registered
    Status,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "watchkeep", &mut std::io::stdout());
    }
}
