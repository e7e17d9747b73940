//! Terminal interaction for the watchdog
//!
//! Keeps all user-facing prompting behind one seam so the remediation
//! logic stays testable without a terminal.

use std::io::{BufRead, Write};

/// Yes/no question capability injected into the remediation coordinator
pub trait ConsentPrompt: Send + Sync {
    /// Ask the user a yes/no question; `false` on any read failure
    fn confirm(&self, question: &str) -> bool;
}

/// Interactive prompt on stdin/stdout
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl StdinPrompt {
    /// Create a prompt bound to the controlling terminal
    pub fn new() -> Self {
        Self
    }
}

impl ConsentPrompt for StdinPrompt {
    fn confirm(&self, question: &str) -> bool {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if write!(out, "{} [y/N] ", question).and_then(|()| out.flush()).is_err() {
            return false;
        }

        let stdin = std::io::stdin();
        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer).is_err() {
            return false;
        }

        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Non-interactive prompt that declines every question
///
/// Used when the watchdog runs detached from a terminal, so an elevation
/// fallback never silently terminates processes without a user decision.
#[derive(Debug, Default)]
pub struct DenyAll;

impl ConsentPrompt for DenyAll {
    fn confirm(&self, _question: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_all_declines() {
        assert!(!DenyAll.confirm("proceed?"));
    }
}
