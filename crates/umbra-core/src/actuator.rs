//! The protective action and its helpers.
//!
//! - [`Actuator`]: performs the lock
//! - [`Notifier`]: best-effort heads-up before the lock
//! - [`ActionProbe`]: tells the monitor whether the lock is already in effect
//!
//! The Linux implementations shell out to `loginctl`, `xdg-screensaver` and
//! `notify-send`. All calls are blocking; the action gate and the monitor's
//! lock check run them on a blocking worker.

use std::process::{Command, Output};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from performing the action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActuatorError {
    /// A lock method ran and failed.
    #[error("{method} failed: {message}")]
    MethodFailed {
        /// Which method.
        method: &'static str,
        /// Why.
        message: String,
    },

    /// Every method in the fallback chain failed.
    #[error("all lock methods failed: {}", .0.join("; "))]
    AllMethodsFailed(Vec<String>),
}

/// Performs the protective action.
pub trait Actuator: Send + Sync {
    /// Locks the session. May block.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be locked.
    fn perform_action(&self) -> Result<(), ActuatorError>;
}

/// Announces an imminent action. Failures are swallowed.
pub trait Notifier: Send + Sync {
    /// Called right before the action is performed.
    fn notify_before_action(&self);
}

/// Reports whether the protective action is currently in effect.
pub trait ActionProbe: Send + Sync {
    /// `true` while the session is locked. May block.
    fn is_action_in_effect(&self) -> bool;
}

fn run(program: &'static str, args: &[&str]) -> Result<Output, ActuatorError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ActuatorError::MethodFailed {
            method: program,
            message: e.to_string(),
        })?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(ActuatorError::MethodFailed {
            method: program,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// The logind session this process runs in; `auto` lets loginctl pick it.
fn session_id() -> String {
    std::env::var("XDG_SESSION_ID")
        .ok()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| "auto".to_string())
}

/// Locks the session this process runs in: `loginctl lock-session`, then
/// `xdg-screensaver lock`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLocker;

impl Actuator for SessionLocker {
    fn perform_action(&self) -> Result<(), ActuatorError> {
        let session = session_id();
        let mut failures = Vec::new();

        match run("loginctl", &["lock-session", &session]) {
            Ok(_) => {
                info!(session = %session, "session locked via loginctl");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "loginctl lock failed, trying xdg-screensaver");
                failures.push(e.to_string());
            }
        }

        match run("xdg-screensaver", &["lock"]) {
            Ok(_) => {
                info!("session locked via xdg-screensaver");
                Ok(())
            }
            Err(e) => {
                failures.push(e.to_string());
                Err(ActuatorError::AllMethodsFailed(failures))
            }
        }
    }
}

/// Actuator that only logs; used when running without real hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActuator;

impl Actuator for DryRunActuator {
    fn perform_action(&self) -> Result<(), ActuatorError> {
        info!("dry run: session would be locked now");
        Ok(())
    }
}

/// Desktop notification through `notify-send`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify_before_action(&self) {
        if let Err(e) = run(
            "notify-send",
            &[
                "--app-name=Umbra",
                "--urgency=critical",
                "Umbra",
                "Device out of range. Locking your session...",
            ],
        ) {
            debug!(error = %e, "lock notification not shown");
        }
    }
}

/// Reads logind's `LockedHint` for the session this process runs in.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLockProbe;

impl ActionProbe for SessionLockProbe {
    fn is_action_in_effect(&self) -> bool {
        let session = session_id();
        match run(
            "loginctl",
            &["show-session", &session, "-p", "LockedHint", "--value"],
        ) {
            Ok(output) => parse_locked_hint(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                debug!(error = %e, "cannot read LockedHint, assuming unlocked");
                false
            }
        }
    }
}

/// Probe that never reports the action as in effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInEffect;

impl ActionProbe for NeverInEffect {
    fn is_action_in_effect(&self) -> bool {
        false
    }
}

fn parse_locked_hint(value: &str) -> bool {
    matches!(value.trim(), "yes" | "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locked_hint() {
        assert!(parse_locked_hint("yes\n"));
        assert!(parse_locked_hint("true"));
        assert!(!parse_locked_hint("no\n"));
        assert!(!parse_locked_hint(""));
    }

    #[test]
    fn test_all_methods_failed_message() {
        let err = ActuatorError::AllMethodsFailed(vec![
            "loginctl failed: no session".to_string(),
            "xdg-screensaver failed: not found".to_string(),
        ]);
        let message = err.to_string();
        assert!(message.contains("loginctl"));
        assert!(message.contains("xdg-screensaver"));
    }

    #[test]
    fn test_session_id_always_names_a_session() {
        let id = session_id();
        assert!(!id.trim().is_empty());
        if std::env::var_os("XDG_SESSION_ID").is_none() {
            assert_eq!(id, "auto");
        }
    }

    #[test]
    fn test_dry_run_always_succeeds() {
        assert!(DryRunActuator.perform_action().is_ok());
        assert!(!NeverInEffect.is_action_in_effect());
    }
}
