//! Security event sink used by the admission guard.

use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// How serious a security event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A fire-and-forget security event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityEvent {
    /// Short machine-readable kind, e.g. `rate_limit_block`
    pub event_type: String,
    /// Human-readable context
    pub details: String,
    pub severity: Severity,
}

impl SecurityEvent {
    pub fn new(event_type: &str, details: impl Into<String>, severity: Severity) -> Self {
        Self {
            event_type: event_type.to_string(),
            details: details.into(),
            severity,
        }
    }
}

/// Destination for security events.
///
/// Implementations must not fail or block for long; the guard calls this
/// while serving a login request and ignores the outcome.
pub trait SecurityLog: Send + Sync {
    fn log_security(&self, event: SecurityEvent);
}

/// Security log that emits `tracing` events under the `security` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSecurityLog;

impl SecurityLog for TracingSecurityLog {
    fn log_security(&self, event: SecurityEvent) {
        match event.severity {
            Severity::Info => info!(
                target: "security",
                event_type = %event.event_type,
                details = %event.details,
                "Security event"
            ),
            Severity::Warning => warn!(
                target: "security",
                event_type = %event.event_type,
                details = %event.details,
                "Security event"
            ),
            Severity::Critical => error!(
                target: "security",
                event_type = %event.event_type,
                details = %event.details,
                "Security event"
            ),
        }
    }
}
