//! Admission guard for login attempts.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::record::{ClientAttemptRecord, GuardPolicy};
use super::security::{SecurityEvent, SecurityLog, Severity, TracingSecurityLog};
use crate::clock::{Clock, SystemClock};

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Whether the client may attempt to authenticate
    pub allowed: bool,
    /// Message suitable for showing to the user
    pub message: String,
    /// Failed attempts left before the client is blocked
    pub remaining_attempts: u32,
    /// Time left in the cool-down when not allowed
    pub retry_after: Option<Duration>,
}

impl Admission {
    fn allowed(remaining_attempts: u32) -> Self {
        Self {
            allowed: true,
            message: format!("{} attempt(s) remaining", remaining_attempts),
            remaining_attempts,
            retry_after: None,
        }
    }

    fn blocked(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            message: format!(
                "Too many failed login attempts. Try again in {} minute(s).",
                minutes_rounded_up(retry_after)
            ),
            remaining_attempts: 0,
            retry_after: Some(retry_after),
        }
    }
}

/// Read-only snapshot of a client's attempt state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptStatus {
    pub client_id: String,
    /// Failed attempts inside the current window
    pub attempts: u32,
    pub blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
    pub remaining_attempts: u32,
}

/// Tracks failed authentication attempts per client and decides admission.
///
/// The registry is shared by every session in the process and is safe to
/// use from multiple threads.
pub struct AdmissionGuard {
    /// Attempt records indexed by client id
    records: Mutex<HashMap<String, ClientAttemptRecord>>,
    policy: GuardPolicy,
    clock: Arc<dyn Clock>,
    security_log: Arc<dyn SecurityLog>,
}

impl AdmissionGuard {
    /// Create a guard using the system clock and the tracing security log.
    pub fn new(policy: GuardPolicy) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            policy,
            clock: Arc::new(SystemClock),
            security_log: Arc::new(TracingSecurityLog),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the security event sink.
    pub fn with_security_log(mut self, security_log: Arc<dyn SecurityLog>) -> Self {
        self.security_log = security_log;
        self
    }

    /// The policy this guard enforces.
    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Decide whether `client_id` may attempt to authenticate now.
    pub fn check(&self, client_id: &str) -> Admission {
        let now = self.clock.now();
        let max_attempts = self.policy.max_attempts;

        trace!(client_id = %client_id, "Checking admission");

        let (admission, blocked_until) = {
            let mut records = self.records.lock();
            let record = records.entry(client_id.to_string()).or_insert_with(|| {
                debug!(client_id = %client_id, "Creating attempt record");
                ClientAttemptRecord::new(client_id)
            });

            if let Some(until) = record.blocked_until {
                if until > now {
                    return Admission::blocked(until - now);
                }
                debug!(client_id = %client_id, "Cool-down expired, resetting record");
                record.reset();
            }

            record.prune(now, self.policy.window);
            let count = record.attempts.len() as u32;

            if count >= max_attempts {
                // Past the representable range the block simply never lapses
                let until = now
                    .checked_add_signed(self.policy.cooldown)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                record.blocked_until = Some(until);
                (Admission::blocked(until - now), Some(until))
            } else {
                (Admission::allowed(max_attempts - count), None)
            }
        };

        // Emit outside the registry lock
        if let Some(until) = blocked_until {
            debug!(client_id = %client_id, blocked_until = %until, "Client blocked");
            self.security_log.log_security(SecurityEvent::new(
                "rate_limit_block",
                format!(
                    "Client {} blocked until {} after {} failed attempts",
                    client_id,
                    until.to_rfc3339(),
                    max_attempts
                ),
                Severity::Warning,
            ));
        }

        admission
    }

    /// Record the outcome of an authentication attempt.
    pub fn record(&self, client_id: &str, success: bool) {
        let now = self.clock.now();
        let mut records = self.records.lock();

        if success {
            if let Some(record) = records.get_mut(client_id) {
                record.reset();
            }
            debug!(client_id = %client_id, "Successful login, attempt history cleared");
            return;
        }

        let record = records
            .entry(client_id.to_string())
            .or_insert_with(|| ClientAttemptRecord::new(client_id));

        if record.is_blocked(now) {
            trace!(client_id = %client_id, "Ignoring failure while blocked");
            return;
        }
        if record.block_expired(now) {
            record.reset();
        }

        record.prune(now, self.policy.window);
        if (record.attempts.len() as u32) < self.policy.max_attempts {
            record.attempts.push_back(now);
        }

        debug!(
            client_id = %client_id,
            attempts = record.attempts.len(),
            "Failed login recorded"
        );
    }

    /// Snapshot a client's state without modifying it.
    pub fn status(&self, client_id: &str) -> AttemptStatus {
        let now = self.clock.now();
        let records = self.records.lock();
        let max_attempts = self.policy.max_attempts;

        match records.get(client_id) {
            Some(record) if record.is_blocked(now) => AttemptStatus {
                client_id: client_id.to_string(),
                attempts: record.count_in_window(now, self.policy.window) as u32,
                blocked: true,
                blocked_until: record.blocked_until,
                remaining_attempts: 0,
            },
            // An expired cool-down wipes the history on the next check
            Some(record) if !record.block_expired(now) => {
                let attempts = record.count_in_window(now, self.policy.window) as u32;
                AttemptStatus {
                    client_id: client_id.to_string(),
                    attempts,
                    blocked: false,
                    blocked_until: None,
                    remaining_attempts: max_attempts.saturating_sub(attempts),
                }
            }
            _ => AttemptStatus {
                client_id: client_id.to_string(),
                attempts: 0,
                blocked: false,
                blocked_until: None,
                remaining_attempts: max_attempts,
            },
        }
    }

    /// Administrative override: forget everything about `client_id`.
    pub fn reset(&self, client_id: &str) {
        let existed = self.records.lock().remove(client_id).is_some();

        debug!(client_id = %client_id, existed = existed, "Attempt record reset");
        self.security_log.log_security(SecurityEvent::new(
            "rate_limit_reset",
            format!("Rate limit manually reset for client {}", client_id),
            Severity::Info,
        ));
    }

    /// Drop records with no in-window attempts and no running cool-down.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let window = self.policy.window;
        let mut records = self.records.lock();

        let before = records.len();
        records.retain(|_, record| {
            record.is_blocked(now) || record.count_in_window(now, window) > 0
        });
        let removed = before - records.len();

        if removed > 0 {
            debug!(removed = removed, remaining = records.len(), "Swept idle attempt records");
        }
        removed
    }

    /// Number of tracked client records.
    pub fn client_count(&self) -> usize {
        self.records.lock().len()
    }
}

impl Default for AdmissionGuard {
    fn default() -> Self {
        Self::new(GuardPolicy::default())
    }
}

fn minutes_rounded_up(duration: Duration) -> i64 {
    let secs = duration.num_seconds().max(0);
    ((secs + 59) / 60).max(1)
}
