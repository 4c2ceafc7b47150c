//! Per-client attempt records and the policy that governs them.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::config::GuardConfig;
use crate::error::{Result, ToolyardError};

/// Limits applied by the admission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardPolicy {
    /// Failed attempts tolerated inside one window
    pub max_attempts: u32,
    /// Length of the trailing window attempts are counted in
    pub window: Duration,
    /// How long a client stays blocked once the limit is reached
    pub cooldown: Duration,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::seconds(60),
            cooldown: Duration::minutes(30),
        }
    }
}

impl TryFrom<&GuardConfig> for GuardPolicy {
    type Error = ToolyardError;

    fn try_from(config: &GuardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_attempts: config.max_attempts,
            window: seconds("window_secs", config.window_secs)?,
            cooldown: seconds("cooldown_secs", config.cooldown_secs)?,
        })
    }
}

fn seconds(field: &str, secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| ToolyardError::Config(format!("guard.{} out of range: {}", field, secs)))
}

/// Start of the window ending at `now`, clamped to the earliest representable time.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Failed-attempt history for one client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAttemptRecord {
    /// Opaque caller-supplied identity
    pub client_id: String,
    /// Failed attempt timestamps, oldest first
    pub attempts: VecDeque<DateTime<Utc>>,
    /// End of the current cool-down, if one was imposed
    pub blocked_until: Option<DateTime<Utc>>,
}

impl ClientAttemptRecord {
    /// Create an empty record.
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            attempts: VecDeque::new(),
            blocked_until: None,
        }
    }

    /// Whether a cool-down is still running at `now`.
    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.blocked_until, Some(until) if until > now)
    }

    /// Whether a cool-down was imposed and has since run out.
    pub fn block_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.blocked_until, Some(until) if until <= now)
    }

    /// Drop attempts outside `(now - window, now]`.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        let cutoff = window_start(now, window);
        // Attempts are appended in time order, so stale ones sit at the front
        while let Some(&oldest) = self.attempts.front() {
            if oldest > cutoff {
                break;
            }
            self.attempts.pop_front();
        }
    }

    /// Count attempts inside `(now - window, now]` without pruning.
    pub fn count_in_window(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = window_start(now, window);
        self.attempts
            .iter()
            .filter(|&&at| at > cutoff && at <= now)
            .count()
    }

    /// Forget all history and any cool-down.
    pub fn reset(&mut self) {
        self.attempts.clear();
        self.blocked_until = None;
    }
}
