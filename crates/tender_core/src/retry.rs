use crate::{ErrorKind, SearchError};

/// Escalating cooldowns for the automatic retry countdown.
pub const DEFAULT_AUTO_RETRY_COOLDOWNS: [u32; 3] = [10, 20, 30];
pub const DEFAULT_MAX_AUTO_RETRIES: u32 = 3;

/// Tunable automatic-retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Cooldown in seconds indexed by the number of automatic retries already made.
    pub cooldowns: Vec<u32>,
    pub max_auto_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldowns: DEFAULT_AUTO_RETRY_COOLDOWNS.to_vec(),
            max_auto_retries: DEFAULT_MAX_AUTO_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Cooldown for the next automatic retry, clamped to the last table entry.
    pub fn cooldown_for(&self, retries_so_far: u32) -> u32 {
        let index = (retries_so_far as usize).min(self.cooldowns.len().saturating_sub(1));
        self.cooldowns.get(index).copied().unwrap_or(0)
    }
}

/// What to do about one classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPlan {
    pub cooldown_secs: u32,
    pub auto_retry: bool,
    pub max_auto_retries: u32,
}

impl RetryPlan {
    pub fn for_error(error: &SearchError, policy: &RetryPolicy) -> Self {
        match error.kind {
            ErrorKind::Transient => Self {
                cooldown_secs: manual_cooldown_secs(error),
                auto_retry: policy.max_auto_retries > 0,
                max_auto_retries: policy.max_auto_retries,
            },
            ErrorKind::Validation => Self {
                cooldown_secs: error
                    .data
                    .get("retry_after")
                    .and_then(|secs| secs.parse().ok())
                    .unwrap_or_else(|| manual_cooldown_secs(error)),
                auto_retry: false,
                max_auto_retries: 0,
            },
            ErrorKind::Unknown => Self {
                cooldown_secs: manual_cooldown_secs(error),
                auto_retry: false,
                max_auto_retries: 0,
            },
            ErrorKind::Authentication | ErrorKind::Authorization | ErrorKind::Cancelled => Self {
                cooldown_secs: 0,
                auto_retry: false,
                max_auto_retries: 0,
            },
        }
    }
}

/// Non-escalating cooldown shown on the manual "try again" affordance.
pub fn manual_cooldown_secs(error: &SearchError) -> u32 {
    match error.status {
        Some(429) => 30,
        Some(500) => 20,
        _ if error.is_timeout() => 15,
        _ => 10,
    }
}

/// Countdown toward the next automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    /// Attempt whose failure started the countdown.
    pub attempt: crate::AttemptId,
    pub remaining_secs: u32,
}

/// Automatic retry bookkeeping owned by the controller state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AutoRetry {
    pub retries: u32,
    pub countdown: Option<Countdown>,
}

impl AutoRetry {
    pub fn can_retry(&self, plan: &RetryPlan) -> bool {
        plan.auto_retry && self.retries < plan.max_auto_retries
    }

    /// Clears bookkeeping; only a user-initiated submit calls this.
    pub fn reset(&mut self) {
        self.retries = 0;
        self.countdown = None;
    }
}
