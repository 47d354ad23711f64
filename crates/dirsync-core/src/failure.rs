//! Failure streak bookkeeping: when to email administrators and when to
//! stop syncing a provider.

use time::{Duration, OffsetDateTime};

use crate::types::Provider;

/// Thresholds applied to a provider's failure streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Streak length at which administrators start getting emails.
    pub notify_after_failures: u32,
    /// Minimum time between two emails for the same streak.
    pub notification_cooldown: Duration,
    /// Streak length at which sync is disabled. `0` never disables.
    pub disable_after_failures: u32,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            notify_after_failures: 3,
            notification_cooldown: Duration::hours(24),
            disable_after_failures: 10,
        }
    }
}

/// What the orchestrator should do about one more failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Streak length including this failure.
    pub failures_in_streak: u32,
    pub notify: bool,
    pub disable: bool,
}

impl FailurePolicy {
    /// Evaluates the provider's streak as it will be after recording a
    /// failure at `now`.
    #[must_use]
    pub fn evaluate(&self, provider: &Provider, now: OffsetDateTime) -> FailureOutcome {
        let failures_in_streak = provider.last_syncs_failed.saturating_add(1);

        let cooled_down = provider
            .sync_error_emailed_at
            .is_none_or(|emailed_at| now - emailed_at >= self.notification_cooldown);
        let notify = failures_in_streak >= self.notify_after_failures.max(1) && cooled_down;

        let disable =
            self.disable_after_failures > 0 && failures_in_streak >= self.disable_after_failures;

        FailureOutcome {
            failures_in_streak,
            notify,
            disable,
        }
    }
}
