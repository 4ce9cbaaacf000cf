// src/entry.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Age after which rotation is due, unless overridden per key.
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Usage cap before rotation is due, unless overridden per key.
pub const DEFAULT_MAX_USAGE_COUNT: u64 = 1000;
/// Failure cap before deactivation, unless overridden per key.
pub const DEFAULT_MAX_FAILURE_COUNT: u32 = 10;

/// One credential plus its health, usage, and age metadata.
///
/// There is no discrete state machine; eligibility is re-derived from the
/// counters by [`is_valid`](Self::is_valid) and
/// [`needs_rotation`](Self::needs_rotation) on every call, against a
/// caller-supplied `now`. Transitions return updated copies; the caller
/// replaces the stored element.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct KeyEntry {
    /// Unique within one service's pool, not globally.
    pub key_id: String,
    pub secret: String,
    pub service_name: String,
    pub created_at: DateTime<Utc>,
    /// Last successful or failed use.
    pub last_used_at: DateTime<Utc>,
    pub usage_count: u64,
    pub active: bool,
    pub rotation_interval: Duration,
    pub max_usage_count: u64,
    pub failure_count: u32,
    pub max_failure_count: u32,
}

impl KeyEntry {
    pub fn new(
        key_id: String,
        secret: String,
        service_name: String,
        now: DateTime<Utc>,
        rotation_interval: Duration,
        max_usage_count: u64,
        max_failure_count: u32,
    ) -> Self {
        Self {
            key_id,
            secret,
            service_name,
            created_at: now,
            last_used_at: now,
            usage_count: 0,
            active: true,
            rotation_interval,
            max_usage_count,
            failure_count: 0,
            max_failure_count,
        }
    }

    /// True when the key is due for deactivation on the next rotation pass:
    /// inactive, past its rotation interval, over its usage or failure cap,
    /// or idle for twice its rotation interval.
    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        !self.active
            || elapsed_at_least(self.created_at, now, self.rotation_interval)
            || self.usage_count >= self.max_usage_count
            || self.failure_count >= self.max_failure_count
            || elapsed_at_least(self.last_used_at, now, self.rotation_interval.saturating_mul(2))
    }

    /// True when the key is currently eligible for selection: active, under
    /// both caps, and younger than twice its rotation interval.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.failure_count < self.max_failure_count
            && self.usage_count < self.max_usage_count
            && !elapsed_at_least(self.created_at, now, self.rotation_interval.saturating_mul(2))
    }

    /// Records one use. `last_used_at` never moves backwards.
    #[must_use]
    pub fn mark_used(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_used_at: now.max(self.last_used_at),
            usage_count: self.usage_count + 1,
            ..self.clone()
        }
    }

    /// Records one failure.
    #[must_use]
    pub fn mark_failed(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_used_at: now.max(self.last_used_at),
            failure_count: self.failure_count + 1,
            ..self.clone()
        }
    }

    /// Refreshes `last_used_at` without counting a use.
    #[must_use]
    pub fn touch(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_used_at: now.max(self.last_used_at),
            ..self.clone()
        }
    }

    /// Marks the key ineligible for selection. No other field changes;
    /// deactivated entries stay in the pool for audit.
    #[must_use]
    pub fn deactivate(&self) -> Self {
        Self {
            active: false,
            ..self.clone()
        }
    }

    /// One-line health summary for status reports. Never contains the secret.
    pub fn summary_line(&self, now: DateTime<Utc>) -> String {
        let age_hours = now.signed_duration_since(self.created_at).num_hours();
        format!(
            "{}: active={} valid={} needs_rotation={} usage={}/{} failures={}/{} age_hours={}",
            self.key_id,
            self.active,
            self.is_valid(now),
            self.needs_rotation(now),
            self.usage_count,
            self.max_usage_count,
            self.failure_count,
            self.max_failure_count,
            age_hours,
        )
    }
}

/// True when at least `threshold` has passed between `since` and `now`.
/// A `now` before `since` (clock skew) never counts as elapsed.
fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    now.signed_duration_since(since).num_milliseconds() >= threshold_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry_at(now: DateTime<Utc>) -> KeyEntry {
        KeyEntry::new(
            "svc-1".to_string(),
            "secret-value".to_string(),
            "svc".to_string(),
            now,
            Duration::from_secs(3600),
            10,
            3,
        )
    }

    #[test]
    fn fresh_entry_is_valid_and_not_due() {
        let now = Utc::now();
        let entry = entry_at(now);

        assert!(entry.is_valid(now));
        assert!(!entry.needs_rotation(now));
    }

    #[test]
    fn rotation_due_after_interval_regardless_of_counters() {
        let now = Utc::now();
        let entry = entry_at(now);
        let later = now + chrono::Duration::seconds(3600);

        assert!(entry.needs_rotation(later));
        // Still selectable until twice the interval has passed.
        assert!(entry.is_valid(later));
        assert!(!entry.is_valid(now + chrono::Duration::seconds(7200)));
    }

    #[test]
    fn usage_cap_invalidates_even_while_active() {
        let now = Utc::now();
        let mut entry = entry_at(now);
        for _ in 0..10 {
            entry = entry.mark_used(now);
        }

        assert!(entry.active);
        assert!(!entry.is_valid(now));
        assert!(entry.needs_rotation(now));
    }

    #[test]
    fn failure_cap_invalidates() {
        let now = Utc::now();
        let mut entry = entry_at(now);
        for _ in 0..3 {
            entry = entry.mark_failed(now);
        }

        assert_eq!(entry.failure_count, 3);
        assert!(!entry.is_valid(now));
        assert!(entry.needs_rotation(now));
    }

    #[test]
    fn long_idle_entry_is_due_for_rotation() {
        let now = Utc::now();
        let used_at = now + chrono::Duration::seconds(10);
        let entry = entry_at(now).mark_used(used_at);

        let idle_deadline = used_at + chrono::Duration::seconds(7200);
        assert!(entry.needs_rotation(idle_deadline));
    }

    #[test]
    fn deactivate_changes_nothing_but_active() {
        let now = Utc::now();
        let entry = entry_at(now).mark_used(now).mark_failed(now);
        let deactivated = entry.deactivate();

        assert!(!deactivated.active);
        assert_eq!(deactivated.usage_count, entry.usage_count);
        assert_eq!(deactivated.failure_count, entry.failure_count);
        assert_eq!(deactivated.last_used_at, entry.last_used_at);
        assert!(!deactivated.is_valid(now));
        assert!(deactivated.needs_rotation(now));
    }

    #[test]
    fn touch_refreshes_last_used_without_counting() {
        let now = Utc::now();
        let entry = entry_at(now);
        let touched = entry.touch(now + chrono::Duration::seconds(5));

        assert_eq!(touched.usage_count, 0);
        assert_eq!(touched.last_used_at, now + chrono::Duration::seconds(5));
    }

    proptest! {
        #[test]
        fn mark_used_increments_once_and_never_rewinds(
            usage in 0u64..10_000,
            offset_secs in -3600i64..3600,
        ) {
            let now = Utc::now();
            let mut entry = entry_at(now);
            entry.usage_count = usage;

            let at = now + chrono::Duration::seconds(offset_secs);
            let updated = entry.mark_used(at);

            prop_assert_eq!(updated.usage_count, usage + 1);
            prop_assert!(updated.last_used_at >= entry.last_used_at);
        }
    }
}
