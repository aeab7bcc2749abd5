//! Declarative retry backoff schedule (§4.9, §9 Design Notes: "keep them
//! declarative in code… and reuse in tests").
//!
//! The schedule is keyed by the job's `attempts_left` *before* the claim's
//! decrement: a fresh job (`attempts_left=4`) is rescheduled +5 min out; a job on
//! its second claim (`attempts_left=3`) +15 min; its third (`attempts_left=2`)
//! +45 min. A job claimed with `attempts_left=1` decrements to 0 and becomes
//! terminal — no further `scheduled_at` matters since it is no longer claimable.

use chrono::{DateTime, Duration, Utc};

const SCHEDULE: [(i32, i64); 3] = [(4, 5), (3, 15), (2, 45)];

/// The delay (in minutes) to apply when a job with `attempts_left_before_decrement`
/// is claimed, or `None` once it has exhausted its retries.
pub fn backoff_minutes(attempts_left_before_decrement: i32) -> Option<i64> {
    SCHEDULE
        .iter()
        .find(|(attempts, _)| *attempts == attempts_left_before_decrement)
        .map(|(_, minutes)| *minutes)
}

pub fn next_scheduled_at(
    attempts_left_before_decrement: i32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    backoff_minutes(attempts_left_before_decrement).map(|minutes| now + Duration::minutes(minutes))
}

/// A job is "overdue" for health reporting when it is still active and more than
/// ten minutes past its effective due time (§4.9: health endpoint).
pub const OVERDUE_THRESHOLD_MINUTES: i64 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_matches_spec_backoff_sequence() {
        assert_eq!(backoff_minutes(4), Some(5));
        assert_eq!(backoff_minutes(3), Some(15));
        assert_eq!(backoff_minutes(2), Some(45));
    }

    #[test]
    fn exhausted_attempts_have_no_backoff() {
        assert_eq!(backoff_minutes(1), None);
        assert_eq!(backoff_minutes(0), None);
    }

    #[test]
    fn next_scheduled_at_adds_the_right_delay() {
        let now = Utc::now();
        let scheduled = next_scheduled_at(4, now).unwrap();
        assert_eq!(scheduled, now + Duration::minutes(5));
    }
}
