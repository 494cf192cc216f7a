use std::collections::HashMap;
use std::sync::Mutex;

use time::OffsetDateTime;
use uuid::Uuid;

/// Interval the client is told to wait before the first re-poll.
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Poll budget per job; past this the job is treated as failed and the
/// charge refunded.
pub const MAX_POLL_ATTEMPTS: u32 = 180;

const BACKOFF_DOUBLE_EVERY: u32 = 30;
const BACKOFF_MAX_DOUBLINGS: u32 = 3;

/// The one debit attached to an in-flight generation job.
#[derive(Debug, Clone)]
pub struct PendingCharge {
    pub user_id: Uuid,
    pub charged: f64,
    pub submitted_at: OffsetDateTime,
    pub polls: u32,
}

/// Correlates upstream job handles with the charge taken at submission, for
/// the duration of one debit. Settling removes the entry, so a terminal
/// failure refunds at most once.
#[derive(Default)]
pub struct JobTracker {
    jobs: Mutex<HashMap<String, PendingCharge>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: &str, user_id: Uuid, charged: f64) {
        let mut jobs = self.jobs.lock().expect("job tracker poisoned");
        jobs.insert(
            operation.to_string(),
            PendingCharge {
                user_id,
                charged,
                submitted_at: OffsetDateTime::now_utc(),
                polls: 0,
            },
        );
    }

    /// Count a status check against the job's poll budget. Returns the new
    /// poll count, or `None` for a job this process never tracked (e.g.
    /// submitted before a restart).
    pub fn note_poll(&self, operation: &str) -> Option<u32> {
        let mut jobs = self.jobs.lock().expect("job tracker poisoned");
        jobs.get_mut(operation).map(|job| {
            job.polls += 1;
            job.polls
        })
    }

    /// Detach the charge from a job that reached a terminal state. The first
    /// caller gets the charge; later calls see `None`.
    pub fn settle(&self, operation: &str) -> Option<PendingCharge> {
        let mut jobs = self.jobs.lock().expect("job tracker poisoned");
        jobs.remove(operation)
    }

    /// Exponential backoff hint for the client: doubles every
    /// `BACKOFF_DOUBLE_EVERY` polls, capped.
    pub fn suggested_retry_secs(polls: u32) -> u64 {
        POLL_INTERVAL_SECS << (polls / BACKOFF_DOUBLE_EVERY).min(BACKOFF_MAX_DOUBLINGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_returns_the_charge_exactly_once() {
        let tracker = JobTracker::new();
        let user = Uuid::new_v4();
        tracker.record("operations/abc", user, 5.0);

        let charge = tracker.settle("operations/abc").expect("first settle");
        assert_eq!(charge.user_id, user);
        assert_eq!(charge.charged, 5.0);

        assert!(tracker.settle("operations/abc").is_none());
    }

    #[test]
    fn polls_accumulate_per_job() {
        let tracker = JobTracker::new();
        tracker.record("op", Uuid::new_v4(), 5.0);
        assert_eq!(tracker.note_poll("op"), Some(1));
        assert_eq!(tracker.note_poll("op"), Some(2));
        assert_eq!(tracker.note_poll("unknown"), None);
    }

    #[test]
    fn untracked_job_is_not_pollable() {
        let tracker = JobTracker::new();
        assert!(tracker.note_poll("operations/ghost").is_none());
        assert!(tracker.settle("operations/ghost").is_none());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(JobTracker::suggested_retry_secs(0), 10);
        assert_eq!(JobTracker::suggested_retry_secs(29), 10);
        assert_eq!(JobTracker::suggested_retry_secs(30), 20);
        assert_eq!(JobTracker::suggested_retry_secs(60), 40);
        assert_eq!(JobTracker::suggested_retry_secs(90), 80);
        // Cap holds well past the poll budget.
        assert_eq!(JobTracker::suggested_retry_secs(10_000), 80);
    }
}
