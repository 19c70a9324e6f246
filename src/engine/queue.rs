// src/engine/queue.rs

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Run requests waiting for a free slot below `max_active_runs`.
///
/// Semantics:
/// - Requests are served first in, first out.
/// - A logical date is never queued twice; a repeated request is dropped.
/// - The queue does not know about active runs; callers check those before
///   recording a request.
#[derive(Debug, Default)]
pub struct RunQueue {
    pending: VecDeque<DateTime<Utc>>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if there are no queued requests.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, logical_date: DateTime<Utc>) -> bool {
        self.pending.contains(&logical_date)
    }

    /// Record a request; returns `false` if the date was already queued.
    pub fn record_request(&mut self, logical_date: DateTime<Utc>) -> bool {
        if self.contains(logical_date) {
            debug!(%logical_date, "run already queued; dropping duplicate request");
            return false;
        }

        self.pending.push_back(logical_date);
        debug!(%logical_date, queued = self.pending.len(), "run request queued");
        true
    }

    /// Take the oldest queued request.
    pub fn pop_next(&mut self) -> Option<DateTime<Utc>> {
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fifo_without_duplicates() {
        let d1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let mut q = RunQueue::new();
        assert!(q.record_request(d1));
        assert!(q.record_request(d2));
        assert!(!q.record_request(d1));
        assert_eq!(q.len(), 2);

        assert_eq!(q.pop_next(), Some(d1));
        assert_eq!(q.pop_next(), Some(d2));
        assert!(q.is_empty());
    }
}
