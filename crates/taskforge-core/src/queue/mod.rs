//! The in-process, three-priority ready-queue.
//!
//! Holds only task IDs -- never the authoritative record. A non-empty
//! `high` channel starves `medium` and `low`; within a channel, FIFO.
//! Single-process by design (`spec.md` §4.2's explicit allowance); on
//! restart, lost queue state is rediscovered via
//! [`crate::facade::SchedulerFacade::reconcile`].

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use taskforge_db::models::Priority;

/// A single-process ready-queue of eligible task IDs, partitioned by
/// priority.
#[derive(Default)]
pub struct ReadyQueue {
    high: Mutex<VecDeque<i64>>,
    medium: Mutex<VecDeque<i64>>,
    low: Mutex<VecDeque<i64>>,
    notify: Notify,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, priority: Priority) -> &Mutex<VecDeque<i64>> {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    /// Append `id` to the channel for `priority`. Not idempotent:
    /// correctness relies on callers (the Resolver) only pushing when the
    /// task is genuinely eligible.
    pub fn push(&self, id: i64, priority: Priority) {
        self.channel(priority)
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(id);
        self.notify.notify_one();
    }

    /// Pop the oldest ID from the highest non-empty priority channel,
    /// or `None` if all three are empty.
    pub fn pop_highest(&self) -> Option<i64> {
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            let mut channel = self
                .channel(priority)
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(id) = channel.pop_front() {
                return Some(id);
            }
        }
        None
    }

    /// Block until some channel is non-empty or `timeout` elapses. Returns
    /// `None` on timeout, matching the "times out cleanly" boundary
    /// behavior.
    pub async fn pop_highest_blocking(&self, timeout: Duration) -> Option<i64> {
        if let Some(id) = self.pop_highest() {
            return Some(id);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }

            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {
                    if let Some(id) = self.pop_highest() {
                        return Some(id);
                    }
                    // Spurious wakeup (another popper won the race): loop
                    // and re-check the remaining deadline.
                }
                _ = tokio::time::sleep(remaining) => {
                    return None;
                }
            }
        }
    }

    /// Number of IDs queued across all three channels. Used by
    /// [`crate::facade::SchedulerFacade::reconcile`] to decide whether a
    /// pending-eligible task is already represented.
    pub fn len(&self) -> usize {
        self.high.lock().unwrap_or_else(|e| e.into_inner()).len()
            + self
                .medium
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len()
            + self.low.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `id` is currently present in any channel.
    pub fn contains(&self, id: i64) -> bool {
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            let channel = self
                .channel(priority)
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if channel.contains(&id) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_priority_order() {
        let q = ReadyQueue::new();
        q.push(1, Priority::Low);
        q.push(2, Priority::High);
        q.push(3, Priority::Medium);
        q.push(4, Priority::High);

        assert_eq!(q.pop_highest(), Some(2));
        assert_eq!(q.pop_highest(), Some(4));
        assert_eq!(q.pop_highest(), Some(3));
        assert_eq!(q.pop_highest(), Some(1));
        assert_eq!(q.pop_highest(), None);
    }

    #[test]
    fn fifo_within_priority() {
        let q = ReadyQueue::new();
        q.push(10, Priority::Medium);
        q.push(11, Priority::Medium);
        q.push(12, Priority::Medium);

        assert_eq!(q.pop_highest(), Some(10));
        assert_eq!(q.pop_highest(), Some(11));
        assert_eq!(q.pop_highest(), Some(12));
    }

    #[tokio::test]
    async fn blocking_pop_times_out_cleanly() {
        let q = ReadyQueue::new();
        let result = q.pop_highest_blocking(Duration::from_millis(50)).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn blocking_pop_wakes_on_push() {
        use std::sync::Arc;

        let q = Arc::new(ReadyQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop_highest_blocking(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(42, Priority::High);

        let result = handle.await.unwrap();
        assert_eq!(result, Some(42));
    }

    #[test]
    fn contains_and_len() {
        let q = ReadyQueue::new();
        assert!(q.is_empty());
        q.push(1, Priority::Low);
        assert_eq!(q.len(), 1);
        assert!(q.contains(1));
        assert!(!q.contains(2));
    }
}
