//! Bounded retry-poll used by every collaborator wait.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};

/// How long to keep probing and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub timeout_ms: u64,
    pub interval_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            interval_ms: 100,
        }
    }
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Run `check` until it yields `Some`, sleeping `interval` between attempts.
///
/// The check always runs at least once. Returns `None` once the deadline
/// passes without a hit. Sleeps yield to the runtime, so the caller's other
/// tasks keep running.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + policy.timeout();
    loop {
        if let Some(hit) = check().await {
            return Some(hit);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(policy.interval().min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn returns_first_hit() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let hit = poll_until(PollPolicy::default(), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            (n == 3).then_some(n)
        })
        .await;
        assert_eq!(hit, Some(3));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_deadline() {
        let policy = PollPolicy::new(Duration::from_millis(1_000), Duration::from_millis(100));
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let start = Instant::now();
        let hit: Option<()> = poll_until(policy, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            None
        })
        .await;
        assert!(hit.is_none());
        assert!(start.elapsed() >= Duration::from_millis(1_000));
        assert!(start.elapsed() < Duration::from_millis(1_100));
        // Initial check plus one per interval up to and including the deadline.
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_checks_once() {
        let policy = PollPolicy::new(Duration::ZERO, Duration::from_millis(100));
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let hit: Option<()> = poll_until(policy, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            None
        })
        .await;
        assert!(hit.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
