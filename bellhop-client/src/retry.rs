//! Reconnect policy and scheduling abstraction.
//!
//! The subscriber never calls the timer wheel directly; every wait goes
//! through [`Scheduler`], so reconnect behavior is testable without
//! real timers and without recursive callback chains.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

/// Fixed-delay retry policy, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// 0 = unlimited attempts.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Retry forever with a fixed delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: 0,
        }
    }

    /// Retry with a fixed delay, giving up after `max_attempts`.
    pub fn capped(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Delay before the given attempt (1-based), `None` once exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts != 0 && attempt > self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }
}

/// Clock and timer abstraction.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, duration: Duration);
    fn now_millis(&self) -> i64;
}

/// Production scheduler backed by the tokio timer wheel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now_millis(&self) -> i64 {
        shared::util::now_millis()
    }
}

/// Scheduler whose sleeps complete immediately while recording what was
/// requested. Lets tests assert on scheduled waits without waiting.
#[derive(Debug, Clone, Default)]
pub struct InstantScheduler {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl InstantScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scheduler for InstantScheduler {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        // Yield so competing tasks still interleave.
        tokio::task::yield_now().await;
    }

    fn now_millis(&self) -> i64 {
        shared::util::now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_policy_never_exhausts() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.next_delay(10_000), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_capped_policy_exhausts() {
        let policy = RetryPolicy::capped(Duration::from_secs(1), 3);
        assert_eq!(policy.next_delay(3), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(4), None);
    }

    #[tokio::test]
    async fn test_instant_scheduler_records_sleeps() {
        let scheduler = InstantScheduler::new();
        scheduler.sleep(Duration::from_secs(5)).await;
        scheduler.sleep(Duration::from_secs(30)).await;
        assert_eq!(
            scheduler.slept(),
            vec![Duration::from_secs(5), Duration::from_secs(30)]
        );
    }
}
