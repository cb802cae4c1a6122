use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window request throttle for the upstream API.
///
/// Keeps an ordered list of past admission instants; a call to [`admit`]
/// suspends until issuing one more request would not exceed `max_requests`
/// within the trailing window, then records the admission.
///
/// [`admit`]: RateLimiter::admit
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            admissions: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a request may be issued, then record it.
    ///
    /// The mutex is held across the wait, so concurrent callers are
    /// admitted one at a time in lock-acquisition order.
    pub async fn admit(&self) {
        let mut admissions = self.admissions.lock().await;

        loop {
            let now = Instant::now();
            while let Some(oldest) = admissions.front() {
                if now.duration_since(*oldest) >= self.window {
                    admissions.pop_front();
                } else {
                    break;
                }
            }

            if admissions.len() < self.max_requests {
                break;
            }

            // Window is full: wait until the oldest admission ages out.
            let oldest = *admissions.front().expect("window full but empty");
            let elapsed = now.duration_since(oldest);
            let wait = self.window.saturating_sub(elapsed);
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }

        admissions.push_back(Instant::now());
    }

    /// Number of admissions currently inside the trailing window.
    pub async fn in_window(&self) -> usize {
        let admissions = self.admissions.lock().await;
        let now = Instant::now();
        admissions
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_limit_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_millis(500));

        let start = Instant::now();
        limiter.admit().await;
        limiter.admit().await;
        limiter.admit().await;

        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test]
    async fn delays_request_exceeding_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(300));

        let start = Instant::now();
        limiter.admit().await;
        limiter.admit().await;
        // Third call must wait roughly until the first admission leaves the window.
        limiter.admit().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn old_admissions_are_pruned() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));

        limiter.admit().await;
        limiter.admit().await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Both previous admissions have aged out; no delay expected.
        let start = Instant::now();
        limiter.admit().await;
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(limiter.in_window().await, 1);
    }
}
