use std::{collections::VecDeque, time::Duration};

use tokio::time::{Instant, sleep_until};

/// Sliding-window limit on how many jobs may start per window.
///
/// Callers over the limit wait for the oldest start to leave the window; nothing
/// is rejected.
#[derive(Debug)]
pub(crate) struct SubmissionLimiter {
    window: Duration,
    max_starts: usize,
    starts: VecDeque<Instant>,
}

impl SubmissionLimiter {
    pub(crate) fn new(window: Duration, max_starts: u32) -> Self {
        let max_starts = (max_starts as usize).max(1);
        Self {
            window,
            max_starts,
            starts: VecDeque::with_capacity(max_starts),
        }
    }

    /// Reserve one start, waiting if the window is full. Returns `true` when the
    /// caller had to wait.
    pub(crate) async fn acquire(&mut self) -> bool {
        let mut waited = false;
        loop {
            let now = Instant::now();
            while let Some(oldest) = self.starts.front() {
                if now.duration_since(*oldest) >= self.window {
                    self.starts.pop_front();
                } else {
                    break;
                }
            }

            if self.starts.len() < self.max_starts {
                self.starts.push_back(now);
                return waited;
            }

            waited = true;
            match self.starts.front() {
                Some(oldest) => sleep_until(*oldest + self.window).await,
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn starts_within_the_limit_do_not_wait() {
        let mut limiter = SubmissionLimiter::new(Duration::from_secs(1), 3);
        for _ in 0..3 {
            assert!(!limiter.acquire().await);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn excess_starts_wait_for_the_window() {
        let mut limiter = SubmissionLimiter::new(Duration::from_millis(1000), 5);
        let began = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(limiter.acquire().await);
        assert!(began.elapsed() >= Duration::from_millis(1000));
        assert!(began.elapsed() < Duration::from_millis(1100));
    }
}
