use std::time::Duration;

/// Per-frame retry and failure-budget policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional read attempts after a failed decode
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every following retry
    pub backoff_base: Duration,
    /// Back-to-back skipped frames that abort the extraction
    pub max_consecutive_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            max_consecutive_failures: 4,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): base, 2*base, 4*base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2_u32.saturating_pow(attempt)
    }
}

/// Blocks between retries
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
