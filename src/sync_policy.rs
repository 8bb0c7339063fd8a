use crate::error::AppError;

/// Receives "retry requested" signals from the synchronizer. The UI decides; the core never loops on its own.
pub trait RetryHandler {
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn retry_requested(&self, error: &AppError, attempt: u32) -> bool;
}

/// Never retries. Used where no one is around to answer (tests, scripted runs).
pub struct NoRetry;

impl RetryHandler for NoRetry {
    fn retry_requested(&self, _error: &AppError, _attempt: u32) -> bool {
        false
    }
}

/// Bounded retry for directory transfers.
///
/// Policy:
/// - only retryable errors ([`AppError::is_retryable`]) are offered for retry;
/// - every retry needs an explicit yes from the [`RetryHandler`];
/// - at most `max_attempts` attempts run in total, whatever the handler says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn single_attempt() -> Self {
        Self::new(1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn run<T, F>(&self, handler: &dyn RetryHandler, mut op: F) -> Result<T, AppError>
    where
        F: FnMut(u32) -> Result<T, AppError>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    log::warn!("attempt {attempt}/{} failed: {err}", self.max_attempts);
                    if !handler.retry_requested(&err, attempt) {
                        return Err(err);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
