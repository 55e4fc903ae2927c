//! Exponential backoff retry for network-dependent git calls.
//!
//! Only failures whose stderr matches a fixed transient-network classifier
//! are retried. Structural failures ("branch already exists", bad refs,
//! missing directories) propagate immediately. That is a design invariant,
//! not a default: retrying them could turn one user error into several
//! mutations of the store.

use std::time::Duration;

use super::{GitError, GitResult};

/// Substrings of git stderr that indicate a transient network failure.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timed out",
    "could not resolve host",
    "couldn't resolve host",
    "name or service not known",
    "temporary failure in name resolution",
    "ssl",
    "tls",
    "gnutls",
    "the remote end hung up unexpectedly",
    "early eof",
    "network is unreachable",
    "operation timed out",
    "503",
    "502",
];

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (typically 2.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default policy: 3 attempts with 1s, 2s delays, capped at 30s.
    pub const DEFAULT: Self = Self {
        max_attempts: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
    };

    /// Computes the delay before retry number `attempt` (0-indexed).
    ///
    /// Grows as `initial_delay * backoff_multiplier^attempt`, capped at
    /// `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Iterator over all retry delays.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.delay_for_attempt(attempt))
    }

    /// Total maximum time spent sleeping across all retries.
    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whether a git failure looks like a transient network error.
///
/// Only command failures are ever classified transient: spawn failures
/// (binary missing, permission denied) and state errors are structural.
pub fn is_transient(error: &GitError) -> bool {
    match error {
        GitError::CommandFailed { stderr, .. } => {
            let lower = stderr.to_lowercase();
            TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
        }
        _ => false,
    }
}

/// Runs `operation`, retrying transient failures with exponential backoff.
///
/// `op_name` labels the operation in logs. The original error is returned
/// unchanged once attempts are exhausted or when the failure is not
/// transient.
pub fn with_retry<T>(
    op_name: &str,
    config: RetryConfig,
    mut operation: impl FnMut() -> GitResult<T>,
) -> GitResult<T> {
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;

                if !is_transient(&e) || attempt >= config.max_attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient git failure, retrying"
                );
                std::thread::sleep(delay);
            }
        }
    }
}
