//! Retry utilities for throttled sync work.
//!
//! Rate-limit errors never loop inside the engine; the worker layer wraps a
//! whole stage in [`with_retry`] and backs off exponentially.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::sync::{ProgressCallback, SyncProgress, emit};

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Maximum retries of a throttled stage.
pub const MAX_RETRIES: usize = 5;

/// Configuration for retry operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    #[serde(with = "duration_ms")]
    pub min_delay: Duration,
    /// Maximum delay between retries.
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Run `operation`, retrying errors accepted by `is_retryable` with
/// exponential backoff.
///
/// Each retry is reported as [`SyncProgress::RateLimitBackoff`] and logged.
pub async fn with_retry<T, E, F, Fut, IsRetryable, ShortMsg>(
    mut operation: F,
    config: &RetryConfig,
    is_retryable: IsRetryable,
    short_message: ShortMsg,
    label: &str,
    on_progress: Option<&ProgressCallback>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    IsRetryable: Fn(&E) -> bool + Send + Sync + 'static,
    ShortMsg: Fn(&E) -> String + Send + Sync + 'static,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.clone().into_backoff())
        .notify(|err, dur| {
            let current_attempt = attempt.load(Ordering::SeqCst);
            emit(
                on_progress,
                SyncProgress::RateLimitBackoff {
                    label: label.to_string(),
                    retry_after_ms: dur.as_millis() as u64,
                    attempt: current_attempt,
                },
            );
            tracing::info!(
                label = %label,
                attempt = current_attempt,
                retry_in_ms = dur.as_millis() as u64,
                error = %short_message(err),
                "Throttled, retrying"
            );
        })
        .when(is_retryable)
        .await
}
