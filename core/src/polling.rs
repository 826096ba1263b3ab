//! Backoff Polling
//!
//! Repeatedly calls an async probe until a predicate over its result holds.
//! Probe errors are swallowed and polling continues; the last one seen is
//! reported if the attempt budget runs out.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use whalevault_config::PollingConfig;

/// Backoff schedule for [`poll_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl PollConfig {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            max_attempts,
        }
    }

    /// Constant interval, no growth.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self::new(interval, interval, 1.0, max_attempts)
    }

    /// Proof job polling schedule from the `[polling]` section.
    pub fn job_polling(settings: &PollingConfig) -> Self {
        Self::new(
            Duration::from_millis(settings.initial_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.multiplier,
            settings.max_attempts,
        )
    }

    /// Ledger confirmation schedule from the `[polling]` section.
    pub fn confirmation(settings: &PollingConfig) -> Self {
        Self::fixed(
            Duration::from_millis(settings.confirmation_interval_ms),
            settings.confirmation_max_attempts,
        )
    }

    // Saturates at `max_delay` when the product is not a valid duration.
    fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier.max(1.0))
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::job_polling(&PollingConfig::default())
    }
}

#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("polling gave up after {attempts} attempts")]
    Timeout {
        attempts: u32,
        last_error: Option<E>,
    },

    #[error("polling was cancelled")]
    Cancelled,
}

impl<E> PollError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PollError::Cancelled)
    }
}

/// Poll `probe` until `predicate` accepts its result.
///
/// The delay starts at `initial_delay` and is multiplied after every
/// unsuccessful attempt, capped at `max_delay`. There is no sleep after the
/// final attempt.
pub async fn poll_with_backoff<T, E, F, Fut, P>(
    probe: F,
    predicate: P,
    config: &PollConfig,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    poll_with_backoff_cancellable(probe, predicate, config, &CancellationToken::new()).await
}

/// [`poll_with_backoff`] that stops with [`PollError::Cancelled`] as soon as
/// `cancel` fires. The token is checked before every probe and raced against
/// every sleep.
pub async fn poll_with_backoff_cancellable<T, E, F, Fut, P>(
    mut probe: F,
    mut predicate: P,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        match probe().await {
            Ok(value) if predicate(&value) => return Ok(value),
            Ok(_) => {}
            Err(e) => {
                debug!(attempt, "poll probe failed");
                last_error = Some(e);
            }
        }

        if attempt == config.max_attempts {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        delay = config.next_delay(delay);
    }

    Err(PollError::Timeout {
        attempts: config.max_attempts,
        last_error,
    })
}
