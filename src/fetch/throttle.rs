//! Fixed pacing delay between fetches.
//!
//! A [`Throttle`] is a non-negative pause applied after each completed fetch,
//! success or failure. Sequential iteration pauses after every record; in the
//! dispatcher each worker slot pauses after its own fetch, so pacing is per
//! worker rather than global.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use record_fetcher::fetch::Throttle;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let throttle = Throttle::from_secs_f64(0.25)?;
//! assert_eq!(throttle.delay(), Duration::from_millis(250));
//! throttle.pause().await;
//!
//! assert!(Throttle::from_secs_f64(-1.0).is_err());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

/// Error for an unusable throttle value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThrottleError {
    /// Negative, NaN or infinite seconds.
    #[error("invalid throttle {seconds}: must be a finite number of seconds >= 0")]
    Invalid {
        /// The rejected value.
        seconds: f64,
    },
}

/// Fixed, non-negative delay applied after each fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    /// Creates a throttle pausing for `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Creates a throttle that never pauses.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates a throttle from fractional seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::Invalid`] for negative or non-finite input.
    pub fn from_secs_f64(seconds: f64) -> Result<Self, ThrottleError> {
        Duration::try_from_secs_f64(seconds)
            .map(Self::new)
            .map_err(|_| ThrottleError::Invalid { seconds })
    }

    /// Returns the configured delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns whether pausing is a no-op.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero()
    }

    /// Sleeps for the configured delay.
    #[instrument(level = "trace", skip(self), fields(delay_ms = self.delay.as_millis()))]
    pub async fn pause(&self) {
        if self.is_disabled() {
            return;
        }
        debug!("throttling");
        tokio::time::sleep(self.delay).await;
    }
}
