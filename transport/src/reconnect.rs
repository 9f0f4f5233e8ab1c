//! Reconnection backoff for the transport channel.
//!
//! # Example
//!
//! ```rust
//! use caption_client_transport::reconnect::ReconnectPolicy;
//! use std::time::Duration;
//!
//! let policy = ReconnectPolicy::builder()
//!     .initial_delay(Duration::from_millis(250))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .max_attempts(Some(20))
//!     .build();
//!
//! assert!(policy.should_retry(3));
//! assert!(policy.delay_for_attempt(3) <= Duration::from_secs(10));
//! ```

use std::time::Duration;

/// Exponential backoff with jitter, used after the connection drops.
///
/// # Default Values
///
/// - `initial_delay`: 500ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0
/// - `max_attempts`: unbounded
/// - `jitter`: enabled
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt
    pub initial_delay: Duration,
    /// Cap for exponential backoff
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Give up after this many consecutive failures (`None` = never)
    pub max_attempts: Option<u32>,
    /// Scale each delay by a random factor in `0.5..=1.0`
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ReconnectPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> ReconnectPolicyBuilder {
        ReconnectPolicyBuilder {
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            max_attempts: None,
            jitter: true,
        }
    }

    /// Calculate delay for a given attempt number (0-indexed).
    ///
    /// `delay = min(initial_delay * multiplier^attempt, max_delay)`, then
    /// scaled by jitter when enabled.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        #[allow(clippy::cast_possible_wrap)]
        let exponent = attempt.min(64) as i32;
        let base_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            1.0
        };

        Duration::from_secs_f64(capped_secs * factor)
    }

    /// Whether attempt number `attempt` (0-indexed) may still run.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

/// Builder for [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectPolicyBuilder {
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ReconnectPolicyBuilder {
    /// Set delay before the first attempt.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Limit consecutive attempts (`None` retries forever).
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the [`ReconnectPolicy`].
    #[must_use]
    pub fn build(self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(500)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            max_attempts: self.max_attempts,
            jitter: self.jitter,
        }
    }
}
