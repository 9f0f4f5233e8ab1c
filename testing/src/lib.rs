//! # Caption Client Testing
//!
//! Testing utilities for the caption client.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//! - [`MemoryConnector`] + [`FakeBackend`]: an in-memory socket with a
//!   scripted server side
//! - [`init_tracing`]: opt-in log output for debugging tests
//!
//! ## Example
//!
//! ```ignore
//! use caption_client_testing::{FakeBackend, MemoryConnector};
//!
//! #[tokio::test]
//! async fn login_round_trip() {
//!     let (connector, backend) = MemoryConnector::pair();
//!     let channel = TransportChannel::new(Arc::new(connector), ChannelConfig::default());
//!     channel.connect().await.unwrap();
//!
//!     let correlator = Correlator::new(channel, CorrelatorConfig::default());
//!     let pending = tokio::spawn(async move {
//!         correlator.request(MessageType::LogIn, json!({})).await
//!     });
//!
//!     let request = backend.expect_request(MessageType::LogIn).await;
//!     backend.reply(&request, 200, json!({"loginToken": "abc"}));
//!     assert!(pending.await.unwrap().unwrap().is_success());
//! }
//! ```

use chrono::{DateTime, Utc};
use caption_client_core::environment::Clock;

mod backend;

pub use backend::{FakeBackend, MemoryConnector, reply_to};
pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use caption_client_testing::mocks::FixedClock;
    /// use caption_client_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{FixedClock, test_clock};

/// Install a test subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
