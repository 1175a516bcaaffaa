//! Backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

/// Backoff for change-feed reconnects.
///
/// - Min delay: 500ms
/// - Max delay: 60s
/// - Max attempts: 20 per schedule
/// - Jitter enabled
pub fn reconnect_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(60))
        .with_max_times(20)
        .with_jitter()
}

/// Endless delay schedule over a backoff builder.
///
/// Restarts the schedule at its maximum delay once the builder is exhausted,
/// and at its minimum after [`Reconnect::reset`].
pub struct Reconnect<B: BackoffBuilder + Clone> {
    builder: B,
    current: B::Backoff,
    ceiling: Duration,
}

impl<B: BackoffBuilder + Clone> Reconnect<B> {
    pub fn new(builder: B, ceiling: Duration) -> Self {
        let current = builder.clone().build();
        Self {
            builder,
            current,
            ceiling,
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.current.next().unwrap_or(self.ceiling)
    }

    /// Start over from the minimum delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.builder.clone().build();
    }
}
