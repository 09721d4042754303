mod sliding_window;

pub use sliding_window::{Admission, SlidingWindowBackend};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Window length used when a caller does not specify one.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// The caller gave up on a request before it was admitted.
///
/// The request was never counted against the quota.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Request was cancelled while waiting for rate limiter admission")]
pub struct Cancelled;

/// Describes an implementation of a rate limiting store and algorithm.
///
/// A Backend is required to implement [Clone], usually this means wrapping its state within an
/// [Arc](std::sync::Arc) so that every clone shares the same quota.
#[async_trait]
pub trait Backend: Clone + Send + Sync + 'static {
    type RollbackToken: Send + 'static;
    type Error: Send + 'static;

    /// Wait until the request may proceed.
    ///
    /// Resolves once the request has been admitted, returning a token that allows the admission
    /// to be rolled back later. Must fail without consuming quota if `cancel` fires first.
    async fn request(&self, cancel: &CancellationToken)
        -> Result<Self::RollbackToken, Self::Error>;

    /// Under certain conditions we may not want a request to count against the quota.
    ///
    /// E.g. a response that was served from a local cache never reached the remote host, we can
    /// only find that out after having already admitted the request, so we must give the slot
    /// back afterwards.
    ///
    /// # Arguments
    ///
    /// * `token`: The token returned from the initial call to [Backend::request()].
    async fn rollback(&self, token: Self::RollbackToken) -> Result<(), Self::Error>;
}

/// The number of requests permitted within a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    permits: u32,
    period: Duration,
}

impl Quota {
    /// # Panics
    ///
    /// Panics if `permits` is zero or `period` is zero; such a limiter would either admit nothing
    /// or admit everything.
    pub fn new(permits: u32, period: Duration) -> Self {
        assert!(permits > 0, "Quota permits must be non-zero");
        assert!(!period.is_zero(), "Quota period must be non-zero");
        Self { permits, period }
    }

    /// A quota over the [DEFAULT_PERIOD] of one second.
    pub fn per_second(permits: u32) -> Self {
        Self::new(permits, DEFAULT_PERIOD)
    }

    pub fn permits(&self) -> u32 {
        self.permits
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// A point-in-time view of a sliding window.
#[derive(Debug, Clone)]
pub struct QuotaStatus {
    /// Total number of requests that are permitted within the window.
    pub limit: u64,
    /// Number of requests that would be admitted right now without waiting.
    pub remaining: u64,
    /// Time at which the oldest admission leaves the window, freeing a slot.
    pub reset: Instant,
}

impl QuotaStatus {
    /// Seconds until the next slot frees up (rounded upwards, so that a slot is guaranteed to be
    /// free after waiting for the duration).
    pub fn seconds_until_reset(&self) -> u64 {
        let millis = self
            .reset
            .saturating_duration_since(Instant::now())
            .as_millis() as f64;
        (millis / 1000f64).ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_seconds_until_reset() {
        let status = QuotaStatus {
            limit: 0,
            remaining: 0,
            reset: Instant::now() + Duration::from_secs(60),
        };
        tokio::time::advance(Duration::from_secs_f64(29.9)).await;
        // Verify rounded upwards from 30.1
        assert_eq!(status.seconds_until_reset(), 31);
    }

    #[test]
    fn test_per_second_uses_default_period() {
        let quota = Quota::per_second(3);
        assert_eq!(quota.permits(), 3);
        assert_eq!(quota.period(), Duration::from_secs(1));
    }

    #[test]
    #[should_panic(expected = "permits must be non-zero")]
    fn test_zero_permits_rejected() {
        Quota::new(0, Duration::from_secs(1));
    }

    #[test]
    #[should_panic(expected = "period must be non-zero")]
    fn test_zero_period_rejected() {
        Quota::new(1, Duration::ZERO);
    }

    #[test]
    fn test_cancelled_message() {
        assert_eq!(
            Cancelled.to_string(),
            "Request was cancelled while waiting for rate limiter admission"
        );
    }
}
