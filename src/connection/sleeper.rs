//! Injectable sleeping for backoff and cadence

use async_trait::async_trait;
use std::time::Duration;

/// Suspends the caller for a duration
///
/// Production code uses [`TokioSleeper`]; tests substitute a recorder so
/// backoff sequences can be asserted without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl<S: Sleeper + ?Sized> Sleeper for std::sync::Arc<S> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}
