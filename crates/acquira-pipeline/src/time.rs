//! Cancellable-sleep abstraction used by the polling loops.
//!
//! Poll loops hold a run for hours; injecting the sleeper keeps stage policy
//! testable without waiting wall-clock time.

use std::time::Duration;

use async_trait::async_trait;

/// Abstract sleep used between poll attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspend the task for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately; used by tests exercising poll loops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {}
}
