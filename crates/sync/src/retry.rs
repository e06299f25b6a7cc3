// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry for remote calls.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::remote::RemoteResult;

/// Pause before each retry. The first attempt is immediate.
pub const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(9),
];

/// Retries after the first attempt.
pub const MAX_RETRIES: usize = RETRY_BACKOFF.len();

/// Source of sleeps, injectable so tests can observe backoff without waiting.
pub trait Delay: Send + Sync {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

impl Delay for TokioDelay {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Runs `call` until it succeeds, fails permanently, or runs out of retries.
///
/// `RemoteError::NotFound` is returned at once. Any other error is retried
/// after the next [`RETRY_BACKOFF`] delay; once the delays are used up the
/// last error is wrapped in [`SyncError::RetriesExhausted`] with `operation`
/// as its label.
pub async fn retry_with_backoff<T, F, Fut, D>(delay: &D, operation: &str, mut call: F) -> Result<T>
where
    D: Delay + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = RemoteResult<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err.into()),
            Err(err) => err,
        };

        let Some(&backoff) = RETRY_BACKOFF.get(attempt) else {
            tracing::warn!("{} failed after {} retries: {}", operation, MAX_RETRIES, err);
            return Err(SyncError::RetriesExhausted {
                operation: operation.to_string(),
                retries: MAX_RETRIES,
                source: err,
            });
        };
        attempt += 1;
        tracing::warn!(
            "{} failed, retry {}/{} in {:?}: {}",
            operation,
            attempt,
            MAX_RETRIES,
            backoff,
            err
        );
        delay.sleep(backoff).await;
    }
}
