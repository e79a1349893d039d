//! Resilient store adapter: bounded fixed-backoff retries under a caller
//! deadline.
//!
//! An already-expired deadline fails before the wrapped store is touched, so
//! no write is issued on behalf of a caller that has given up. The same check
//! runs before every retry, and each attempt is bounded by what is left of
//! the deadline. Errors are not classified here; after the last attempt the
//! last observed error is returned as-is.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Deadline, Rows, Statement, Store};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

pub struct RetryStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Store> RetryStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<T, F, Fut>(&self, deadline: &Deadline, sql: &str, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        if deadline.is_expired() {
            log::warn!("retry adapter: deadline already exceeded before {:?}", sql);
            return Err(StoreError::DeadlineAlreadyExceeded);
        }

        let attempts = self.policy.attempts.max(1);
        let mut last_err = StoreError::DeadlineAlreadyExceeded;
        for attempt in 1..=attempts {
            if attempt > 1 {
                let wake = Instant::now() + self.policy.backoff;
                let wake = deadline.instant().map_or(wake, |at| wake.min(at));
                tokio::time::sleep_until(wake).await;
                if deadline.is_expired() {
                    log::warn!(
                        "retry adapter: deadline exceeded after {} attempt(s), last error: {}",
                        attempt - 1,
                        last_err
                    );
                    return Err(StoreError::DeadlineAlreadyExceeded);
                }
            }

            let result = match deadline.instant() {
                Some(at) => match tokio::time::timeout_at(at, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::DeadlineAlreadyExceeded),
                },
                None => op().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(StoreError::DeadlineAlreadyExceeded) => {
                    return Err(StoreError::DeadlineAlreadyExceeded)
                }
                Err(e) => {
                    log::warn!(
                        "retry adapter: attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl<S: Store> Store for RetryStore<S> {
    async fn execute(&self, deadline: &Deadline, stmt: &Statement) -> Result<u64, StoreError> {
        self.run(deadline, stmt.sql, || self.inner.execute(deadline, stmt))
            .await
    }

    async fn query_many(&self, deadline: &Deadline, stmt: &Statement) -> Result<Rows, StoreError> {
        self.run(deadline, stmt.sql, || self.inner.query_many(deadline, stmt))
            .await
    }
}
