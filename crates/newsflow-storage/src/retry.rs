use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

/// Errors that know whether repeating the same call could succeed.
pub trait Classify {
    fn disposition(&self) -> RetryDisposition;
}

impl Classify for sqlx::Error {
    fn disposition(&self) -> RetryDisposition {
        classify_sqlx_error(self)
    }
}

/// Connection-class failures are retryable; anything the server rejected on
/// its merits (syntax, constraints, types) is not.
pub fn classify_sqlx_error(err: &sqlx::Error) -> RetryDisposition {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
            RetryDisposition::Retryable
        }
        sqlx::Error::Database(db) => match db.code() {
            Some(code)
                if code.starts_with("08")
                    || matches!(&*code, "57P01" | "57P02" | "57P03") =>
            {
                RetryDisposition::Retryable
            }
            _ => RetryDisposition::NonRetryable,
        },
        _ => RetryDisposition::NonRetryable,
    }
}

/// Fixed-delay retry for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
pub enum RetryFailure<E> {
    Permanent(E),
    Exhausted { attempts: usize, last: E },
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails permanently, or `max_attempts`
    /// transient failures have been seen. A policy of zero attempts still
    /// makes one call.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryFailure<E>>
    where
        E: Classify + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.disposition() == RetryDisposition::Retryable => {
                    if attempt >= attempts {
                        return Err(RetryFailure::Exhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "transient store error; retrying"
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(RetryFailure::Permanent(err)),
            }
        }
    }
}
