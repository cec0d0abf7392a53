use thiserror::Error;

use crate::retry::RetryFailure;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
    #[error("store operation `{operation}` failed after {attempts} attempts: {last}")]
    RetryExhausted {
        operation: &'static str,
        attempts: usize,
        #[source]
        last: Box<StoreError>,
    },
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::UniqueViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        StoreError::Database(err)
    }

    pub(crate) fn from_retry(operation: &'static str, failure: RetryFailure<sqlx::Error>) -> Self {
        match failure {
            RetryFailure::Permanent(err) => Self::from_sqlx(err),
            RetryFailure::Exhausted { attempts, last } => StoreError::RetryExhausted {
                operation,
                attempts,
                last: Box::new(Self::from_sqlx(last)),
            },
        }
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, StoreError::RetryExhausted { .. })
    }
}
