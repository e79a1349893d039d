use thiserror::Error;
use uuid::Uuid;

use crate::models::FlatStatus;

/// Failures raised by the store layer. The resilient adapter surfaces these
/// unclassified; repositories decide what `NoRows` means for them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store: context deadline already exceeded")]
    DeadlineAlreadyExceeded,
    #[error("store: no rows in result set")]
    NoRows,
    #[error("store: connection pool error: {0}")]
    Pool(String),
    #[error("store: backend error: {0}")]
    Backend(String),
    #[error("store: row decode error: {0}")]
    Decode(String),
    #[error("store: blocking task failed: {0}")]
    Join(String),
}

/// Failures of the external message transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("sender: transport error: {0}")]
    Transport(String),
    #[error("sender: rejected by remote: {0}")]
    Rejected(String),
    #[error("sender: deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad request: {0}")]
    Validation(String),
    #[error("bad flat status: {0:?}")]
    BadStatus(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: FlatStatus, to: FlatStatus },
    #[error("house {house_id} already has {threshold} approved flats")]
    CapacityExceeded { house_id: i64, threshold: i64 },
    #[error("bad credentials for user {0}")]
    BadCredentials(Uuid),
    #[error("bad one-time code for user {0}")]
    BadCode(Uuid),
    #[error("one-time code expired or missing for user {0}")]
    CodeExpired(Uuid),
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },
    #[error("delivery failed: {0}")]
    Delivery(#[from] SendError),
    #[error("token error: {0}")]
    Token(String),
    #[error("hash error: {0}")]
    Hash(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Wraps a store failure with the operation and entity it concerned.
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        Error::Store {
            context: context.into(),
            source,
        }
    }

    pub fn is_deadline(&self) -> bool {
        matches!(
            self,
            Error::Store {
                source: StoreError::DeadlineAlreadyExceeded,
                ..
            } | Error::Delivery(SendError::DeadlineExceeded)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
