//! Error types and result types for data-access operations.
//!
//! Every fallible operation in this crate returns [`DocGateResult<T>`]. "No matching
//! document" is never an error: single-document operations report it through a
//! `bool` or `Option` instead.

use std::time::Duration;

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::driver::BulkWriteResult;

/// Boxed error produced by a driver implementation, kept verbatim.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents all possible errors that can occur when going through the access layer.
#[derive(Error, Debug)]
pub enum DocGateError {
    /// Serialization/deserialization error when converting between Rust values and BSON/JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during client construction, configuration or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An argument has the wrong shape, e.g. a pipeline where an operator document is required.
    /// Reported without any network call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// An update document was rejected by the mutation guard before dispatch.
    #[error("Unsafe update in {operator}: {reason}")]
    UnsafeUpdate {
        /// The operator whose value failed the check (`$set` or `$unset`).
        operator: String,
        /// Which rule the value violated.
        reason: String,
    },
    /// The operation did not complete within the client's configured timeout.
    #[error("Operation {command} timed out after {timeout:?}")]
    Timeout {
        command: &'static str,
        timeout: Duration,
    },
    /// An error reported by the underlying document-store driver.
    #[error("Driver error: {0}")]
    Driver(#[source] BoxError),
    /// A step of a session or transaction helper failed.
    #[error("Transaction step {stage} failed: {source}")]
    Transaction {
        stage: &'static str,
        #[source]
        source: Box<DocGateError>,
    },
    /// A bulk write stopped at the model at `index`. Models before it were applied
    /// and are counted in `completed`.
    #[error("Bulk write stopped at model {index}: {source}")]
    BulkWrite {
        index: usize,
        completed: BulkWriteResult,
        #[source]
        source: Box<DocGateError>,
    },
    /// Metric registration failed.
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl DocGateError {
    /// Wraps a driver error without altering it.
    pub fn driver<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        DocGateError::Driver(err.into())
    }

    /// Wraps an error with the name of the multi-step helper stage that produced it.
    pub fn transaction(stage: &'static str, source: DocGateError) -> Self {
        DocGateError::Transaction {
            stage,
            source: Box::new(source),
        }
    }

    /// Wraps the failure of one bulk-write model with the counts applied before it.
    pub fn bulk_write(index: usize, completed: BulkWriteResult, source: DocGateError) -> Self {
        DocGateError::BulkWrite {
            index,
            completed,
            source: Box::new(source),
        }
    }

    /// Returns `true` when the error came from local validation and no request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DocGateError::InvalidArgument(_) | DocGateError::UnsafeUpdate { .. }
        )
    }
}

/// A specialized `Result` type for access-layer operations.
pub type DocGateResult<T> = Result<T, DocGateError>;

impl From<BsonError> for DocGateError {
    fn from(err: BsonError) -> Self {
        DocGateError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocGateError {
    fn from(err: SerdeJsonError) -> Self {
        DocGateError::Serialization(err.to_string())
    }
}

impl From<prometheus::Error> for DocGateError {
    fn from(err: prometheus::Error) -> Self {
        DocGateError::Metrics(err.to_string())
    }
}
