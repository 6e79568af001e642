//! Error types for the individual phases of a benchmark run.
//!
//! Preparation errors are fatal and abort a run before any worker is dispatched. Task and harvest
//! errors only stop the harvest loop; cleanup and reporting still happen afterwards.

use std::io;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinError;

use crate::id::ObjectId;

/// Errors returned by a [`Repository`](crate::remote::Repository) or
/// [`ClusterSizeProvider`](crate::remote::ClusterSizeProvider).
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request could not be sent or its response body could not be read.
    #[error("request failed: {context}")]
    Request {
        context: String,
        #[source]
        cause: reqwest::Error,
    },

    /// The repository answered with a non-success status code.
    #[error("{context}: unexpected status {status}")]
    Status { context: String, status: StatusCode },

    /// The repository answered with a body we could not interpret.
    #[error("invalid response: {context}")]
    Parse { context: String },

    /// A bulk operation failed for some of its objects.
    #[error("{failed} of {total} objects failed")]
    Partial { failed: usize, total: usize },

    /// Any other repository-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Fatal errors while preparing the object population.
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("failed to create benchmark objects")]
    CreateObjects(#[source] RemoteError),

    #[error("failed to create benchmark datastreams")]
    CreateDatastreams(#[source] RemoteError),
}

/// Failure of a single worker task, observed by the harvest loop.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The remote action for this object failed.
    #[error("action on object {id} failed")]
    Remote {
        id: ObjectId,
        #[source]
        source: RemoteError,
    },

    /// The pool was shut down before this task obtained a slot.
    #[error("task was abandoned before it started")]
    Abandoned,

    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(#[from] JoinError),
}

/// Reasons for the harvest loop to stop before collecting every result.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("task {} of {total} failed", .index + 1)]
    Task {
        index: usize,
        total: usize,
        #[source]
        source: TaskError,
    },

    #[error("interrupted while waiting for workers")]
    Interrupted,

    #[error("failed to write duration log")]
    Log(#[source] io::Error),
}
