//! Storage abstraction and error types.

use crate::google::AuthError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;
use thiserror::Error;

/// Errors returned while downloading an object.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object does not exist in the bucket.
    #[error("object not found: {0}")]
    NotFound(String),
    /// Credentials were rejected or lack read permission.
    #[error("access denied to object {path} ({status})")]
    AccessDenied {
        /// Object path that was requested.
        path: String,
        /// Status returned by the storage API.
        status: StatusCode,
    },
    /// Storage responded with an unexpected status code.
    #[error("unexpected storage response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from storage.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// HTTP layer failed before or while streaming the response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Access token could not be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Writing the local copy failed.
    #[error("failed to write local copy: {0}")]
    Io(#[from] std::io::Error),
    /// Configured base URL could not be used.
    #[error("invalid storage URL: {0}")]
    InvalidUrl(String),
}

/// Read-only access to the bucket holding project documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the object at `object_path` into `dest`, returning the number of bytes written.
    async fn download_to(&self, object_path: &str, dest: &Path) -> Result<u64, StorageError>;
}
