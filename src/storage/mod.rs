//! Object storage access for uploaded project documents.

pub mod client;
pub mod types;

pub use client::GcsObjectStore;
pub use types::{ObjectStore, StorageError};
