//! Firestore integration for project records and the history log.

pub mod client;
pub mod types;
pub mod value;

pub use client::FirestoreProjectStore;
pub use types::{
    FieldUpdates, FirestoreError, HistoryEvent, ProjectDocument, ProjectFile, ProjectStore,
};
