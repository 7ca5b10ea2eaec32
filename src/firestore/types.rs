//! Project record abstraction, write payloads, and error types.

use crate::google::AuthError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while reading or writing Firestore documents.
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// The target document does not exist (updates never create documents).
    #[error("document not found: {0}")]
    NotFound(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Firestore responded with an unexpected status code.
    #[error("unexpected Firestore response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Firestore.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Access token could not be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Document path or base URL could not be encoded.
    #[error("invalid Firestore URL: {0}")]
    InvalidUrl(String),
}

/// Ordered set of dotted field paths and the values to write at each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdates {
    entries: Vec<(String, Value)>,
}

impl FieldUpdates {
    /// Create an empty update set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` (dot separated, e.g. `analysis.status`) to `value`.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((path.into(), value.into()));
        self
    }

    /// Field paths in insertion order, as used for the update mask.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    /// Value written at `path`, if present.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == path)
            .map(|(_, value)| value)
    }

    /// Number of field paths in the update.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the update is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expand dotted paths into a nested JSON object.
    pub fn to_nested(&self) -> Map<String, Value> {
        let mut root = Map::new();
        for (path, value) in &self.entries {
            let mut segments = path.split('.').peekable();
            let mut cursor = &mut root;
            while let Some(segment) = segments.next() {
                if segments.peek().is_none() {
                    cursor.insert(segment.to_string(), value.clone());
                    break;
                }
                let entry = cursor
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                let Value::Object(next) = entry else {
                    break;
                };
                cursor = next;
            }
        }
        root
    }
}

/// Append-only audit entry written to the `history` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    /// Project the event belongs to.
    pub project_id: String,
    /// Action tag, e.g. `ANALYSIS_COMPLETED`.
    pub action: String,
    /// Identity that performed the action.
    pub user_id: String,
    /// Human readable description.
    pub details: String,
}

impl HistoryEvent {
    /// Document fields for the event; the timestamp is assigned by the server.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("projectId".into(), Value::String(self.project_id.clone()));
        fields.insert("action".into(), Value::String(self.action.clone()));
        fields.insert("userId".into(), Value::String(self.user_id.clone()));
        fields.insert("details".into(), Value::String(self.details.clone()));
        fields
    }
}

/// Decoded project document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDocument {
    /// Document identifier within the `projects` collection.
    pub id: String,
    /// Document fields decoded to plain JSON.
    pub fields: Map<String, Value>,
}

/// Uploaded file entry listed on a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    /// File name as stored under `projects/{id}/`.
    pub name: String,
    /// MIME type reported at upload time.
    pub content_type: Option<String>,
}

impl ProjectDocument {
    /// Files listed in the `documents` array, skipping malformed entries.
    pub fn files(&self) -> Vec<ProjectFile> {
        let Some(Value::Array(entries)) = self.fields.get("documents") else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?.to_string();
                let content_type = entry
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(ProjectFile { name, content_type })
            })
            .collect()
    }

    /// First file that is a PDF by MIME type or extension.
    pub fn first_pdf(&self) -> Option<ProjectFile> {
        self.files().into_iter().find(|file| {
            file.content_type.as_deref() == Some("application/pdf")
                || file.name.to_lowercase().ends_with(".pdf")
        })
    }
}

/// Access to the externally owned project records and their history.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Update fields on an existing project; fails with `NotFound` if the project is missing.
    async fn update_fields(
        &self,
        project_id: &str,
        updates: &FieldUpdates,
    ) -> Result<(), FirestoreError>;

    /// Append a history event stamped with the server time.
    async fn append_history(&self, event: &HistoryEvent) -> Result<(), FirestoreError>;

    /// Fetch a project document, returning `None` when it does not exist.
    async fn get_project(&self, project_id: &str)
    -> Result<Option<ProjectDocument>, FirestoreError>;
}
