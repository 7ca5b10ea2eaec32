//! Request, result, and error types for the analysis pipeline.

use crate::firestore::{FieldUpdates, FirestoreError, HistoryEvent};
use crate::geocoding::LocationCoordinate;
use crate::nlp::annotate::truncate_chars;
use crate::nlp::{EntityBuckets, RecognizerError};
use crate::storage::StorageError;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Characters kept in `analysis.summary` before the ellipsis.
pub const SUMMARY_CHARS: usize = 500;
/// Organisations persisted per document.
pub const MAX_ENTITIES: usize = 20;
/// Locations persisted per document.
pub const MAX_LOCATIONS: usize = 20;
/// Dates persisted per document.
pub const MAX_DATES: usize = 10;

/// History action recorded after a successful analysis.
pub const ANALYSIS_COMPLETED_ACTION: &str = "ANALYSIS_COMPLETED";
/// Identity used for history events written by this service.
pub const SYSTEM_USER_ID: &str = "system-ai";

/// A document to analyse for a project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Project record receiving the results.
    pub project_id: String,
    /// Object name inside the configured bucket.
    pub document_path: String,
}

impl AnalysisRequest {
    /// Build a request from owned parts.
    pub fn new(project_id: impl Into<String>, document_path: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            document_path: document_path.into(),
        }
    }
}

/// Failure while fetching the document into a local file.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The object store rejected or failed the download.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The temporary destination could not be created.
    #[error("could not create temporary file: {0}")]
    TempFile(#[source] std::io::Error),
}

/// Failure while turning the downloaded file into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The local file could not be read.
    #[error("could not read document: {0}")]
    Read(#[from] std::io::Error),
    /// The document is not a readable PDF.
    #[error("malformed PDF: {0}")]
    Malformed(String),
    /// The extraction worker stopped before returning.
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Failure of the generic entity recognizer.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// Recognizer call failed.
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// Failure while writing results to the project record.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Firestore write failed, including a missing project record.
    #[error(transparent)]
    Firestore(#[from] FirestoreError),
}

/// Error terminating an execution; its text is stored in `analysis.error`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Document download failed.
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    /// Text extraction failed.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Entity recognition failed.
    #[error("annotation failed: {0}")]
    Annotation(#[from] AnnotationError),
    /// Writing the results failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<RecognizerError> for PipelineError {
    fn from(err: RecognizerError) -> Self {
        Self::Annotation(err.into())
    }
}

/// Outcome of a successful execution, already capped for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// First characters of the document text.
    pub summary: String,
    /// Organisations, capped at [`MAX_ENTITIES`].
    pub entities: Vec<String>,
    /// Locations, capped at [`MAX_LOCATIONS`].
    pub locations: Vec<String>,
    /// Dates, capped at [`MAX_DATES`].
    pub dates: Vec<String>,
    /// All permits.
    pub permits: Vec<String>,
    /// All impact terms.
    pub impacts: Vec<String>,
    /// Geocoded locations.
    pub location_coords: Vec<LocationCoordinate>,
    /// Length of the full extracted text in characters.
    pub full_text_length: usize,
    /// Locations found before capping; reported in the history event.
    pub locations_found: usize,
}

impl AnalysisResult {
    /// Assemble the persisted result from the extracted text and recognition output.
    pub fn new(
        text: &str,
        buckets: EntityBuckets,
        location_coords: Vec<LocationCoordinate>,
    ) -> Self {
        let EntityBuckets {
            mut entities,
            mut locations,
            mut dates,
            permits,
            impacts,
        } = buckets;
        let locations_found = locations.len();
        entities.truncate(MAX_ENTITIES);
        locations.truncate(MAX_LOCATIONS);
        dates.truncate(MAX_DATES);

        Self {
            summary: summarize(text),
            entities,
            locations,
            dates,
            permits,
            impacts,
            location_coords,
            full_text_length: text.chars().count(),
            locations_found,
        }
    }

    /// Field writes for the success path.
    pub fn to_field_updates(&self) -> FieldUpdates {
        let coords: Vec<Value> = self
            .location_coords
            .iter()
            .map(|coord| {
                json!({
                    "name": coord.name,
                    "lat": coord.lat,
                    "lng": coord.lng,
                    "formatted_address": coord.formatted_address,
                })
            })
            .collect();

        FieldUpdates::new()
            .set("analysis.status", "COMPLETED")
            .set("analysis.summary", self.summary.as_str())
            .set("analysis.entities", self.entities.clone())
            .set("analysis.locations", self.locations.clone())
            .set("analysis.location_coords", coords)
            .set("analysis.dates", self.dates.clone())
            .set("analysis.permits", self.permits.clone())
            .set("analysis.impacts", self.impacts.clone())
            .set("analysis.fullTextLength", self.full_text_length)
            .set("metadata.status", "ANALYZED")
    }

    /// History entry appended after the success write.
    pub fn history_event(&self, project_id: &str) -> HistoryEvent {
        HistoryEvent {
            project_id: project_id.to_string(),
            action: ANALYSIS_COMPLETED_ACTION.to_string(),
            user_id: SYSTEM_USER_ID.to_string(),
            details: format!(
                "Analyse terminée. {} lieux identifiés.",
                self.locations_found
            ),
        }
    }
}

/// Field writes recording a failed execution.
pub fn error_updates(error: &PipelineError) -> FieldUpdates {
    FieldUpdates::new()
        .set("analysis.status", "ERROR")
        .set("analysis.error", error.to_string())
}

/// First [`SUMMARY_CHARS`] characters, followed by `...` when the text is longer.
pub fn summarize(text: &str) -> String {
    let head = truncate_chars(text, SUMMARY_CHARS);
    if head.len() < text.len() {
        format!("{head}...")
    } else {
        text.to_string()
    }
}
