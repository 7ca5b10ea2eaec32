//! In-memory collaborators shared by pipeline, scheduler, and router tests.

use crate::firestore::{FieldUpdates, FirestoreError, HistoryEvent, ProjectDocument, ProjectStore};
use crate::geocoding::{Geocoder, GeocodingError, LocationCoordinate};
use crate::metrics::PipelineMetrics;
use crate::nlp::{Annotator, DomainRuler, LexicalRecognizer};
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::service::AnalysisService;
use crate::pipeline::types::ExtractionError;
use crate::storage::{ObjectStore, StorageError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Semaphore};

/// Object store serving fixed bytes and remembering every destination path.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: HashMap<String, Vec<u8>>,
    pub destinations: Mutex<Vec<PathBuf>>,
    gate: Option<Arc<Semaphore>>,
    pub started: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn with_object(mut self, path: &str, bytes: &[u8]) -> Self {
        self.objects.insert(path.to_string(), bytes.to_vec());
        self
    }

    /// Block each download until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download_to(&self, object_path: &str, dest: &Path) -> Result<u64, StorageError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.destinations.lock().await.push(dest.to_path_buf());
        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        let bytes = self
            .objects
            .get(object_path)
            .ok_or_else(|| StorageError::NotFound(object_path.to_string()))?;
        tokio::fs::write(dest, bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// Extractor returning a fixed text, or failing like a corrupt PDF.
pub struct FixedExtractor {
    text: Option<String>,
}

impl FixedExtractor {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn malformed() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl TextExtractor for FixedExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        assert!(path.exists(), "extractor called without a local file");
        self.text
            .clone()
            .ok_or_else(|| ExtractionError::Malformed("no trailer found".into()))
    }
}

/// Project store recording writes in memory.
#[derive(Default)]
pub struct RecordingProjectStore {
    pub updates: Mutex<Vec<(String, FieldUpdates)>>,
    pub history: Mutex<Vec<HistoryEvent>>,
    pub projects: HashMap<String, ProjectDocument>,
    pub missing_record: bool,
    pub fail_success_write: bool,
}

impl RecordingProjectStore {
    pub fn with_project(mut self, document: ProjectDocument) -> Self {
        self.projects.insert(document.id.clone(), document);
        self
    }
}

#[async_trait]
impl ProjectStore for RecordingProjectStore {
    async fn update_fields(
        &self,
        project_id: &str,
        updates: &FieldUpdates,
    ) -> Result<(), FirestoreError> {
        if self.missing_record {
            return Err(FirestoreError::NotFound(format!("projects/{project_id}")));
        }
        let is_success_write = updates.get("metadata.status").is_some();
        self.updates
            .lock()
            .await
            .push((project_id.to_string(), updates.clone()));
        if is_success_write && self.fail_success_write {
            return Err(FirestoreError::InvalidUrl("simulated write failure".into()));
        }
        Ok(())
    }

    async fn append_history(&self, event: &HistoryEvent) -> Result<(), FirestoreError> {
        self.history.lock().await.push(event.clone());
        Ok(())
    }

    async fn get_project(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectDocument>, FirestoreError> {
        Ok(self.projects.get(project_id).cloned())
    }
}

/// Geocoder resolving every address to the same point and counting lookups.
#[derive(Default)]
pub struct CountingGeocoder {
    pub lookups: AtomicUsize,
}

#[async_trait]
impl Geocoder for CountingGeocoder {
    async fn geocode(&self, address: &str) -> Result<LocationCoordinate, GeocodingError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(LocationCoordinate {
            name: address.to_string(),
            lat: 48.0,
            lng: -78.0,
            formatted_address: format!("{address}, QC"),
        })
    }
}

/// Service wired to the given stubs and the built-in recognizers.
pub fn service(
    store: Arc<MemoryObjectStore>,
    projects: Arc<RecordingProjectStore>,
    extractor: FixedExtractor,
    geocoder: Option<Arc<CountingGeocoder>>,
) -> AnalysisService {
    AnalysisService::new(
        store,
        projects,
        Arc::new(extractor),
        Annotator::new(DomainRuler::quebec_mining(), Arc::new(LexicalRecognizer::new())),
        geocoder.map(|geocoder| geocoder as Arc<dyn Geocoder>),
        Arc::new(PipelineMetrics::new()),
    )
}
