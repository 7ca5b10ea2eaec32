//! Analysis pipeline: retrieve, extract, annotate, geocode, record.

use crate::config::Config;
use crate::firestore::{FirestoreError, FirestoreProjectStore, ProjectDocument, ProjectStore};
use crate::geocoding::{Geocoder, GeocodingError, GoogleGeocoder, geocode_locations};
use crate::google::TokenSource;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::nlp::{Annotator, DomainRuler, build_recognizer};
use crate::pipeline::extract::{PdfTextExtractor, TextExtractor};
use crate::pipeline::types::{
    AnalysisRequest, AnalysisResult, PersistenceError, PipelineError, RetrievalError,
    error_updates,
};
use crate::storage::{GcsObjectStore, ObjectStore, StorageError};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Errors raised while wiring collaborators at startup.
#[derive(Debug, Error)]
pub enum InitError {
    /// Storage client could not be built.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Firestore client could not be built.
    #[error(transparent)]
    Firestore(#[from] FirestoreError),
    /// Geocoding client could not be built.
    #[error(transparent)]
    Geocoding(#[from] GeocodingError),
}

/// Runs analysis executions against long-lived collaborator handles.
///
/// Build once at startup and share through an `Arc`; executions borrow the service immutably
/// and may run concurrently.
pub struct AnalysisService {
    store: Arc<dyn ObjectStore>,
    projects: Arc<dyn ProjectStore>,
    extractor: Arc<dyn TextExtractor>,
    annotator: Annotator,
    geocoder: Option<Arc<dyn Geocoder>>,
    metrics: Arc<PipelineMetrics>,
}

impl AnalysisService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        projects: Arc<dyn ProjectStore>,
        extractor: Arc<dyn TextExtractor>,
        annotator: Annotator,
        geocoder: Option<Arc<dyn Geocoder>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            projects,
            extractor,
            annotator,
            geocoder,
            metrics,
        }
    }

    /// Wire the Google-backed collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, InitError> {
        let tokens = Arc::new(TokenSource::from_credentials(config.service_account.clone()));
        let store = GcsObjectStore::from_config(config, Arc::clone(&tokens))?;
        let projects = FirestoreProjectStore::from_config(config, tokens)?;
        let geocoder = GoogleGeocoder::from_config(config)?
            .map(|geocoder| Arc::new(geocoder) as Arc<dyn Geocoder>);
        let annotator = Annotator::new(DomainRuler::quebec_mining(), build_recognizer(config));

        tracing::info!(
            bucket = %config.storage_bucket,
            firestore_project = %config.firestore_project_id,
            geocoding = geocoder.is_some(),
            "Analysis service initialized"
        );
        Ok(Self::new(
            Arc::new(store),
            Arc::new(projects),
            Arc::new(PdfTextExtractor),
            annotator,
            geocoder,
            Arc::new(PipelineMetrics::new()),
        ))
    }

    /// Shared counters for this service.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Snapshot of the pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Look up a project record.
    pub async fn get_project(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectDocument>, FirestoreError> {
        self.projects.get_project(project_id).await
    }

    /// Execute one request and record its outcome on the project record.
    ///
    /// Failures are written to `analysis.status`/`analysis.error`; if that write fails too the
    /// error is only logged. The temporary download is removed before this returns.
    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisResult, PipelineError> {
        let span = tracing::info_span!(
            "analysis",
            project_id = %request.project_id,
            document_path = %request.document_path
        );
        async {
            let _running = self.metrics.start_execution();
            tracing::info!("Analysis started");

            match self.execute(&request).await {
                Ok(result) => {
                    self.metrics.record_completed();
                    tracing::info!(
                        chars = result.full_text_length,
                        locations = result.locations_found,
                        coords = result.location_coords.len(),
                        "Analysis completed"
                    );
                    Ok(result)
                }
                Err(err) => {
                    self.metrics.record_failed();
                    tracing::error!(error = %err, "Analysis failed");
                    if let Err(write_err) = self
                        .projects
                        .update_fields(&request.project_id, &error_updates(&err))
                        .await
                    {
                        tracing::error!(error = %write_err, "Failed to record analysis error");
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, request: &AnalysisRequest) -> Result<AnalysisResult, PipelineError> {
        let download = tempfile::Builder::new()
            .prefix("analysis-")
            .suffix(".pdf")
            .tempfile()
            .map_err(RetrievalError::TempFile)?;

        let bytes = self
            .store
            .download_to(&request.document_path, download.path())
            .await
            .map_err(RetrievalError::from)?;
        tracing::info!(bytes, "Document downloaded");

        let text = self.extractor.extract(download.path()).await?;
        tracing::info!(chars = text.chars().count(), "Text extracted");

        let buckets = self.annotator.annotate(&text).await?;
        tracing::info!(
            entities = buckets.entities.len(),
            locations = buckets.locations.len(),
            dates = buckets.dates.len(),
            permits = buckets.permits.len(),
            impacts = buckets.impacts.len(),
            "Entities recognized"
        );

        let coords = match &self.geocoder {
            Some(geocoder) => geocode_locations(geocoder, &buckets.locations).await,
            None => {
                tracing::info!("Geocoding disabled; skipping coordinates");
                Vec::new()
            }
        };

        let result = AnalysisResult::new(&text, buckets, coords);
        self.projects
            .update_fields(&request.project_id, &result.to_field_updates())
            .await
            .map_err(PersistenceError::from)?;
        self.projects
            .append_history(&result.history_event(&request.project_id))
            .await
            .map_err(PersistenceError::from)?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{
        CountingGeocoder, FixedExtractor, MemoryObjectStore, RecordingProjectStore, service,
    };
    use serde_json::{Value, json};
    use std::sync::atomic::Ordering;

    const DOC: &str = "projects/p-1/etude.pdf";
    const TEXT: &str = "Le certificat d'autorisation délivré par le MELCCFP le 12 mars 2024 \
        protège la faune près de Malartic et au lac Fortune.\n";

    fn store() -> Arc<MemoryObjectStore> {
        Arc::new(MemoryObjectStore::default().with_object(DOC, b"%PDF-1.4"))
    }

    #[tokio::test]
    async fn success_writes_results_and_one_history_event() {
        let projects = Arc::new(RecordingProjectStore::default());
        let geocoder = Arc::new(CountingGeocoder::default());
        let service = service(
            store(),
            Arc::clone(&projects),
            FixedExtractor::text(TEXT),
            Some(Arc::clone(&geocoder)),
        );

        let result = service
            .run(AnalysisRequest::new("p-1", DOC))
            .await
            .expect("analysis");

        assert_eq!(result.permits, ["certificat d'autorisation"]);
        assert_eq!(result.entities, ["MELCCFP"]);
        assert_eq!(result.impacts, ["faune"]);
        assert_eq!(result.dates, ["12 mars 2024"]);
        assert_eq!(result.locations, ["Malartic", "lac Fortune"]);
        assert_eq!(result.full_text_length, TEXT.chars().count());
        assert_eq!(geocoder.lookups.load(Ordering::SeqCst), 2);

        let updates = projects.updates.lock().await;
        assert_eq!(updates.len(), 1);
        let (project_id, fields) = &updates[0];
        assert_eq!(project_id, "p-1");
        assert_eq!(fields.get("analysis.status"), Some(&json!("COMPLETED")));
        assert_eq!(fields.get("metadata.status"), Some(&json!("ANALYZED")));
        assert_eq!(
            fields
                .get("analysis.location_coords")
                .and_then(Value::as_array)
                .map(Vec::len),
            Some(2)
        );

        let history = projects.history.lock().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].details, "Analyse terminée. 2 lieux identifiés.");

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.in_flight, 0);
    }

    #[tokio::test]
    async fn missing_api_key_leaves_coordinates_empty() {
        let projects = Arc::new(RecordingProjectStore::default());
        let service = service(store(), Arc::clone(&projects), FixedExtractor::text(TEXT), None);

        let result = service
            .run(AnalysisRequest::new("p-1", DOC))
            .await
            .expect("analysis");

        assert!(result.location_coords.is_empty());
        let updates = projects.updates.lock().await;
        assert_eq!(updates[0].1.get("analysis.location_coords"), Some(&json!([])));
    }

    #[tokio::test]
    async fn extraction_failure_records_error_without_history() {
        let projects = Arc::new(RecordingProjectStore::default());
        let service = service(
            store(),
            Arc::clone(&projects),
            FixedExtractor::malformed(),
            None,
        );

        let err = service
            .run(AnalysisRequest::new("p-1", DOC))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));

        let updates = projects.updates.lock().await;
        assert_eq!(updates.len(), 1);
        let fields = &updates[0].1;
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("analysis.status"), Some(&json!("ERROR")));
        let message = fields
            .get("analysis.error")
            .and_then(Value::as_str)
            .expect("error text");
        assert!(message.starts_with("extraction failed:"));
        assert!(projects.history.lock().await.is_empty());
        assert_eq!(service.metrics_snapshot().failed, 1);
    }

    #[tokio::test]
    async fn missing_object_is_a_retrieval_error() {
        let projects = Arc::new(RecordingProjectStore::default());
        let service = service(
            Arc::new(MemoryObjectStore::default()),
            Arc::clone(&projects),
            FixedExtractor::text(TEXT),
            None,
        );

        let err = service
            .run(AnalysisRequest::new("p-1", DOC))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval(_)));
        let updates = projects.updates.lock().await;
        assert_eq!(updates[0].1.get("analysis.status"), Some(&json!("ERROR")));
    }

    #[tokio::test]
    async fn temporary_file_is_removed_on_success_and_failure() {
        let store = store();
        let projects = Arc::new(RecordingProjectStore::default());
        let ok = service(
            Arc::clone(&store),
            Arc::clone(&projects),
            FixedExtractor::text(TEXT),
            None,
        );
        let failing = service(
            Arc::clone(&store),
            Arc::clone(&projects),
            FixedExtractor::malformed(),
            None,
        );

        ok.run(AnalysisRequest::new("p-1", DOC)).await.expect("analysis");
        failing
            .run(AnalysisRequest::new("p-1", DOC))
            .await
            .unwrap_err();

        let destinations = store.destinations.lock().await;
        assert_eq!(destinations.len(), 2);
        assert_ne!(destinations[0], destinations[1]);
        for path in destinations.iter() {
            assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("pdf"));
            assert!(!path.exists(), "{} was not removed", path.display());
        }
    }

    #[tokio::test]
    async fn failed_success_write_falls_back_to_error_write() {
        let projects = Arc::new(RecordingProjectStore {
            fail_success_write: true,
            ..Default::default()
        });
        let service = service(store(), Arc::clone(&projects), FixedExtractor::text(TEXT), None);

        let err = service
            .run(AnalysisRequest::new("p-1", DOC))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));

        let updates = projects.updates.lock().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].1.get("analysis.status"), Some(&json!("ERROR")));
        assert!(projects.history.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_project_record_only_logs() {
        let projects = Arc::new(RecordingProjectStore {
            missing_record: true,
            ..Default::default()
        });
        let service = service(store(), Arc::clone(&projects), FixedExtractor::text(TEXT), None);

        let err = service
            .run(AnalysisRequest::new("ghost", DOC))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("projects/ghost"));
        assert!(projects.updates.lock().await.is_empty());
        assert!(projects.history.lock().await.is_empty());
    }

    #[tokio::test]
    async fn long_documents_are_summarized_and_capped() {
        let mut text = String::new();
        for i in 0..30 {
            text.push_str(&format!("Visite à Secteur{i} le {} mars 2024. ", (i % 28) + 1));
        }
        let projects = Arc::new(RecordingProjectStore::default());
        let geocoder = Arc::new(CountingGeocoder::default());
        let service = service(
            store(),
            Arc::clone(&projects),
            FixedExtractor::text(&text),
            Some(Arc::clone(&geocoder)),
        );

        let result = service
            .run(AnalysisRequest::new("p-1", DOC))
            .await
            .expect("analysis");

        assert!(result.summary.ends_with("..."));
        assert_eq!(result.summary.chars().count(), 503);
        assert_eq!(
            result.locations,
            (0..20).map(|i| format!("Secteur{i}")).collect::<Vec<_>>()
        );
        assert_eq!(
            result.dates,
            (1..=10).map(|d| format!("{d} mars 2024")).collect::<Vec<_>>()
        );
        assert_eq!(result.location_coords.len(), 5);
        assert_eq!(geocoder.lookups.load(Ordering::SeqCst), 5);
        assert_eq!(
            projects.history.lock().await[0].details,
            "Analyse terminée. 30 lieux identifiés."
        );
    }
}
