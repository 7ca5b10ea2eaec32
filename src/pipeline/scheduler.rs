//! Bounded background execution of analysis requests.

use crate::firestore::{FirestoreError, ProjectDocument};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::service::AnalysisService;
use crate::pipeline::types::AnalysisRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Operations exposed to the HTTP surface.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Queue a request for background execution; never waits for it to start.
    fn submit(&self, request: AnalysisRequest);

    /// Read a project record, `None` when it does not exist.
    async fn find_project(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectDocument>, FirestoreError>;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Spawns one task per request, with at most `max_concurrency` executions running at once.
#[derive(Clone)]
pub struct AnalysisScheduler {
    service: Arc<AnalysisService>,
    permits: Arc<Semaphore>,
}

impl AnalysisScheduler {
    /// Create a scheduler; a bound of zero is raised to one.
    pub fn new(service: Arc<AnalysisService>, max_concurrency: usize) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }
}

#[async_trait]
impl AnalysisApi for AnalysisScheduler {
    fn submit(&self, request: AnalysisRequest) {
        self.service.metrics().record_accepted();
        let service = Arc::clone(&self.service);
        let permits = Arc::clone(&self.permits);
        tracing::debug!(
            project_id = %request.project_id,
            available = permits.available_permits(),
            "Analysis queued"
        );

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(project_id = %request.project_id, "Scheduler closed; dropping request");
                return;
            };
            // Outcome is recorded on the project record and in the metrics.
            let _ = service.run(request).await;
        });
    }

    async fn find_project(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectDocument>, FirestoreError> {
        self.service.get_project(project_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.service.metrics_snapshot()
    }
}
