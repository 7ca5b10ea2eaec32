//! HTTP client for the Firestore REST API.

use crate::config::Config;
use crate::firestore::types::{
    FieldUpdates, FirestoreError, HistoryEvent, ProjectDocument, ProjectStore,
};
use crate::firestore::value::{decode_fields, encode_fields};
use crate::google::{TokenSource, emulator_base_url};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
const PROJECTS_COLLECTION: &str = "projects";
const HISTORY_COLLECTION: &str = "history";

#[derive(Deserialize)]
struct DocumentResponse {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Firestore-backed store for project records and their history.
pub struct FirestoreProjectStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) project_id: String,
    pub(crate) tokens: Arc<TokenSource>,
}

impl FirestoreProjectStore {
    /// Build a store for the configured project, honouring `FIRESTORE_EMULATOR_HOST`.
    pub fn from_config(config: &Config, tokens: Arc<TokenSource>) -> Result<Self, FirestoreError> {
        let client = Client::builder()
            .user_agent("mining-analysis/0.1")
            .build()?;
        let (base_url, tokens) = match config.firestore_emulator_host.as_deref() {
            Some(host) => (emulator_base_url(host), Arc::new(TokenSource::anonymous())),
            None => (DEFAULT_FIRESTORE_URL.to_string(), tokens),
        };
        tracing::debug!(
            url = %base_url,
            project = %config.firestore_project_id,
            "Initialized Firestore client"
        );
        Ok(Self {
            client,
            base_url,
            project_id: config.firestore_project_id.clone(),
            tokens,
        })
    }

    fn database_path(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    /// Database-scoped URL built from percent-encoded path segments.
    fn documents_url(&self, segments: &[&str]) -> Result<Url, FirestoreError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| FirestoreError::InvalidUrl(err.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| FirestoreError::InvalidUrl(self.base_url.clone()))?;
            path.pop_if_empty().extend([
                "v1",
                "projects",
                self.project_id.as_str(),
                "databases",
                "(default)",
            ]);
            path.extend(segments);
        }
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
    ) -> Result<reqwest::RequestBuilder, FirestoreError> {
        let mut request = self.client.request(method, url);
        if let Some(token) = self.tokens.bearer().await? {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    async fn unexpected(response: reqwest::Response, operation: &str) -> FirestoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = FirestoreError::UnexpectedStatus { status, body };
        tracing::error!(operation, error = %error, "Firestore request failed");
        error
    }
}

#[async_trait]
impl ProjectStore for FirestoreProjectStore {
    async fn update_fields(
        &self,
        project_id: &str,
        updates: &FieldUpdates,
    ) -> Result<(), FirestoreError> {
        let mut url = self.documents_url(&["documents", PROJECTS_COLLECTION, project_id])?;
        {
            let mut query = url.query_pairs_mut();
            for path in updates.paths() {
                query.append_pair("updateMask.fieldPaths", path);
            }
            query.append_pair("currentDocument.exists", "true");
        }

        let body = json!({ "fields": encode_fields(&updates.to_nested()) });
        let response = self
            .request(Method::PATCH, url)
            .await?
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::debug!(
                    project_id,
                    fields = updates.len(),
                    "Project fields updated"
                );
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(FirestoreError::NotFound(format!(
                "{PROJECTS_COLLECTION}/{project_id}"
            ))),
            _ => Err(Self::unexpected(response, "update_fields").await),
        }
    }

    async fn append_history(&self, event: &HistoryEvent) -> Result<(), FirestoreError> {
        let url = self.documents_url(&["documents:commit"])?;
        let document_id = Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}/{HISTORY_COLLECTION}/{document_id}",
            self.database_path()
        );
        let body = json!({
            "writes": [{
                "update": {
                    "name": name,
                    "fields": encode_fields(&event.to_fields()),
                },
                "currentDocument": { "exists": false },
                "updateTransforms": [{
                    "fieldPath": "timestamp",
                    "setToServerValue": "REQUEST_TIME",
                }],
            }]
        });

        let response = self
            .request(Method::POST, url)
            .await?
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!(
                project_id = %event.project_id,
                action = %event.action,
                document_id = %document_id,
                "History event appended"
            );
            Ok(())
        } else {
            Err(Self::unexpected(response, "append_history").await)
        }
    }

    async fn get_project(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectDocument>, FirestoreError> {
        let url = self.documents_url(&["documents", PROJECTS_COLLECTION, project_id])?;
        let response = self.request(Method::GET, url).await?.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let document: DocumentResponse = response.json().await?;
                Ok(Some(ProjectDocument {
                    id: project_id.to_string(),
                    fields: decode_fields(&document.fields),
                }))
            }
            _ => Err(Self::unexpected(response, "get_project").await),
        }
    }
}
