//! Cloud Storage JSON API client.

use crate::config::Config;
use crate::google::{TokenSource, emulator_base_url};
use crate::storage::types::{ObjectStore, StorageError};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode, Url};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

/// Downloads objects from a single bucket through the Cloud Storage JSON API.
pub struct GcsObjectStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) bucket: String,
    pub(crate) tokens: Arc<TokenSource>,
}

impl GcsObjectStore {
    /// Build a store for the configured bucket, honouring `STORAGE_EMULATOR_HOST`.
    pub fn from_config(config: &Config, tokens: Arc<TokenSource>) -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent("mining-analysis/0.1")
            .build()?;
        let (base_url, tokens) = match config.storage_emulator_host.as_deref() {
            Some(host) => (emulator_base_url(host), Arc::new(TokenSource::anonymous())),
            None => (DEFAULT_STORAGE_URL.to_string(), tokens),
        };
        tracing::debug!(url = %base_url, bucket = %config.storage_bucket, "Initialized storage client");
        Ok(Self {
            client,
            base_url,
            bucket: config.storage_bucket.clone(),
            tokens,
        })
    }

    /// Media download URL; the object name is encoded as a single path segment.
    fn object_url(&self, object_path: &str) -> Result<Url, StorageError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|err| StorageError::InvalidUrl(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| StorageError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", object_path]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn download_to(&self, object_path: &str, dest: &Path) -> Result<u64, StorageError> {
        let url = self.object_url(object_path)?;
        let mut request = self.client.get(url);
        if let Some(token) = self.tokens.bearer().await? {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(StorageError::NotFound(object_path.to_string())),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                return Err(StorageError::AccessDenied {
                    path: object_path.to_string(),
                    status,
                });
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StorageError::UnexpectedStatus { status, body };
                tracing::error!(object = object_path, error = %error, "Storage download failed");
                return Err(error);
            }
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(object = object_path, bytes = written, "Object downloaded");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};

    fn store(base_url: String) -> GcsObjectStore {
        GcsObjectStore {
            client: Client::new(),
            base_url,
            bucket: "mining-docs".into(),
            tokens: Arc::new(TokenSource::anonymous()),
        }
    }

    #[test]
    fn object_name_is_a_single_encoded_segment() {
        let store = store("https://storage.googleapis.com".into());
        let url = store
            .object_url("projects/p-1/étude impact.pdf")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/mining-docs/o/projects%2Fp-1%2F%C3%A9tude%20impact.pdf?alt=media"
        );
    }

    #[tokio::test]
    async fn downloads_object_bytes_to_destination() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_contains("/storage/v1/b/mining-docs/o/projects")
                    .query_param("alt", "media");
                then.status(200).body("%PDF-1.4 fake");
            })
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("doc.pdf");
        let written = store(server.base_url())
            .download_to("projects/p-1/doc.pdf", &dest)
            .await
            .expect("download");

        mock.assert();
        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&dest).expect("read"), b"%PDF-1.4 fake");
    }

    #[tokio::test]
    async fn missing_object_maps_to_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(404).body("No such object");
            })
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let err = store(server.base_url())
            .download_to("projects/p-1/missing.pdf", &dir.path().join("x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(path) if path == "projects/p-1/missing.pdf"));
    }

    #[tokio::test]
    async fn forbidden_maps_to_access_denied() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(403);
            })
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let err = store(server.base_url())
            .download_to("projects/p-1/doc.pdf", &dir.path().join("x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AccessDenied { .. }));
    }
}
