//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::store::VectorStore;
use crate::qdrant::types::{
    CollectionConfig, CollectionInfo, CollectionInfoResponse, CountResponse,
    CreateCollectionOutcome, QdrantError, VectorPoint,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a new client for the given Qdrant endpoint.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder()
            .user_agent("docingest/0.1")
            .timeout(Duration::from_secs(120))
            .build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Describe a collection, returning `None` when it does not exist.
    pub async fn get_collection(
        &self,
        collection_name: &str,
    ) -> Result<Option<CollectionInfo>, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let payload: CollectionInfoResponse = response.json().await?;
                let config = payload.result.vector_config();
                Ok(Some(CollectionInfo {
                    status: payload.result.status.unwrap_or_default(),
                    points_count: payload.result.points_count,
                    config,
                }))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection lookup failed");
                Err(error)
            }
        }
    }

    /// Create a collection with the given vector parameters.
    ///
    /// Qdrant answers a duplicate create with `409 Conflict` (older releases use `400` with an
    /// "already exists" message); both are reported as [`CreateCollectionOutcome::AlreadyExists`].
    pub async fn create_collection(
        &self,
        collection_name: &str,
        config: CollectionConfig,
    ) -> Result<CreateCollectionOutcome, QdrantError> {
        let body = json!({
            "vectors": {
                "size": config.vector_size,
                "distance": config.distance,
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))?
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                collection = collection_name,
                vector_size = config.vector_size,
                distance = %config.distance,
                "Collection created"
            );
            return Ok(CreateCollectionOutcome::Created);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT
            || (status == StatusCode::BAD_REQUEST && body.contains("already exists"))
        {
            tracing::debug!(
                collection = collection_name,
                "Collection created concurrently by another writer"
            );
            return Ok(CreateCollectionOutcome::AlreadyExists);
        }

        let error = QdrantError::UnexpectedStatus { status, body };
        tracing::error!(collection = collection_name, error = %error, "Collection creation failed");
        Err(error)
    }

    /// Drop a collection and every point stored in it.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.ensure_success(response, || {
            tracing::info!(collection = collection_name, "Collection deleted");
        })
        .await?;
        Ok(true)
    }

    /// Upsert points into a collection, waiting until the write is applied.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: &[VectorPoint],
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }

        let point_count = points.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points upserted"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Delete every point matching the payload filter.
    pub async fn delete_points(
        &self,
        collection_name: &str,
        filter: Value,
    ) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/delete"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(collection = collection_name, "Points deleted by filter");
        })
        .await
    }

    /// Count points matching an optional payload filter.
    pub async fn count_points(
        &self,
        collection_name: &str,
        filter: Option<Value>,
    ) -> Result<u64, QdrantError> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/count"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Point count failed");
            return Err(error);
        }

        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, QdrantError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorStore for QdrantService {
    async fn collection_info(
        &self,
        collection_name: &str,
    ) -> Result<Option<CollectionInfo>, QdrantError> {
        QdrantService::get_collection(self, collection_name).await
    }

    async fn create_collection(
        &self,
        collection_name: &str,
        config: CollectionConfig,
    ) -> Result<CreateCollectionOutcome, QdrantError> {
        QdrantService::create_collection(self, collection_name, config).await
    }

    async fn upsert_points(
        &self,
        collection_name: &str,
        points: &[VectorPoint],
    ) -> Result<usize, QdrantError> {
        QdrantService::upsert_points(self, collection_name, points).await
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
