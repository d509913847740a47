//! Document retrieval from the object store.
//!
//! The fetched bytes are spilled to a scratch file for parsing. The scratch file belongs to the
//! caller through [`FetchedDocument::scratch`] and is removed by [`ScratchFile::release`], or on
//! drop if the caller bails out early.

use super::extract::extract_pages;
use crate::processing::RawPage;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;

/// Errors raised while fetching or parsing a source document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The store has no object under the storage key.
    #[error("document '{0}' not found in the document store")]
    NotFound(String),
    /// The request could not be delivered or timed out.
    #[error("document store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The store answered with a non-success status.
    #[error("document store returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The document bytes could not be parsed.
    #[error("corrupt document: {0}")]
    CorruptInput(String),
    /// Local scratch storage failed.
    #[error("scratch file error: {0}")]
    Io(#[from] io::Error),
}

/// Temporary on-disk copy of a fetched document.
#[derive(Debug)]
pub struct ScratchFile {
    path: Option<TempPath>,
}

impl ScratchFile {
    pub(crate) fn new(path: TempPath) -> Self {
        Self { path: Some(path) }
    }

    /// Location of the scratch file while it exists.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete the scratch file now.
    pub fn release(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => path.close(),
            None => Ok(()),
        }
    }
}

/// A fetched document: extracted pages plus the scratch file they were read from.
#[derive(Debug)]
pub struct FetchedDocument {
    /// Pages in document order, 1-indexed.
    pub pages: Vec<RawPage>,
    /// Scratch copy to release once processing is finished.
    pub scratch: ScratchFile,
}

/// Source of raw document content.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Retrieve and extract the document stored under `storage_key`.
    async fn fetch(
        &self,
        storage_key: &str,
        file_name: &str,
    ) -> Result<FetchedDocument, FetchError>;
}

/// Fetches documents over HTTP from `{base_url}/{storage_key}`.
pub struct HttpDocumentFetcher {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDocumentFetcher {
    /// Build a fetcher for the given store endpoint.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("docingest/fetch")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn object_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.base_url, storage_key.trim_start_matches('/'))
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch(
        &self,
        storage_key: &str,
        file_name: &str,
    ) -> Result<FetchedDocument, FetchError> {
        let mut request = self.client.get(self.object_url(storage_key));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(storage_key.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::UnexpectedStatus { status, body });
        }

        let bytes = response.bytes().await?;
        tracing::debug!(storage_key, bytes = bytes.len(), "Downloaded document");

        let source_key = storage_key.to_string();
        let file_name = file_name.to_string();
        tokio::task::spawn_blocking(move || -> Result<FetchedDocument, FetchError> {
            let mut file = NamedTempFile::new()?;
            file.write_all(&bytes)?;
            file.flush()?;
            let scratch = ScratchFile::new(file.into_temp_path());
            let path = scratch.path().map(Path::to_path_buf).unwrap_or_default();
            let pages = extract_pages(&path, &bytes, &source_key, &file_name)?;
            Ok(FetchedDocument { pages, scratch })
        })
        .await
        .map_err(|error| FetchError::Io(io::Error::other(error)))?
    }
}
