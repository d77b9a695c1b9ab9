//! Fetching the bytes behind a document reference.
//!
//! http(s) URLs go through the proxy; blob references are read from the local
//! object URL table, falling back to an opaque fetch that can only produce a
//! download.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use url::Url;

use crate::blobs::{BlobRef, BlobStore};
use crate::error::{Result, ViewerError};

/// Bytes plus the content type they were served with.
#[derive(Clone, Debug)]
pub struct FetchedDocument {
    pub content_type: String,
    pub bytes: Bytes,
}

/// Outcome of a fetch.
#[derive(Clone, Debug)]
pub enum Fetched {
    /// Typed bytes that can be dispatched to a renderer.
    Document(FetchedDocument),
    /// Bytes of unknown type from the opaque fallback; download only.
    Opaque(Bytes),
}

/// A collaborator that fetches remote documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch and normalize `url`, failing on transport errors and non-2xx.
    async fn fetch(&self, url: &Url) -> Result<FetchedDocument>;

    /// Fetch `url` without checking status or type.
    async fn fetch_opaque(&self, url: &Url) -> Result<Bytes>;
}

#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn DocumentSource>,
    blobs: BlobStore,
}

impl Fetcher {
    pub fn new(source: Arc<dyn DocumentSource>, blobs: BlobStore) -> Self {
        Fetcher { source, blobs }
    }

    /// Fetch a URL or blob reference.
    ///
    /// # Errors
    /// * `Network`, with the proxy guidance, when every path fails
    pub async fn fetch(&self, reference: &str) -> Result<Fetched> {
        if let Some(blob) = BlobRef::parse(reference) {
            return self.fetch_blob(&blob).await;
        }

        let url = Url::parse(reference).map_err(ViewerError::fetch_failed)?;
        match url.scheme() {
            "http" | "https" => self
                .source
                .fetch(&url)
                .await
                .map(Fetched::Document)
                .map_err(|e| match e {
                    // Timeouts keep their own message.
                    ViewerError::RenderTimeout { .. } => e,
                    other => ViewerError::fetch_failed(other),
                }),
            other => Err(ViewerError::fetch_failed(format!(
                "unsupported URL scheme '{other}'"
            ))),
        }
    }

    async fn fetch_blob(&self, blob: &BlobRef) -> Result<Fetched> {
        if let Some(found) = self.blobs.get(&blob.id) {
            return Ok(Fetched::Document(FetchedDocument {
                content_type: found.content_type,
                bytes: found.bytes,
            }));
        }

        let Some(remote) = blob.remote_url() else {
            return Err(ViewerError::fetch_failed(format!(
                "object URL {} is no longer available",
                blob.id
            )));
        };
        log::warn!("blob {} not held locally, trying opaque fetch of {remote}", blob.id);
        let url = Url::parse(&remote).map_err(ViewerError::fetch_failed)?;
        self.source
            .fetch_opaque(&url)
            .await
            .map(Fetched::Opaque)
            .map_err(ViewerError::fetch_failed)
    }
}
