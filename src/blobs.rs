//! In-memory object URLs.
//!
//! Uploaded files and fetched bytes that are displayed by reference (PDF,
//! images, downloads) live here until revoked. An object URL is the path
//! `/blobs/<id>`; a browser-style reference `blob:<origin>/<id>` names the same
//! entry on the server at `<origin>`. Entries nobody revokes are dropped by
//! [`BlobStore::sweep`] once they outlive the configured TTL.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Path prefix under which blobs are served.
pub const BLOB_PREFIX: &str = "/blobs/";

#[derive(Clone, Debug)]
pub struct Blob {
    pub bytes: Bytes,
    pub content_type: String,
    pub filename: Option<String>,
    pub created: DateTime<Utc>,
}

/// A parsed blob reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobRef {
    /// Origin of the server that minted the reference, if one was given.
    pub origin: Option<String>,
    pub id: String,
}

impl BlobRef {
    /// Parse `blob:<origin>/<id>`, `blob:<id>` or `/blobs/<id>`.
    pub fn parse(reference: &str) -> Option<Self> {
        if let Some(id) = reference.strip_prefix(BLOB_PREFIX) {
            return Self::local(id);
        }

        let rest = reference.strip_prefix("blob:")?;
        match rest.rsplit_once('/') {
            Some((origin, id)) => {
                let origin = origin.trim_end_matches(BLOB_PREFIX.trim_end_matches('/'));
                Some(BlobRef {
                    origin: (!origin.is_empty()).then(|| origin.to_string()),
                    id: valid_id(id)?,
                })
            }
            None => Self::local(rest),
        }
    }

    fn local(id: &str) -> Option<Self> {
        Some(BlobRef {
            origin: None,
            id: valid_id(id)?,
        })
    }

    /// Where the blob can be fetched over HTTP, if the reference has an origin.
    pub fn remote_url(&self) -> Option<String> {
        self.origin
            .as_ref()
            .map(|origin| format!("{origin}{BLOB_PREFIX}{}", self.id))
    }
}

fn valid_id(id: &str) -> Option<String> {
    Uuid::parse_str(id).ok().map(|u| u.to_string())
}

/// Process-wide object URL table.
#[derive(Clone, Default)]
pub struct BlobStore {
    blobs: Arc<RwLock<HashMap<String, Blob>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes and return their object URL.
    pub fn insert(&self, bytes: Bytes, content_type: &str, filename: Option<String>) -> String {
        let id = Uuid::new_v4().to_string();
        let blob = Blob {
            bytes,
            content_type: content_type.to_string(),
            filename,
            created: Utc::now(),
        };
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), blob);
        log::debug!("created object URL {BLOB_PREFIX}{id}");
        format!("{BLOB_PREFIX}{id}")
    }

    pub fn get(&self, id: &str) -> Option<Blob> {
        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn get_url(&self, url: &str) -> Option<Blob> {
        BlobRef::parse(url).and_then(|r| self.get(&r.id))
    }

    pub fn revoke(&self, id: &str) -> bool {
        let removed = self
            .blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some();
        if removed {
            log::debug!("revoked object URL {BLOB_PREFIX}{id}");
        }
        removed
    }

    pub fn revoke_url(&self, url: &str) -> bool {
        BlobRef::parse(url).is_some_and(|r| self.revoke(&r.id))
    }

    /// Drop blobs created before `cutoff`, except the ids in `keep`.
    /// Returns how many were dropped.
    pub fn sweep(&self, cutoff: DateTime<Utc>, keep: &HashSet<String>) -> usize {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        let before = blobs.len();
        blobs.retain(|id, blob| blob.created >= cutoff || keep.contains(id));
        before - blobs.len()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
