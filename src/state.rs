//! Display state of a view and the bookkeeping around fetch cycles.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::blobs::{BlobRef, BlobStore};
use crate::error::{Result, ViewerError};

/// One rendered sheet of a workbook or CSV file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub html: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedKind {
    Pdf,
    Image,
}

/// What a view currently displays. Exactly one variant is active.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RenderState {
    Loading,
    Error {
        message: String,
    },
    Table {
        sheets: Vec<Sheet>,
        active_sheet: String,
    },
    RichHtml {
        html: String,
    },
    Embed {
        kind: EmbedKind,
        url: String,
    },
    Download {
        url: String,
        message: String,
    },
}

impl RenderState {
    /// Table state with the first sheet active.
    ///
    /// # Errors
    /// * `Parse` when `sheets` is empty
    pub fn table(sheets: Vec<Sheet>) -> Result<Self> {
        let active_sheet = sheets
            .first()
            .map(|s| s.name.clone())
            .ok_or_else(|| ViewerError::Parse(crate::tabular::NO_DATA.to_string()))?;
        Ok(RenderState::Table {
            sheets,
            active_sheet,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        RenderState::Error {
            message: message.into(),
        }
    }

    /// Switch the visible sheet. Unknown names leave the state untouched.
    ///
    /// Returns whether the selection changed.
    pub fn select_sheet(&mut self, name: &str) -> bool {
        match self {
            RenderState::Table {
                sheets,
                active_sheet,
            } if sheets.iter().any(|s| s.name == name) => {
                *active_sheet = name.to_string();
                true
            }
            _ => false,
        }
    }

    /// The sheet currently shown, for table states.
    pub fn active(&self) -> Option<&Sheet> {
        match self {
            RenderState::Table {
                sheets,
                active_sheet,
            } => sheets.iter().find(|s| &s.name == active_sheet),
            _ => None,
        }
    }
}

/// Identifies one fetch-and-render cycle of a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CycleToken(u64);

/// Result of a completed cycle: the state to show and the object URL backing it.
#[derive(Debug)]
pub struct Rendered {
    pub state: RenderState,
    pub object_url: Option<String>,
}

/// Per-view display state.
///
/// Only the most recently started cycle may commit. The view owns at most one
/// object URL and revokes it as soon as it is superseded.
#[derive(Debug)]
pub struct ViewSession {
    url: Option<String>,
    state: RenderState,
    current: CycleToken,
    object_url: Option<String>,
    last_used: DateTime<Utc>,
}

impl Default for ViewSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewSession {
    pub fn new() -> Self {
        ViewSession {
            url: None,
            state: RenderState::Loading,
            current: CycleToken(0),
            object_url: None,
            last_used: Utc::now(),
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn object_url(&self) -> Option<&str> {
        self.object_url.as_deref()
    }

    /// Start a new cycle for `url`: reset to `Loading` and release the
    /// previous object URL.
    pub fn begin(&mut self, url: &str, blobs: &BlobStore) -> CycleToken {
        self.current = CycleToken(self.current.0 + 1);
        self.url = Some(url.to_string());
        self.state = RenderState::Loading;
        self.release(blobs);
        self.current
    }

    /// Commit a finished cycle if it is still the current one.
    ///
    /// # Errors
    /// * `Superseded` if a newer cycle has started; the result's object URL
    ///   is revoked
    pub fn commit(&mut self, token: CycleToken, rendered: Rendered, blobs: &BlobStore) -> Result<()> {
        if token != self.current {
            if let Some(url) = rendered.object_url {
                blobs.revoke_url(&url);
            }
            log::debug!("discarding stale cycle {:?} (current {:?})", token, self.current);
            return Err(ViewerError::Superseded);
        }
        self.state = rendered.state;
        self.object_url = rendered.object_url;
        Ok(())
    }

    pub fn select_sheet(&mut self, name: &str) -> bool {
        self.state.select_sheet(name)
    }

    /// Revoke the owned object URL, if any.
    pub fn release(&mut self, blobs: &BlobStore) {
        if let Some(url) = self.object_url.take() {
            blobs.revoke_url(&url);
        }
    }
}

/// All live view instances, keyed by view id.
///
/// A bounded registry closes its least recently used view to make room for a
/// new one.
#[derive(Clone, Default)]
pub struct ViewRegistry {
    views: Arc<Mutex<HashMap<String, ViewSession>>>,
    capacity: Option<usize>,
    blobs: Option<BlobStore>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding at most `capacity` views. Evicted views release
    /// their object URLs into `blobs`.
    pub fn bounded(capacity: usize, blobs: BlobStore) -> Self {
        ViewRegistry {
            views: Arc::default(),
            capacity: Some(capacity.max(1)),
            blobs: Some(blobs),
        }
    }

    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Run `f` against a view, creating it if needed.
    pub fn with<T>(&self, id: &str, f: impl FnOnce(&mut ViewSession) -> T) -> T {
        let mut views = self.views.lock().unwrap_or_else(|e| e.into_inner());
        if !views.contains_key(id) {
            self.make_room(&mut views);
        }
        let view = views.entry(id.to_string()).or_default();
        view.last_used = Utc::now();
        f(view)
    }

    /// Run `f` against an existing view.
    pub fn try_with<T>(&self, id: &str, f: impl FnOnce(&mut ViewSession) -> T) -> Option<T> {
        let mut views = self.views.lock().unwrap_or_else(|e| e.into_inner());
        views.get_mut(id).map(|view| {
            view.last_used = Utc::now();
            f(view)
        })
    }

    fn make_room(&self, views: &mut HashMap<String, ViewSession>) {
        let (Some(capacity), Some(blobs)) = (self.capacity, &self.blobs) else {
            return;
        };
        while views.len() >= capacity {
            let Some(oldest) = views
                .iter()
                .min_by_key(|(_, v)| v.last_used)
                .map(|(id, _)| id.clone())
            else {
                return;
            };
            if let Some(mut view) = views.remove(&oldest) {
                log::debug!("evicting least recently used view {oldest}");
                view.release(blobs);
            }
        }
    }

    /// Close views idle since before `cutoff`, releasing their object URLs.
    /// Returns how many were closed.
    pub fn sweep(&self, cutoff: DateTime<Utc>, blobs: &BlobStore) -> usize {
        let mut views = self.views.lock().unwrap_or_else(|e| e.into_inner());
        let idle: Vec<String> = views
            .iter()
            .filter(|(_, v)| v.last_used < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            if let Some(mut view) = views.remove(id) {
                view.release(blobs);
            }
        }
        idle.len()
    }

    /// Blob ids currently owned by a live view.
    pub fn owned_blobs(&self) -> HashSet<String> {
        self.views
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter_map(|v| v.object_url())
            .filter_map(BlobRef::parse)
            .map(|r| r.id)
            .collect()
    }

    /// Tear down a view, releasing its object URL.
    pub fn remove(&self, id: &str, blobs: &BlobStore) -> bool {
        let removed = self
            .views
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        match removed {
            Some(mut view) => {
                view.release(blobs);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.views.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
