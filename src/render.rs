//! The fetch → dispatch → render pipeline.

use bytes::Bytes;

use crate::blobs::BlobStore;
use crate::dispatch::{self, RenderKind};
use crate::error::{Result, ViewerError};
use crate::fetcher::{Fetched, FetchedDocument, Fetcher};
use crate::rich_html;
use crate::state::{EmbedKind, RenderState, Rendered};
use crate::tabular;
use crate::word;

pub const POWERPOINT_MESSAGE: &str =
    "PowerPoint files cannot be previewed directly. Please download the file to view it.";
pub const OPAQUE_MESSAGE: &str =
    "The document could not be read directly. You can download it instead.";

pub fn unsupported_message(content_type: &str) -> String {
    ViewerError::UnsupportedFormat(content_type.to_string()).to_string()
}

#[derive(Clone)]
pub struct Pipeline {
    fetcher: Fetcher,
    blobs: BlobStore,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, blobs: BlobStore) -> Self {
        Pipeline { fetcher, blobs }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Fetch and render `reference`. Failures become the `Error` state.
    pub async fn run(&self, reference: &str) -> Rendered {
        let outcome = match self.fetcher.fetch(reference).await {
            Ok(fetched) => self.render(fetched, reference).await,
            Err(e) => Err(e),
        };
        outcome.unwrap_or_else(|e| {
            log::warn!("rendering {reference} failed: {e}");
            local(e.into())
        })
    }

    /// Turn fetched bytes into a display state.
    ///
    /// # Errors
    /// * `Parse` for empty or malformed tabular data
    pub async fn render(&self, fetched: Fetched, reference: &str) -> Result<Rendered> {
        let doc = match fetched {
            Fetched::Document(doc) => doc,
            Fetched::Opaque(bytes) => {
                return Ok(self.download(bytes, "application/octet-stream", OPAQUE_MESSAGE));
            }
        };

        let kind = dispatch::select(&doc.content_type);
        log::debug!("{reference}: {} -> {kind:?}", doc.content_type);

        match kind {
            RenderKind::Image => Ok(self.embed(doc, EmbedKind::Image)),
            RenderKind::Pdf => Ok(self.embed(doc, EmbedKind::Pdf)),
            RenderKind::Spreadsheet => {
                let sheets = tabular::render_workbook(&doc.bytes)?;
                Ok(local(RenderState::table(sheets)?))
            }
            RenderKind::Csv => {
                let sheet = tabular::render_csv(&doc.bytes).await?;
                Ok(local(RenderState::table(vec![sheet])?))
            }
            RenderKind::RichHtml => self.rich_html(doc, reference),
            RenderKind::PowerPoint => {
                Ok(self.download(doc.bytes, &doc.content_type, POWERPOINT_MESSAGE))
            }
            RenderKind::Download => {
                let message = unsupported_message(&doc.content_type);
                Ok(self.download(doc.bytes, &doc.content_type, &message))
            }
        }
    }

    fn rich_html(&self, doc: FetchedDocument, reference: &str) -> Result<Rendered> {
        let html = if dispatch::is_docx(&doc.content_type) {
            word::docx_to_html(&doc.bytes)?
        } else if dispatch::is_word(&doc.content_type) {
            // Legacy binary Word has no converter.
            let message = unsupported_message(&doc.content_type);
            return Ok(self.download(doc.bytes, &doc.content_type, &message));
        } else {
            String::from_utf8_lossy(&doc.bytes).into_owned()
        };
        Ok(local(RenderState::RichHtml {
            html: rich_html::prepare(&html, Some(reference)),
        }))
    }

    fn embed(&self, doc: FetchedDocument, kind: EmbedKind) -> Rendered {
        let url = self.blobs.insert(doc.bytes, &doc.content_type, None);
        Rendered {
            state: RenderState::Embed {
                kind,
                url: url.clone(),
            },
            object_url: Some(url),
        }
    }

    fn download(&self, bytes: Bytes, content_type: &str, message: &str) -> Rendered {
        let url = self.blobs.insert(bytes, content_type, None);
        Rendered {
            state: RenderState::Download {
                url: url.clone(),
                message: message.to_string(),
            },
            object_url: Some(url),
        }
    }
}

fn local(state: RenderState) -> Rendered {
    Rendered {
        state,
        object_url: None,
    }
}

impl From<ViewerError> for RenderState {
    fn from(e: ViewerError) -> Self {
        RenderState::error(e.to_string())
    }
}
