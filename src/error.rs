//! Error taxonomy shared by the fetch, render and HTTP layers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;

/// Guidance appended to every user-facing fetch failure.
pub const PROXY_HINT: &str = "Please make sure the proxy server is running.";

/// All errors that can occur while fetching, converting or serving a document.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// Upstream unreachable, non-2xx, or the proxy itself failed.
    #[error("{0}")]
    Network(String),

    /// No renderer applies to the content type. Shown next to a download
    /// link rather than raised as a request failure.
    #[error("This file type ({0}) cannot be previewed. You can download it instead.")]
    UnsupportedFormat(String),

    /// Empty or malformed spreadsheet, CSV or Word document.
    #[error("{0}")]
    Parse(String),

    /// A headless-browser stage exceeded its budget.
    #[error("Headless rendering timed out during {stage} after {}s", .after.as_secs())]
    RenderTimeout {
        stage: &'static str,
        after: Duration,
    },

    /// The headless browser ran but failed.
    #[error("Headless rendering failed: {0}")]
    Render(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Only HTTP and HTTPS URLs are supported, got '{0}'")]
    UnsupportedScheme(String),

    #[error("File exceeds the {limit} byte upload limit")]
    PayloadTooLarge { limit: usize },

    #[error("File type '{0}' is not allowed")]
    UnsupportedMediaType(String),

    #[error("No file uploaded")]
    MissingFile,

    #[error("Invalid upload: {0}")]
    Upload(String),

    /// A newer fetch cycle started before this one finished.
    #[error("Result discarded: a newer request for this view is in progress")]
    Superseded,

    #[error("{0} not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("Template error: {0}")]
    TemplateSyntax(#[from] handlebars::TemplateError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ViewerError>;

impl ViewerError {
    /// Wraps a fetch failure with the proxy guidance shown to users.
    pub fn fetch_failed(cause: impl std::fmt::Display) -> Self {
        ViewerError::Network(format!("Failed to load document: {cause}. {PROXY_HINT}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ViewerError::InvalidUrl(_)
            | ViewerError::UnsupportedScheme(_)
            | ViewerError::MissingFile
            | ViewerError::Upload(_) => StatusCode::BAD_REQUEST,
            ViewerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ViewerError::UnsupportedMediaType(_) | ViewerError::UnsupportedFormat(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ViewerError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ViewerError::Superseded => StatusCode::CONFLICT,
            ViewerError::NotFound(_) => StatusCode::NOT_FOUND,
            ViewerError::Network(_)
            | ViewerError::RenderTimeout { .. }
            | ViewerError::Render(_)
            | ViewerError::Io(_)
            | ViewerError::Template(_)
            | ViewerError::TemplateSyntax(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for ViewerError {
    fn from(e: reqwest::Error) -> Self {
        ViewerError::Network(e.to_string())
    }
}

impl From<calamine::Error> for ViewerError {
    fn from(e: calamine::Error) -> Self {
        ViewerError::Parse(format!("Failed to read workbook: {e}"))
    }
}

impl From<csv_async::Error> for ViewerError {
    fn from(e: csv_async::Error) -> Self {
        ViewerError::Parse(format!("Failed to read CSV: {e}"))
    }
}

impl From<zip::result::ZipError> for ViewerError {
    fn from(e: zip::result::ZipError) -> Self {
        ViewerError::Parse(format!("Failed to open Word document: {e}"))
    }
}

impl From<quick_xml::Error> for ViewerError {
    fn from(e: quick_xml::Error) -> Self {
        ViewerError::Parse(format!("Malformed Word document: {e}"))
    }
}

impl IntoResponse for ViewerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::debug!("{self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
