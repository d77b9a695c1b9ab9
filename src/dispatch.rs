//! Content-type dispatch.
//!
//! Maps a declared MIME type to the renderer that will display it. Matching is
//! by substring on the lowercased type string, not MIME equality, since
//! upstream servers send parameters (`; charset=...`), vendor suffixes and the
//! occasional mislabeled type.

use serde::Serialize;

/// Render strategy selected for a content type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Image,
    Pdf,
    Spreadsheet,
    Csv,
    /// Word documents (already converted to HTML by the proxy) and HTML pages.
    RichHtml,
    PowerPoint,
    /// Anything else: offered as a download.
    Download,
}

/// Checked in order; first match wins.
const RULES: &[(RenderKind, &[&str])] = &[
    (RenderKind::Image, &["image/"]),
    (RenderKind::Pdf, &["pdf"]),
    (
        RenderKind::Spreadsheet,
        &["spreadsheetml", "ms-excel", "xlsx", "xls"],
    ),
    (RenderKind::Csv, &["csv"]),
    (RenderKind::RichHtml, &["wordprocessingml", "msword", "html"]),
    (RenderKind::PowerPoint, &["presentationml", "ms-powerpoint"]),
];

/// Select the renderer for a content-type string.
pub fn select(content_type: &str) -> RenderKind {
    let content_type = content_type.to_ascii_lowercase();
    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| content_type.contains(n)))
        .map(|(kind, _)| *kind)
        .unwrap_or(RenderKind::Download)
}

/// True for any Word document, converted or not.
pub fn is_word(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("wordprocessingml") || content_type.contains("msword")
}

/// True for `.docx` packages, the only Word format converted to HTML.
pub fn is_docx(content_type: &str) -> bool {
    content_type
        .to_ascii_lowercase()
        .contains("wordprocessingml")
}

/// True for HTML pages that go through the headless browser.
pub fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

const EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("xls", "application/vnd.ms-excel"),
    ("csv", "text/csv"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("doc", "application/msword"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
];

/// Types accepted by the upload endpoint.
const UPLOADS: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "text/csv",
    "application/csv",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-powerpoint",
    "text/html",
    "text/plain",
];

/// Whether an upload of this type is accepted. Parameters are ignored.
pub fn is_allowed_upload(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    UPLOADS.contains(&essence.as_str())
}

/// Guess a MIME type from the extension of a path or file name.
pub fn guess_from_path(path: &str) -> Option<&'static str> {
    let (_, ext) = path.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// The declared type, unless it is missing or generic and the path has a
/// known extension.
pub fn effective_content_type(declared: &str, path: &str) -> String {
    let generic = declared.trim().is_empty()
        || declared
            .to_ascii_lowercase()
            .starts_with("application/octet-stream");
    match guess_from_path(path) {
        Some(guess) if generic => guess.to_string(),
        _ => declared.to_string(),
    }
}
