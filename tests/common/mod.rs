//! Shared fixtures for the HTTP tests: a local upstream server, a scripted
//! page renderer and request helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
    routing,
};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

use docview::app::{AppState, router};
use docview::config::Config;
use docview::error::Result;
use docview::headless::{PageRenderer, RenderBudget};

pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Renderer that answers with a fixed page after an optional delay.
pub struct ScriptedRenderer {
    pub html: String,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new(html: &str) -> Self {
        ScriptedRenderer {
            html: html.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        ScriptedRenderer {
            delay,
            ..Self::new("<html><body>late</body></html>")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for ScriptedRenderer {
    async fn render(&self, _url: &str, _budget: &RenderBudget) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.html.clone())
    }
}

/// Counts every request the upstream serves.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Start an upstream document server on an ephemeral port.
///
/// Returns its base URL, e.g. `http://127.0.0.1:41234`.
pub async fn upstream(hits: Hits) -> String {
    let workbook = workbook();
    let docx = docx("<w:p><w:r><w:t>Quarterly notes</w:t></w:r></w:p>");

    let app = Router::new()
        .route(
            "/data.csv",
            routing::get(|| async { ([(header::CONTENT_TYPE, "text/csv")], "name,qty\nbolt,4\nnut,\n") }),
        )
        .route(
            "/report.pdf",
            routing::get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], "%PDF-1.7 fake") }),
        )
        .route(
            "/logo.png",
            routing::get(|| async { ([(header::CONTENT_TYPE, "image/png")], &b"\x89PNG\r\n\x1a\n"[..]) }),
        )
        .route(
            "/page.html",
            routing::get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html><body>static</body></html>") }),
        )
        .route(
            "/book.xlsx",
            routing::get(move || {
                let workbook = workbook.clone();
                async move { ([(header::CONTENT_TYPE, XLSX)], workbook) }
            }),
        )
        .route(
            "/notes.docx",
            routing::get(move || {
                let docx = docx.clone();
                async move { ([(header::CONTENT_TYPE, DOCX)], docx) }
            }),
        )
        .route(
            "/deck.pptx",
            routing::get(|| async {
                (
                    [(
                        header::CONTENT_TYPE,
                        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                    )],
                    "PK",
                )
            }),
        )
        .route(
            "/gone",
            routing::get(|| async { (StatusCode::NOT_FOUND, "nothing here") }),
        )
        .layer(axum::middleware::from_fn(
            move |req: Request<Body>, next: axum::middleware::Next| {
                let hits = hits.clone();
                async move {
                    hits.0.fetch_add(1, Ordering::SeqCst);
                    next.run(req).await
                }
            },
        ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn config() -> Config {
    Config {
        max_upload: 64 * 1024,
        fetch_timeout: 5,
        ..Config::default()
    }
}

pub fn app_with(config: Config, renderer: Arc<dyn PageRenderer>) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, renderer).unwrap());
    (router(state.clone()), state)
}

pub fn app(renderer: Arc<dyn PageRenderer>) -> (Router, Arc<AppState>) {
    app_with(config(), renderer)
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    Reply {
        status,
        headers,
        body: body.to_vec(),
    }
}

pub async fn get(app: &Router, uri: &str) -> Reply {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub fn encode(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

const BOUNDARY: &str = "docview-test-boundary";

/// A `multipart/form-data` POST to `/upload` with one file field.
pub fn upload(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    write!(
        body,
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .unwrap();
    body.extend_from_slice(bytes);
    write!(body, "\r\n--{BOUNDARY}--\r\n").unwrap();

    Request::post("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn workbook() -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let north = workbook.add_worksheet();
    north.set_name("North").unwrap();
    north.write_string(0, 0, "Region").unwrap();
    north.write_string(1, 0, "Oslo").unwrap();
    let south = workbook.add_worksheet();
    south.set_name("South").unwrap();
    south.write_string(0, 0, "Region").unwrap();
    south.write_string(1, 0, "Cape Town").unwrap();
    workbook.save_to_buffer().unwrap()
}

/// Minimal `.docx` around the given `<w:body>` content.
pub fn docx(body: &str) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", zip::write::FileOptions::default())
        .unwrap();
    write!(
        zip,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    )
    .unwrap();
    zip.finish().unwrap().into_inner()
}
