use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::Field},
    http::{
        HeaderValue, Method, StatusCode,
        header::{self, HeaderName},
    },
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::blobs::{BlobRef, BlobStore};
use crate::bridge::{self, BridgeMessage};
use crate::config::Config;
use crate::dispatch;
use crate::error::{Result, ViewerError};
use crate::fetcher::Fetcher;
use crate::headless::{ChromeRenderer, PageRenderer, RenderPool};
use crate::page::{self, Pages};
use crate::proxy::{self, HTML_UTF8, Proxied, ProxyService};
use crate::render::Pipeline;
use crate::state::{RenderState, ViewRegistry};
use crate::word;

/// Cookie that remembers the view id of a browser tab's viewer.
pub const VIEW_COOKIE: &str = "docview_view";

/// Header carrying the object URL of an upload.
pub const OBJECT_URL_HEADER: &str = "x-object-url";

/// Multipart framing allowance on top of the upload limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// How often idle views and expired object URLs are collected.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Policy for user-supplied bytes served from this origin.
const UNTRUSTED_CSP: &str = "sandbox";

pub struct AppState {
    pub config: Config,
    pub proxy: ProxyService,
    pub pipeline: Pipeline,
    pub blobs: BlobStore,
    pub views: ViewRegistry,
    pub pages: Pages,
}

impl AppState {
    /// Build the application around a page renderer.
    pub fn new(config: Config, renderer: Arc<dyn PageRenderer>) -> Result<Self> {
        let pool = RenderPool::new(renderer, config.max_renders, config.render_budget());
        let proxy = ProxyService::new(pool, config.fetch_timeout())?;
        let blobs = BlobStore::new();
        let fetcher = Fetcher::new(Arc::new(proxy.clone()), blobs.clone());

        Ok(AppState {
            pipeline: Pipeline::new(fetcher, blobs.clone()),
            proxy,
            blobs: blobs.clone(),
            views: ViewRegistry::bounded(config.max_views, blobs.clone()),
            pages: Pages::new()?,
            config,
        })
    }

    /// Build the application with the configured Chromium binary.
    pub fn from_config(config: Config) -> Result<Self> {
        let renderer = Arc::new(ChromeRenderer::new(config.chrome.clone()));
        Self::new(config, renderer)
    }

    /// Run a fetch-and-render cycle for a view and commit it if still current.
    ///
    /// # Errors
    /// * `Superseded` if another cycle for the same view started meanwhile
    pub async fn load(&self, view: &str, url: &str) -> Result<RenderState> {
        let token = self.views.with(view, |v| v.begin(url, &self.blobs));
        let rendered = self.pipeline.run(url).await;
        self.views.with(view, |v| {
            v.commit(token, rendered, &self.blobs)
                .map(|()| v.state().clone())
        })
    }

    /// Close idle views, then drop object URLs that outlived their TTL and
    /// belong to no view. Returns the number of views and blobs removed.
    pub fn sweep(&self) -> (usize, usize) {
        let now = Utc::now();
        let views = self
            .views
            .sweep(cutoff(now, self.config.view_ttl()), &self.blobs);
        let blobs = self
            .blobs
            .sweep(cutoff(now, self.config.blob_ttl()), &self.views.owned_blobs());
        if views + blobs > 0 {
            log::info!("swept {views} idle views and {blobs} expired object URLs");
        }
        (views, blobs)
    }
}

fn cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Periodically run [`AppState::sweep`] until the runtime shuts down.
fn spawn_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticks.tick().await;
            state.sweep();
        }
    });
}

#[derive(Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ViewQuery {
    url: Option<String>,
    view: Option<String>,
    sheet: Option<String>,
}

#[derive(Deserialize)]
struct NavigateQuery {
    view: Option<String>,
}

#[derive(Deserialize)]
struct SheetSelection {
    name: String,
}

#[derive(Serialize)]
struct ViewResponse {
    view: String,
    url: Option<String>,
    #[serde(flatten)]
    state: RenderState,
}

#[derive(Serialize)]
struct NavigateResponse {
    location: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload + MULTIPART_OVERHEAD;
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(serve_index))
        .route("/health", get(health))
        .route("/bridge.js", get(serve_bridge))
        .route("/proxy", get(proxy_document))
        .route(
            "/upload",
            post(upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/view", get(view_page))
        .route("/api/render", get(render_json))
        .route("/api/navigate", post(navigate))
        .route("/api/views/:id", delete(close_view))
        .route("/api/views/:id/sheet", put(select_sheet))
        .route("/blobs/:id", get(get_blob).delete(revoke_blob))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(OBJECT_URL_HEADER)])
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = config.addr;
    let state = Arc::new(AppState::from_config(config)?);
    spawn_sweeper(state.clone());
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    log::info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(page::INDEX)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "views": state.views.len(),
        "object_urls": state.blobs.len(),
    }))
}

async fn serve_bridge() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        bridge::SCRIPT,
    )
}

async fn proxy_document(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProxyQuery>,
) -> Result<Response> {
    let raw = params
        .url
        .ok_or_else(|| ViewerError::InvalidUrl("missing 'url' parameter".into()))?;
    let url = proxy::validate_target(&raw)?;

    let proxied = state.proxy.proxy(&url).await?;
    let content_type = proxied.content_type().to_string();
    let response = match proxied {
        Proxied::Rendered { html } | Proxied::Converted { html } => {
            ([(header::CONTENT_TYPE, content_type)], html).into_response()
        }
        Proxied::Passthrough { response, .. } => {
            let mut builder = Response::builder().header(header::CONTENT_TYPE, content_type);
            if let Some(len) = response.content_length() {
                builder = builder.header(header::CONTENT_LENGTH, len);
            }
            builder
                .body(Body::from_stream(response.bytes_stream()))
                .map_err(|e| ViewerError::Network(e.to_string()))?
        }
    };
    Ok(response)
}

async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response> {
    let limit = state.config.max_upload;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(display_filename)
            .unwrap_or_else(|| "upload".to_string());
        let declared = field.content_type().unwrap_or_default().to_string();
        let content_type = dispatch::effective_content_type(&declared, &filename);
        if !dispatch::is_allowed_upload(&content_type) {
            return Err(ViewerError::UnsupportedMediaType(content_type));
        }

        let bytes = read_field(field, limit).await?;
        log::info!("upload '{filename}' ({content_type}, {} bytes)", bytes.len());
        let object_url = state
            .blobs
            .insert(bytes.clone(), &content_type, Some(filename.clone()));

        let response = if dispatch::is_docx(&content_type) {
            let html = word::html_document(&word::docx_to_html(&bytes)?);
            (
                [
                    (header::CONTENT_TYPE, HTML_UTF8.to_string()),
                    (header::CONTENT_SECURITY_POLICY, UNTRUSTED_CSP.to_string()),
                    (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
                    (HeaderName::from_static(OBJECT_URL_HEADER), object_url),
                ],
                html,
            )
                .into_response()
        } else {
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("inline; filename=\"{filename}\""),
                    ),
                    (header::CONTENT_SECURITY_POLICY, UNTRUSTED_CSP.to_string()),
                    (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
                    (HeaderName::from_static(OBJECT_URL_HEADER), object_url),
                ],
                bytes,
            )
                .into_response()
        };
        return Ok(response);
    }

    Err(ViewerError::MissingFile)
}

async fn read_field(mut field: Field<'_>, limit: usize) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if buf.len() + chunk.len() > limit {
            return Err(ViewerError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

fn multipart_error(e: axum::extract::multipart::MultipartError, limit: usize) -> ViewerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ViewerError::PayloadTooLarge { limit }
    } else {
        ViewerError::Upload(e.body_text())
    }
}

/// File name safe to echo in a quoted header parameter.
fn display_filename(name: &str) -> String {
    let name: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    if name.is_empty() {
        "upload".to_string()
    } else {
        name
    }
}

fn view_id(requested: Option<String>, jar: &CookieJar) -> String {
    requested
        .filter(|v| !v.is_empty())
        .or_else(|| jar.get(VIEW_COOKIE).map(|c| c.value().to_string()))
        .unwrap_or_else(ViewRegistry::new_id)
}

/// Load `url` into the view, or return the view's current state when no URL
/// is given. An optional sheet is selected afterwards without re-fetching.
async fn resolve_view(
    state: &AppState,
    view: &str,
    url: Option<String>,
    sheet: Option<String>,
) -> Result<(Option<String>, RenderState)> {
    let (url, mut current) = match url {
        Some(url) => {
            let rendered = state.load(view, &url).await?;
            (Some(url), rendered)
        }
        None => state
            .views
            .try_with(view, |v| (v.url().map(str::to_string), v.state().clone()))
            .ok_or_else(|| ViewerError::InvalidUrl("missing 'url' parameter".into()))?,
    };

    if let Some(sheet) = sheet {
        if state.views.try_with(view, |v| v.select_sheet(&sheet)) == Some(true) {
            current.select_sheet(&sheet);
        }
    }
    Ok((url, current))
}

async fn view_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<ViewQuery>,
) -> Result<Response> {
    let view = view_id(params.view, &jar);
    let (url, current) = resolve_view(&state, &view, params.url, params.sheet).await?;

    let nonce = page::new_nonce();
    let body = state
        .pages
        .viewer(&current, url.as_deref().unwrap_or_default(), &view, &nonce)?;
    let cookie = Cookie::build((VIEW_COOKIE, view)).path("/").http_only(true);

    Ok((
        jar.add(cookie),
        [(
            header::CONTENT_SECURITY_POLICY,
            page::content_security_policy(&nonce),
        )],
        Html(body),
    )
        .into_response())
}

async fn render_json(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<ViewQuery>,
) -> Result<Json<ViewResponse>> {
    let view = view_id(params.view, &jar);
    let (url, current) = resolve_view(&state, &view, params.url, params.sheet).await?;
    Ok(Json(ViewResponse {
        view,
        url,
        state: current,
    }))
}

async fn select_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(selection): Json<SheetSelection>,
) -> Result<Json<ViewResponse>> {
    let (url, current, selected) = state
        .views
        .try_with(&id, |v| {
            let selected = v.select_sheet(&selection.name);
            (v.url().map(str::to_string), v.state().clone(), selected)
        })
        .ok_or_else(|| ViewerError::NotFound(format!("View '{id}'")))?;

    if !selected {
        return Err(ViewerError::NotFound(format!("Sheet '{}'", selection.name)));
    }
    Ok(Json(ViewResponse {
        view: id,
        url,
        state: current,
    }))
}

async fn close_view(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode> {
    if state.views.remove(&id, &state.blobs) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ViewerError::NotFound(format!("View '{id}'")))
    }
}

async fn navigate(
    Query(params): Query<NavigateQuery>,
    jar: CookieJar,
    Json(message): Json<BridgeMessage>,
) -> Result<Json<NavigateResponse>> {
    let BridgeMessage::LinkClick { url } = &message;
    if BlobRef::parse(url).is_none() {
        proxy::validate_target(url)?;
    }
    let view = view_id(params.view, &jar);
    Ok(Json(NavigateResponse {
        location: message.viewer_path(&view),
    }))
}

async fn get_blob(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Response> {
    let blob = state
        .blobs
        .get(&id)
        .ok_or_else(|| ViewerError::NotFound(format!("Object URL '{id}'")))?;

    let disposition = match &blob.filename {
        Some(name) => format!("inline; filename=\"{name}\""),
        None => "inline".to_string(),
    };
    Ok((
        [
            (header::CONTENT_TYPE, blob.content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_SECURITY_POLICY, UNTRUSTED_CSP.to_string()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        blob.bytes,
    )
        .into_response())
}

async fn revoke_blob(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode> {
    if state.blobs.revoke(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ViewerError::NotFound(format!("Object URL '{id}'")))
    }
}
