//! Tests for the same-origin proxy endpoint.
//!
//! Every test starts a real upstream on an ephemeral port; the headless
//! browser is replaced with a scripted renderer.

mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use common::*;

#[tokio::test]
async fn binary_documents_pass_through() {
    let base = upstream(Hits::default()).await;
    let (app, _) = app(Arc::new(ScriptedRenderer::new("<html></html>")));

    let reply = get(&app, &format!("/proxy?url={}", encode(&format!("{base}/report.pdf")))).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("content-type"), "application/pdf");
    assert_eq!(reply.body, b"%PDF-1.7 fake");
}

#[tokio::test]
async fn html_is_rendered_headlessly_with_base_href() {
    let base = upstream(Hits::default()).await;
    let renderer = Arc::new(ScriptedRenderer::new(
        "<html><head><title>t</title></head><body><a href=\"next.html\">next</a><p>built by script</p></body></html>",
    ));
    let (app, _) = app(renderer.clone());
    let target = format!("{base}/page.html");

    let reply = get(&app, &format!("/proxy?url={}", encode(&target))).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("content-type"), "text/html; charset=utf-8");
    let body = reply.text();
    assert!(body.contains(&format!("<head><base href=\"{target}\">")), "{body}");
    assert!(body.contains("built by script"));
    assert!(!body.contains("static"));
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn word_documents_are_converted() {
    let base = upstream(Hits::default()).await;
    let (app, _) = app(Arc::new(ScriptedRenderer::new("<html></html>")));

    let reply = get(&app, &format!("/proxy?url={}", encode(&format!("{base}/notes.docx")))).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("content-type"), "text/html; charset=utf-8");
    assert!(reply.text().contains("<p>Quarterly notes</p>"));
}

#[tokio::test]
async fn render_timeout_is_a_descriptive_error() {
    let base = upstream(Hits::default()).await;
    let config = docview::config::Config {
        navigation_timeout: 0,
        load_timeout: 0,
        ..config()
    };
    let (app, _) = app_with(config, Arc::new(ScriptedRenderer::slow(Duration::from_secs(5))));

    let reply = get(&app, &format!("/proxy?url={}", encode(&format!("{base}/page.html")))).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = reply.json()["error"].as_str().unwrap().to_string();
    assert!(error.contains("timed out during load"), "{error}");
}

#[tokio::test]
async fn upstream_failures_are_server_errors() {
    let base = upstream(Hits::default()).await;
    let (app, _) = app(Arc::new(ScriptedRenderer::new("<html></html>")));

    let reply = get(&app, &format!("/proxy?url={}", encode(&format!("{base}/gone")))).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = reply.json()["error"].as_str().unwrap().to_string();
    assert!(error.contains("404"), "{error}");
}

#[tokio::test]
async fn only_http_targets_are_accepted() {
    let (app, _) = app(Arc::new(ScriptedRenderer::new("<html></html>")));

    for target in ["file:///etc/passwd", "ftp://example.com/a.pdf", "not a url"] {
        let reply = get(&app, &format!("/proxy?url={}", encode(target))).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{target}");
        assert!(reply.json()["error"].is_string());
    }

    let reply = get(&app, "/proxy").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}
