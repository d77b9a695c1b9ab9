//! HTML pages: the host page and the viewer drawn from a [`RenderState`].

use handlebars::Handlebars;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::bridge;
use crate::error::Result;
use crate::state::{EmbedKind, RenderState};

/// Host page with the URL bar, upload control and viewer frame.
pub const INDEX: &str = include_str!("static/index.html");

const VIEWER: &str = "viewer";

/// Path of the viewer page for `url` in view `view`.
pub fn viewer_path(url: &str, view: &str) -> String {
    format!(
        "/view?url={}&view={}",
        urlencoding::encode(url),
        urlencoding::encode(view)
    )
}

/// Fresh nonce for the viewer's scripts and styles.
pub fn new_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Policy for viewer pages: only nonce-tagged scripts run, no plugins, no
/// `<base>` rewriting.
pub fn content_security_policy(nonce: &str) -> String {
    format!(
        "script-src 'nonce-{nonce}'; object-src 'none'; base-uri 'none'; form-action 'none'"
    )
}

pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_template_string(VIEWER, include_str!("static/viewer.hbs"))?;
        Ok(Pages { registry })
    }

    /// Draw the viewer page for a view's current state.
    pub fn viewer(&self, state: &RenderState, url: &str, view: &str, nonce: &str) -> Result<String> {
        let mut data = state_context(state);
        data["title"] = json!(title(url));
        data["nonce"] = json!(nonce);
        data["view"] = json!(view);
        data["retry"] = json!(viewer_path(url, view));
        data["bridge"] = json!(bridge::SCRIPT);
        Ok(self.registry.render(VIEWER, &data)?)
    }
}

fn state_context(state: &RenderState) -> Value {
    match state {
        RenderState::Loading => json!({ "loading": true }),
        RenderState::Error { message } => json!({ "error": { "message": message } }),
        RenderState::Table {
            sheets,
            active_sheet,
        } => {
            let sheets: Vec<Value> = sheets
                .iter()
                .map(|s| {
                    json!({
                        "name": s.name,
                        "html": s.html,
                        "active": &s.name == active_sheet,
                    })
                })
                .collect();
            json!({ "table": { "multiple": sheets.len() > 1, "sheets": sheets } })
        }
        RenderState::RichHtml { html } => json!({ "rich": { "html": html } }),
        RenderState::Embed {
            kind: EmbedKind::Pdf,
            url,
        } => json!({ "pdf": { "url": url } }),
        RenderState::Embed {
            kind: EmbedKind::Image,
            url,
        } => json!({ "image": { "url": url } }),
        RenderState::Download { url, message } => {
            json!({ "download": { "url": url, "message": message } })
        }
    }
}

fn title(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
}
