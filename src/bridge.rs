//! Interaction bridge between rendered content and the host page.
//!
//! Inside the viewer, a capturing click handler on the content container turns
//! anchor clicks into a [`BridgeMessage`] posted to the parent window instead of
//! navigating the frame. The host page answers by loading the new URL.

use serde::{Deserialize, Serialize};

/// Script bound to the viewer's `#content` container.
pub const SCRIPT: &str = include_str!("static/bridge.js");

/// Messages posted from the viewer frame to its parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeMessage {
    LinkClick { url: String },
}

impl BridgeMessage {
    pub fn link_click(url: impl Into<String>) -> Self {
        BridgeMessage::LinkClick { url: url.into() }
    }

    /// The viewer page that shows the link target in view `view`.
    pub fn viewer_path(&self, view: &str) -> String {
        match self {
            BridgeMessage::LinkClick { url } => crate::page::viewer_path(url, view),
        }
    }
}
