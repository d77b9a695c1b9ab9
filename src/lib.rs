/*!
# Document Viewer

A browser-based viewer for remote and uploaded documents, built in Rust.

## Overview

Documents are fetched through a same-origin proxy, classified by content type
and shown with a renderer suited to their format: spreadsheets and CSV files as
HTML tables, Word documents and web pages as sanitized rich HTML, PDFs and
images as embeds, and anything else as a download link.

## Architecture

### Proxy Layer
- `GET /proxy?url=` fetches a remote document on the server's side
- HTML pages are rendered by a headless Chromium so script-built content is
  captured, with a `<base href>` so relative links keep working
- `.docx` files are converted to HTML, everything else is streamed through

### Viewer Layer
- **fetcher**: loads a document from an `http(s)` URL or an object URL
- **dispatch**: maps a content type to a renderer
- **tabular**, **word**, **rich_html**: turn bytes into displayable HTML
- **state**: per-view display state; only the latest fetch may commit
- **page**: draws the viewer page from the current state
- **bridge**: forwards link clicks in rendered content to the host page

### Supporting Modules
- **blobs**: object URLs for uploaded and fetched bytes
- **headless**: pooled headless browser with launch/navigation/load budgets
- **config**: command line and `DOCVIEW_*` environment settings
- **error**: error type and its HTTP mapping
- **app**: routing and middleware

## REST API Endpoints

- `/proxy?url=` - Same-origin proxy
- `/upload` - Multipart upload, answers with the file and an `X-Object-Url`
- `/view?url=&view=&sheet=` - Viewer page
- `/api/render?url=&view=` - Viewer state as JSON
- `/api/views/{id}/sheet` - Switch the visible sheet without re-fetching
- `/api/navigate?view=` - Resolve a bridged link click to a viewer location
- `/blobs/{id}` - Read or revoke an object URL
*/

pub mod app;
pub mod blobs;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetcher;
pub mod headless;
pub mod page;
pub mod proxy;
pub mod render;
pub mod rich_html;
pub mod state;
pub mod tabular;
pub mod word;

pub use app::{AppState, router};
pub use config::Config;
pub use error::{Result, ViewerError};
