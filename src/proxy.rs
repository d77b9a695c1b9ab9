//! Same-origin proxy for third-party documents.
//!
//! HTML pages are rendered through the headless pool, Word documents are
//! converted to HTML and everything else passes through unmodified.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use url::Url;

use crate::dispatch;
use crate::error::{Result, ViewerError};
use crate::fetcher::{DocumentSource, FetchedDocument};
use crate::headless::RenderPool;
use crate::rich_html;
use crate::word;

pub const HTML_UTF8: &str = "text/html; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// What the proxy hands back for a URL.
pub enum Proxied {
    /// HTML captured from the headless browser.
    Rendered { html: String },
    /// A Word document converted to HTML.
    Converted { html: String },
    /// Any other body, streamed as received.
    Passthrough {
        content_type: String,
        response: reqwest::Response,
    },
}

impl Proxied {
    pub fn content_type(&self) -> &str {
        match self {
            Proxied::Rendered { .. } | Proxied::Converted { .. } => HTML_UTF8,
            Proxied::Passthrough { content_type, .. } => content_type,
        }
    }
}

/// Parse a proxy target, accepting only http and https.
///
/// # Errors
/// * `InvalidUrl` if it doesn't parse
/// * `UnsupportedScheme` for anything other than http(s)
pub fn validate_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ViewerError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ViewerError::UnsupportedScheme(other.to_string())),
    }
}

#[derive(Clone)]
pub struct ProxyService {
    client: reqwest::Client,
    pool: RenderPool,
}

impl ProxyService {
    pub fn new(pool: RenderPool, fetch_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .user_agent(concat!("docview/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ProxyService { client, pool })
    }

    /// Fetch `url` and normalize the body for the browser.
    ///
    /// # Errors
    /// * `Network` if the upstream is unreachable or answers non-2xx
    /// * `RenderTimeout`/`Render` if the headless stage fails
    /// * `Parse` if a Word document can't be converted
    pub async fn proxy(&self, url: &Url) -> Result<Proxied> {
        log::info!("proxying {url}");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ViewerError::Network(format!("Failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ViewerError::Network(format!(
                "Failed to fetch {url}: upstream responded with {status}"
            )));
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(OCTET_STREAM)
            .to_string();
        let content_type = dispatch::effective_content_type(&declared, url.path());

        if dispatch::is_html(&content_type) {
            // The browser loads the page itself; the first response body is not needed.
            drop(response);
            let html = self.pool.render(url.as_str()).await?;
            return Ok(Proxied::Rendered {
                html: rich_html::with_base_href(&html, url.as_str()),
            });
        }

        if dispatch::is_docx(&content_type) {
            let bytes = response.bytes().await?;
            let html = word::docx_to_html(&bytes)?;
            return Ok(Proxied::Converted {
                html: word::html_document(&html),
            });
        }

        Ok(Proxied::Passthrough {
            content_type,
            response,
        })
    }
}

#[async_trait]
impl DocumentSource for ProxyService {
    async fn fetch(&self, url: &Url) -> Result<FetchedDocument> {
        match self.proxy(url).await? {
            Proxied::Rendered { html } | Proxied::Converted { html } => Ok(FetchedDocument {
                content_type: HTML_UTF8.to_string(),
                bytes: Bytes::from(html),
            }),
            Proxied::Passthrough {
                content_type,
                response,
            } => Ok(FetchedDocument {
                content_type,
                bytes: response.bytes().await?,
            }),
        }
    }

    async fn fetch_opaque(&self, url: &Url) -> Result<Bytes> {
        // No status or type checks: the bytes are only offered for download.
        let response = self.client.get(url.clone()).send().await?;
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert_eq!(
            validate_target("https://example.com/a?b=c").unwrap().as_str(),
            "https://example.com/a?b=c"
        );
        assert!(validate_target(" http://example.com ").is_ok());
    }

    #[test]
    fn rejects_other_schemes() {
        for raw in ["file:///etc/passwd", "ftp://example.com/x", "javascript:alert(1)"] {
            assert!(
                matches!(validate_target(raw), Err(ViewerError::UnsupportedScheme(_))),
                "{raw}"
            );
        }
        assert!(matches!(
            validate_target("not a url"),
            Err(ViewerError::InvalidUrl(_))
        ));
    }
}
