//! Preparing untrusted HTML for display.
//!
//! Active content is stripped before the markup is placed in the viewer, and
//! relative `href`/`src` attributes are resolved against the document URL so
//! links and images keep working outside their origin.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use url::Url;

lazy_static! {
    static ref PAIRED: Vec<Regex> = ["script", "iframe", "object", "noscript", "frameset"]
        .iter()
        .map(|tag| element_regex(tag))
        .collect();
    static ref VOID: Regex =
        Regex::new(r#"(?is)<(?:embed|base|frame|applet)\b[^>]*>|<meta\b[^>]*http-equiv[^>]*>|</?(?:script|iframe|object|noscript|frameset)\b[^>]*>"#)
            .unwrap();
    static ref HANDLER: Regex =
        Regex::new(r#"(?i)[\s/]+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
            .unwrap();
    static ref LINK_ATTR: Regex =
        Regex::new(r#"(?i)\b(href|src|action|formaction|xlink:href|data|poster)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#)
            .unwrap();
    static ref ENTITY: Regex =
        Regex::new(r"(?i)&(?:#x([0-9a-f]+)|#([0-9]+)|([a-z]+));?").unwrap();
    static ref URL_ATTR: Regex =
        Regex::new(r#"(?i)\b(href|src)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .unwrap();
    static ref HEAD: Regex =
        Regex::new(r"(?i)<head\b[^>]*>").unwrap();
}

fn element_regex(tag: &str) -> Regex {
    Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
        .unwrap()
}

/// Remove scripts, frames, plugins, inline handlers and script URLs.
pub fn sanitize(html: &str) -> String {
    let mut out = html.to_string();
    for re in PAIRED.iter() {
        out = re.replace_all(&out, "").into_owned();
    }
    out = VOID.replace_all(&out, "").into_owned();
    out = HANDLER.replace_all(&out, "").into_owned();
    LINK_ATTR
        .replace_all(&out, |caps: &Captures| {
            let value = (2..=4).find_map(|i| caps.get(i)).map_or("", |m| m.as_str());
            if !is_script_url(value) {
                return caps[0].to_string();
            }
            let quote = match (caps.get(2), caps.get(3)) {
                (Some(_), _) => "\"",
                (None, Some(_)) => "'",
                _ => "",
            };
            format!("{}={quote}about:blank#{quote}", &caps[1])
        })
        .into_owned()
}

/// Whether an attribute value resolves to a script-bearing URL once
/// character references and the whitespace browsers ignore are removed.
fn is_script_url(value: &str) -> bool {
    let decoded = decode_entities(value);
    let scheme: String = decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    ["javascript:", "vbscript:", "data:text/html"]
        .iter()
        .any(|prefix| scheme.starts_with(prefix))
}

fn decode_entities(value: &str) -> String {
    ENTITY
        .replace_all(value, |caps: &Captures| {
            let code = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(hex), _, _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (None, Some(dec), _) => dec.as_str().parse().ok(),
                (None, None, Some(name)) => match name.as_str().to_ascii_lowercase().as_str() {
                    "colon" => Some(':' as u32),
                    "tab" => Some('\t' as u32),
                    "newline" => Some('\n' as u32),
                    "sol" => Some('/' as u32),
                    "amp" => Some('&' as u32),
                    _ => None,
                },
                _ => None,
            };
            code.and_then(char::from_u32)
                .map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Make `href` and `src` attributes absolute relative to `base`.
///
/// Fragment-only links stay relative.
pub fn absolutize(html: &str, base: &Url) -> String {
    URL_ATTR
        .replace_all(html, |caps: &Captures| {
            let attr = &caps[1];
            let (value, quote) = match (caps.get(2), caps.get(3)) {
                (Some(v), _) => (v.as_str(), '"'),
                (None, Some(v)) => (v.as_str(), '\''),
                (None, None) => return caps[0].to_string(),
            };
            if value.starts_with('#') || value.is_empty() {
                return caps[0].to_string();
            }
            match base.join(value) {
                Ok(url) => format!("{attr}={quote}{url}{quote}"),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Sanitize HTML and resolve its links against the document URL, if known.
pub fn prepare(html: &str, document_url: Option<&str>) -> String {
    let clean = sanitize(html);
    match document_url.and_then(|u| Url::parse(u).ok()) {
        Some(base) if matches!(base.scheme(), "http" | "https") => absolutize(&clean, &base),
        _ => clean,
    }
}

/// Insert `<base href>` so relative resources resolve against `url`.
pub fn with_base_href(html: &str, url: &str) -> String {
    let tag = format!("<base href=\"{}\">", crate::tabular::escape_html(url));
    match HEAD.find(html) {
        Some(m) => format!("{}{}{}", &html[..m.end()], tag, &html[m.end()..]),
        None => format!("{tag}{html}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_and_handlers() {
        let html = "<p onclick=\"steal()\">hi</p><script>alert(1)</script>\
                    <SCRIPT src=x.js></SCRIPT><iframe src=\"https://evil\"></iframe>\
                    <img src=x onerror=alert(1)><embed src=a.swf>";
        assert_eq!(sanitize(html), "<p>hi</p><img src=x>");
    }

    #[test]
    fn neutralizes_script_urls() {
        let out = sanitize("<a href=\"javascript:alert(1)\">x</a>");
        assert!(!out.contains("javascript"));
        assert!(out.starts_with("<a href=\"about:blank#"));
    }

    #[test]
    fn slash_separated_handlers_are_stripped() {
        let out = sanitize("<img/src=x/onerror=alert(1)><svg/onload=alert(2)>");
        assert!(!out.contains("onerror"), "{out}");
        assert!(!out.contains("onload"), "{out}");
        assert_eq!(out, "<img/src=x><svg>");
    }

    #[test]
    fn encoded_script_urls_are_neutralized() {
        let out = prepare(
            "<a href=\"&#106;avascript:alert(1)\">x</a>\
             <a href='java&#x09;script&colon;alert(2)'>y</a>\
             <a href=JAVASCRIPT&#58;alert(3)>z</a>",
            Some("/blobs/6f0c1f7e-3a5b-4c1d-9e2f-0a1b2c3d4e5f"),
        );
        assert!(!out.contains("avascript"), "{out}");
        assert!(!out.contains("alert"), "{out}");
        assert_eq!(
            out,
            "<a href=\"about:blank#\">x</a><a href='about:blank#'>y</a><a href=about:blank#>z</a>"
        );
    }

    #[test]
    fn ordinary_links_survive() {
        let html = "<a href=\"/docs?a=1&amp;b=2\">d</a><img src='data:image/png;base64,AA'>";
        assert_eq!(sanitize(html), html);
    }

    #[test]
    fn removes_refresh_and_base() {
        let out = sanitize(
            "<meta http-equiv=\"refresh\" content=\"0;url=https://evil\"><base href=\"https://x/\"><p>a</p>",
        );
        assert_eq!(out, "<p>a</p>");
    }

    #[test]
    fn resolves_relative_links() {
        let base = Url::parse("https://example.com/docs/index.html").unwrap();
        let out = absolutize(
            "<a href=\"page.html\">p</a><a href='#top'>t</a><img src=\"/logo.png\">",
            &base,
        );
        assert_eq!(
            out,
            "<a href=\"https://example.com/docs/page.html\">p</a><a href='#top'>t</a>\
             <img src=\"https://example.com/logo.png\">"
        );
    }

    #[test]
    fn prepare_skips_non_http_bases() {
        assert_eq!(prepare("<a href=\"x\">x</a>", Some("/blobs/abc")), "<a href=\"x\">x</a>");
    }

    #[test]
    fn base_goes_into_head() {
        assert_eq!(
            with_base_href("<html><head><title>t</title></head></html>", "https://a.example/b/"),
            "<html><head><base href=\"https://a.example/b/\"><title>t</title></head></html>"
        );
        assert_eq!(
            with_base_href("<p>x</p>", "https://a.example/"),
            "<base href=\"https://a.example/\"><p>x</p>"
        );
    }
}
