//! Word (`.docx`) to HTML conversion.
//!
//! Reads `word/document.xml` out of the package and maps the body onto plain
//! HTML: headings, paragraphs, bulleted/numbered items, bold/italic/underline
//! runs, line breaks, hyperlinks and tables. Styling beyond that is dropped.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::Result;
use crate::tabular::escape_html;

const DOCUMENT_XML: &str = "word/document.xml";
const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";

/// Convert a `.docx` file to an HTML fragment of its body.
///
/// # Errors
/// * `Parse` if the bytes are not a Word package or the XML is malformed
pub fn docx_to_html(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut document = String::new();
    archive.by_name(DOCUMENT_XML)?.read_to_string(&mut document)?;

    let links = match archive.by_name(DOCUMENT_RELS) {
        Ok(mut rels) => {
            let mut xml = String::new();
            rels.read_to_string(&mut xml)?;
            relationships(&xml)?
        }
        Err(_) => HashMap::new(),
    };

    BodyWriter::new(links).convert(&document)
}

/// Wrap a body fragment in a standalone HTML document.
pub fn html_document(fragment: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body>{fragment}</body></html>"
    )
}

fn relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut links = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id", &reader)?, attr(&e, b"Target", &reader)?) {
                    links.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(links)
}

fn attr(e: &BytesStart, name: &[u8], reader: &Reader<&[u8]>) -> Result<Option<String>> {
    match e.try_get_attribute(name).map_err(quick_xml::Error::from)? {
        Some(a) => Ok(Some(a.decode_and_unescape_value(reader)?.into_owned())),
        None => Ok(None),
    }
}

/// `w:b`, `w:i` and `w:u` are on unless their value says otherwise.
fn toggle_on(e: &BytesStart, reader: &Reader<&[u8]>) -> Result<bool> {
    Ok(!matches!(
        attr(e, b"w:val", reader)?.as_deref(),
        Some("0" | "false" | "none")
    ))
}

#[derive(Default)]
struct Run {
    bold: bool,
    italic: bool,
    underline: bool,
}

#[derive(Default)]
struct Paragraph {
    html: String,
    style: Option<String>,
    list_item: bool,
}

impl Paragraph {
    fn tag(&self) -> &'static str {
        let style = self.style.as_deref().unwrap_or_default().to_ascii_lowercase();
        match style.as_str() {
            "title" | "heading1" => "h1",
            "subtitle" | "heading2" => "h2",
            "heading3" => "h3",
            "heading4" => "h4",
            "heading5" => "h5",
            "heading6" => "h6",
            _ => "p",
        }
    }
}

struct BodyWriter {
    links: HashMap<String, String>,
    out: String,
    paragraph: Option<Paragraph>,
    run: Run,
    in_text: bool,
    in_list: bool,
}

impl BodyWriter {
    fn new(links: HashMap<String, String>) -> Self {
        BodyWriter {
            links,
            out: String::new(),
            paragraph: None,
            run: Run::default(),
            in_text: false,
            in_list: false,
        }
    }

    fn convert(mut self, xml: &str) -> Result<String> {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event()? {
                Event::Start(e) => self.start(&e, false, &reader)?,
                Event::Empty(e) => self.start(&e, true, &reader)?,
                Event::End(e) => self.end(e.local_name().as_ref()),
                Event::Text(t) if self.in_text => {
                    let text = t.unescape()?;
                    self.text(&text);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        self.close_list();
        Ok(self.out)
    }

    fn start(&mut self, e: &BytesStart, empty: bool, reader: &Reader<&[u8]>) -> Result<()> {
        match e.local_name().as_ref() {
            b"p" if !empty => self.paragraph = Some(Paragraph::default()),
            b"pStyle" => {
                let style = attr(e, b"w:val", reader)?;
                if let Some(p) = self.paragraph.as_mut() {
                    p.style = style;
                }
            }
            b"numPr" => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.list_item = true;
                }
            }
            b"r" if !empty => self.run = Run::default(),
            b"b" => self.run.bold = toggle_on(e, reader)?,
            b"i" => self.run.italic = toggle_on(e, reader)?,
            b"u" => self.run.underline = toggle_on(e, reader)?,
            b"t" if !empty => self.in_text = true,
            b"br" => self.push("<br/>"),
            b"tab" => self.push("\t"),
            b"hyperlink" if !empty => {
                let href = match attr(e, b"r:id", reader)? {
                    Some(id) => self.links.get(&id).cloned(),
                    None => attr(e, b"w:anchor", reader)?.map(|a| format!("#{a}")),
                };
                let open = match href {
                    Some(href) => format!("<a href=\"{}\">", escape_html(&href)),
                    None => "<a>".to_string(),
                };
                self.push(&open);
            }
            b"tbl" if !empty => {
                self.close_list();
                self.out.push_str("<table>");
            }
            b"tr" if !empty => self.out.push_str("<tr>"),
            b"tc" if !empty => self.out.push_str("<td>"),
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) {
        match name {
            b"p" => self.finish_paragraph(),
            b"t" => self.in_text = false,
            b"hyperlink" => self.push("</a>"),
            b"tbl" => self.out.push_str("</table>"),
            b"tr" => self.out.push_str("</tr>"),
            b"tc" => self.out.push_str("</td>"),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        let mut html = escape_html(text);
        if self.run.underline {
            html = format!("<u>{html}</u>");
        }
        if self.run.italic {
            html = format!("<em>{html}</em>");
        }
        if self.run.bold {
            html = format!("<strong>{html}</strong>");
        }
        self.push(&html);
    }

    fn push(&mut self, html: &str) {
        if let Some(p) = self.paragraph.as_mut() {
            p.html.push_str(html);
        }
    }

    fn finish_paragraph(&mut self) {
        let Some(p) = self.paragraph.take() else {
            return;
        };
        if p.html.trim().is_empty() {
            return;
        }
        if p.list_item {
            if !self.in_list {
                self.out.push_str("<ul>");
                self.in_list = true;
            }
            self.out.push_str(&format!("<li>{}</li>", p.html));
        } else {
            self.close_list();
            let tag = p.tag();
            self.out.push_str(&format!("<{tag}>{}</{tag}>", p.html));
        }
    }

    fn close_list(&mut self) {
        if self.in_list {
            self.out.push_str("</ul>");
            self.in_list = false;
        }
    }
}
