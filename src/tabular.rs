//! Tabular rendering: workbooks and CSV to one HTML table per sheet.
//!
//! Workbook decoding is delegated to calamine, CSV decoding to csv-async.

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use csv_async::AsyncReaderBuilder;
use futures::StreamExt;
use std::io::Cursor;

use crate::error::{Result, ViewerError};
use crate::state::Sheet;

/// Error message for spreadsheets and CSV files without rows.
pub const NO_DATA: &str = "No data found in file";

/// Name of the single sheet produced from CSV input.
pub const CSV_SHEET: &str = "Sheet1";

/// Render every sheet of a workbook (xlsx, xls, xlsb or ods) to HTML.
///
/// # Errors
/// * `Parse` if the workbook can't be opened or contains no sheets
pub fn render_workbook(bytes: &[u8]) -> Result<Vec<Sheet>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        sheets.push(Sheet {
            html: table_html(&rows),
            name,
        });
    }

    if sheets.is_empty() {
        return Err(ViewerError::Parse(NO_DATA.to_string()));
    }
    Ok(sheets)
}

/// Render CSV bytes to a single sheet.
///
/// The first record is the header; blank header cells are named `Column N`.
/// Short rows are padded with empty cells, long rows keep their extra cells.
///
/// # Errors
/// * `Parse` if the input has no data rows or isn't valid CSV
pub async fn render_csv(bytes: &[u8]) -> Result<Sheet> {
    let mut reader = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .create_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .await?
        .iter()
        .enumerate()
        .map(|(i, h)| column_name(i, h))
        .collect();

    let mut rows = vec![headers];
    let mut records = reader.records();
    while let Some(record) = records.next().await {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.len() < rows[0].len() {
            row.resize(rows[0].len(), String::new());
        }
        rows.push(row);
    }

    if rows.len() < 2 {
        return Err(ViewerError::Parse(NO_DATA.to_string()));
    }

    Ok(Sheet {
        name: CSV_SHEET.to_string(),
        html: table_html(&rows),
    })
}

fn column_name(index: usize, header: &str) -> String {
    let header = header.trim();
    if header.is_empty() {
        format!("Column {}", index + 1)
    } else {
        header.to_string()
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Build an HTML table whose first row is the header.
pub fn table_html(rows: &[Vec<String>]) -> String {
    let mut html = String::from("<table class=\"sheet\">");
    let mut rows = rows.iter();

    if let Some(header) = rows.next() {
        html.push_str("<thead><tr>");
        for cell in header {
            html.push_str("<th>");
            html.push_str(&escape_html(cell));
            html.push_str("</th>");
        }
        html.push_str("</tr></thead>");
    }

    html.push_str("<tbody>");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(&escape_html(cell));
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn csv_pads_short_rows() {
        let sheet = render_csv(b"a,b,c\n1\n").await.unwrap();
        assert_eq!(sheet.name, "Sheet1");
        assert_eq!(
            sheet.html,
            "<table class=\"sheet\"><thead><tr><th>a</th><th>b</th><th>c</th></tr></thead>\
             <tbody><tr><td>1</td><td></td><td></td></tr></tbody></table>"
        );
    }

    #[tokio::test]
    async fn csv_names_blank_headers() {
        let sheet = render_csv(b"name,,\nx,y,z\n").await.unwrap();
        assert!(sheet.html.contains("<th>Column 2</th><th>Column 3</th>"));
    }

    #[tokio::test]
    async fn csv_without_rows_is_no_data() {
        for input in [&b""[..], b"a,b\n"] {
            match render_csv(input).await {
                Err(ViewerError::Parse(msg)) => assert_eq!(msg, NO_DATA),
                other => panic!("expected no data, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn csv_escapes_markup() {
        let sheet = render_csv(b"h\n<script>alert(1)</script>\n").await.unwrap();
        assert!(sheet.html.contains("&lt;script&gt;"));
        assert!(!sheet.html.contains("<script>"));
    }

    #[test]
    fn garbage_workbook_is_parse_error() {
        assert!(matches!(
            render_workbook(b"not a workbook"),
            Err(ViewerError::Parse(_))
        ));
    }

    #[test]
    fn workbook_renders_every_sheet() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let first = workbook.add_worksheet();
        first.set_name("Totals").unwrap();
        first.write_string(0, 0, "Item").unwrap();
        first.write_number(1, 0, 42.0).unwrap();
        let second = workbook.add_worksheet();
        second.set_name("Notes").unwrap();
        second.write_string(0, 0, "a & b").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheets = render_workbook(&bytes).unwrap();
        let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Totals", "Notes"]);
        assert!(sheets[0].html.contains("<th>Item</th>"));
        assert!(sheets[0].html.contains("<td>42</td>"));
        assert!(sheets[1].html.contains("a &amp; b"));
    }
}
