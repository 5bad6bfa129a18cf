//! In-memory DOCX and XLSX packages for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main""#;

const S_NS: &str = r#"xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

fn zip_parts(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in parts {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `<w:p>` with one plain run.
pub fn p(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(text)
    )
}

/// `<w:p>` with a bold label run followed by a plain run.
pub fn labeled(label: &str, text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(label),
        escape(text)
    )
}

/// Heading paragraph using the built-in style id.
pub fn heading(level: u8, text: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:pStyle w:val="Heading{}"/></w:pPr><w:r><w:t>{}</w:t></w:r></w:p>"#,
        level,
        escape(text)
    )
}

/// Paragraph holding an inline picture bound to relationship `rel_id`.
pub fn picture(rel_id: &str) -> String {
    format!(
        r#"<w:p><w:r><w:drawing><a:graphic><a:graphicData><a:blip r:embed="{}"/></a:graphicData></a:graphic></w:drawing></w:r></w:p>"#,
        rel_id
    )
}

/// `<w:tc>` holding paragraphs already rendered as XML.
pub fn tc(content: &str) -> String {
    format!("<w:tc>{}</w:tc>", content)
}

/// `<w:tc>` spanning `span` grid columns.
pub fn tc_span(content: &str, span: u32) -> String {
    format!(
        r#"<w:tc><w:tcPr><w:gridSpan w:val="{}"/></w:tcPr>{}</w:tc>"#,
        span, content
    )
}

/// Table of plain-text cells.
pub fn table(rows: &[&[&str]]) -> String {
    let body: String = rows
        .iter()
        .map(|row| {
            let cells: String = row.iter().map(|text| tc(&p(text))).collect();
            format!("<w:tr>{}</w:tr>", cells)
        })
        .collect();
    format!("<w:tbl>{}</w:tbl>", body)
}

/// Table of pre-rendered `<w:tc>` rows.
pub fn table_xml(rows: &[String]) -> String {
    let body: String = rows.iter().map(|r| format!("<w:tr>{}</w:tr>", r)).collect();
    format!("<w:tbl>{}</w:tbl>", body)
}

/// DOCX package with the given body XML.
pub fn docx(body: &str) -> Vec<u8> {
    docx_with(body, &[])
}

/// DOCX package with a body and image relationships `(rel id, png bytes)`.
pub fn docx_with(body: &str, images: &[(&str, &[u8])]) -> Vec<u8> {
    let document = format!(
        "<w:document {}><w:body>{}</w:body></w:document>",
        W_NS, body
    );
    let core = r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>Cédula de solventación</dc:title><dc:creator>Auditoría Interna</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">2024-03-15T10:00:00Z</dcterms:created></cp:coreProperties>"#;

    let mut rels = String::from(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    let mut media = Vec::new();
    for (i, (rel_id, data)) in images.iter().enumerate() {
        rels.push_str(&format!(
            r#"<Relationship Id="{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image{}.png"/>"#,
            rel_id,
            i + 1
        ));
        media.push((format!("word/media/image{}.png", i + 1), *data));
    }
    rels.push_str("</Relationships>");

    let mut parts: Vec<(&str, &[u8])> = vec![
        ("word/document.xml", document.as_bytes()),
        ("word/_rels/document.xml.rels", rels.as_bytes()),
        ("docProps/core.xml", core.as_bytes()),
    ];
    for (name, data) in &media {
        parts.push((name.as_str(), *data));
    }
    zip_parts(&parts)
}

/// Inline-string cell at a reference such as "B2".
pub fn cell(reference: &str, text: &str) -> String {
    format!(
        r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
        reference,
        escape(text)
    )
}

/// Sheet XML from rows of `(reference, text)` cells and merge ranges.
pub fn sheet(rows: &[&[(&str, &str)]], merges: &[&str]) -> String {
    let mut xml = String::from("<sheetData>");
    for (i, row) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, i + 1));
        for (reference, text) in row.iter() {
            xml.push_str(&cell(reference, text));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");
    if !merges.is_empty() {
        xml.push_str(&format!(r#"<mergeCells count="{}">"#, merges.len()));
        for range in merges {
            xml.push_str(&format!(r#"<mergeCell ref="{}"/>"#, range));
        }
        xml.push_str("</mergeCells>");
    }
    xml
}

/// XLSX package; each sheet is `(name, sheet body XML)`. A body starting
/// with `!` is written verbatim (to produce a damaged part).
pub fn xlsx(sheets: &[(&str, &str)]) -> Vec<u8> {
    let mut workbook = format!("<workbook {}><sheets>", S_NS);
    let mut rels = String::from(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    let mut sheet_parts = Vec::new();
    for (i, (name, body)) in sheets.iter().enumerate() {
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            name,
            i + 1,
            i + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));
        let xml = match body.strip_prefix('!') {
            Some(raw) => raw.to_string(),
            None => format!("<worksheet {}>{}</worksheet>", S_NS, body),
        };
        sheet_parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), xml));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    let mut parts: Vec<(&str, &[u8])> = vec![
        ("xl/workbook.xml", workbook.as_bytes()),
        ("xl/_rels/workbook.xml.rels", rels.as_bytes()),
    ];
    for (name, xml) in &sheet_parts {
        parts.push((name.as_str(), xml.as_bytes()));
    }
    zip_parts(&parts)
}
