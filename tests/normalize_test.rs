//! Normalization of real DOCX and XLSX packages.

mod common;

use common::*;
use solvex::model::{Anchor, Node};
use solvex::normalize::normalize_with_options;
use solvex::{detect_kind, normalize, DocumentKind, Error, NormalizeOptions};

#[test]
fn test_detect_both_kinds() {
    let flow = docx(&p("Informe"));
    let grid = xlsx(&[("Hoja1", &sheet(&[&[("A1", "x")]], &[]))]);
    assert_eq!(detect_kind(&flow).unwrap(), DocumentKind::Flow);
    assert_eq!(detect_kind(&grid).unwrap(), DocumentKind::Grid);
}

#[test]
fn test_docx_metadata_and_headings() {
    let body = format!("{}{}", heading(1, "Resultados"), p("Sin hallazgos"));
    let tree = normalize(&docx(&body), DocumentKind::Flow).unwrap();

    assert_eq!(tree.metadata.title.as_deref(), Some("Cédula de solventación"));
    assert_eq!(tree.metadata.author.as_deref(), Some("Auditoría Interna"));
    assert!(tree.metadata.created.is_some());

    let headings = tree.headings();
    assert_eq!(headings.len(), 1);
    assert_eq!(headings[0].text, "Resultados");
    assert!(tree.plain_text().contains("Sin hallazgos"));
}

#[test]
fn test_docx_merged_cell_is_one_cell() {
    let body = table_xml(&[
        tc_span(&p("Observación: el inventario no coincide"), 3),
        format!("{}{}{}", tc(&p("a")), tc(&p("b")), tc(&p("c"))),
    ]);
    let tree = normalize(&docx(&body), DocumentKind::Flow).unwrap();
    let (_, table) = tree.tables().next().unwrap();

    assert_eq!(table.rows[0].cells.len(), 1);
    assert_eq!(table.rows[0].cells[0].col_span, 3);
    assert_eq!(table.rows[1].cells[2].col, 2);
}

#[test]
fn test_docx_image_bound_to_cell() {
    let body = table_xml(&[tc(&format!("{}{}", p("Anexo"), picture("rId7")))]);
    let tree = normalize(&docx_with(&body, &[("rId7", PNG)]), DocumentKind::Flow).unwrap();

    assert_eq!(tree.images.len(), 1);
    assert_eq!(tree.images[0].mime_type, "image/png");
    assert!(matches!(tree.images[0].anchor, Anchor::Cell(cell) if cell.row == 0 && cell.col == 0));
}

#[test]
fn test_xlsx_sheets_become_sections() {
    let first = sheet(
        &[
            &[("A1", "Observación"), ("B1", "Propuesta de solventación")],
            &[("A2", "Faltan pólizas"), ("B2", "Integrar pólizas")],
        ],
        &[],
    );
    let second = sheet(&[&[("A1", "Notas")]], &["A1:C1"]);
    let tree = normalize(&xlsx(&[("Cédula", &first), ("Notas", &second)]), DocumentKind::Grid).unwrap();

    assert_eq!(tree.kind, DocumentKind::Grid);
    assert_eq!(tree.sections.len(), 2);
    assert_eq!(tree.section_name(0), Some("Cédula"));
    assert_eq!(tree.metadata.sheets, vec!["Cédula", "Notas"]);

    let Node::Table(notes) = &tree.sections[1].nodes[0] else {
        panic!("sheet should normalize to a table");
    };
    assert_eq!(notes.rows[0].cells[0].col_span, 3);
}

#[test]
fn test_damaged_sheet_lenient_keeps_raw_text() {
    let good = sheet(&[&[("A1", "ok")]], &[]);
    let broken = "!<worksheet><sheetData><row r=\"1\"><c r=\"A1\" t=\"inlineStr\"><is><t>Observación salvada</t></is></c></row>";
    let bytes = xlsx(&[("Buena", &good), ("Rota", broken)]);

    let tree = normalize(&bytes, DocumentKind::Grid).unwrap();
    assert!(tree.is_damaged());
    assert_eq!(tree.damaged.len(), 1);
    assert_eq!(tree.damaged[0].name, "Rota");
    assert!(tree.damaged[0].raw_text.contains("Observación salvada"));
    assert_eq!(tree.sections.len(), 2);
}

#[test]
fn test_damaged_sheet_strict_fails() {
    let broken = "!<worksheet><sheetData>";
    let bytes = xlsx(&[("Rota", broken)]);

    let options = NormalizeOptions::new().strict();
    let result = normalize_with_options(&bytes, Some(DocumentKind::Grid), &options);
    assert!(matches!(result, Err(Error::CorruptDocument(_))));
}

#[test]
fn test_not_a_package() {
    let result = normalize(b"PK\x03\x04not really a zip", DocumentKind::Flow);
    assert!(result.is_err());
}
