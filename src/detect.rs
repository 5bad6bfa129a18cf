//! Document kind detection from content and file names.

use crate::error::{Error, Result};
use crate::model::DocumentKind;
use crate::normalize::package::Package;
use std::path::Path;

const FLOW_CONTENT_TYPE: &str = "wordprocessingml.document.main";
const GRID_CONTENT_TYPE: &str = "spreadsheetml.sheet.main";
const GRID_MACRO_CONTENT_TYPE: &str = "ms-excel.sheet.macroEnabled.main";

/// Detect the document kind from raw bytes.
///
/// The bytes must be an OOXML package; the kind is read from the part
/// layout and, failing that, from `[Content_Types].xml`.
///
/// # Returns
/// * `Ok(DocumentKind)` for word-processor and spreadsheet packages
/// * `Err(Error::UnsupportedFormat)` for anything else
///
/// # Example
/// ```no_run
/// use solvex::detect::detect_kind;
///
/// let bytes = std::fs::read("cedula.xlsx").unwrap();
/// println!("{}", detect_kind(&bytes).unwrap());
/// ```
pub fn detect_kind(bytes: &[u8]) -> Result<DocumentKind> {
    if bytes.len() < 4 {
        return Err(Error::UnsupportedFormat("input too short".to_string()));
    }
    let mut package = Package::open(bytes)?;

    if package.has("word/document.xml") {
        return Ok(DocumentKind::Flow);
    }
    if package.has("xl/workbook.xml") {
        return Ok(DocumentKind::Grid);
    }

    let content_types = package.read_string("[Content_Types].xml")?.unwrap_or_default();
    if content_types.contains(FLOW_CONTENT_TYPE) {
        Ok(DocumentKind::Flow)
    } else if content_types.contains(GRID_CONTENT_TYPE)
        || content_types.contains(GRID_MACRO_CONTENT_TYPE)
    {
        Ok(DocumentKind::Grid)
    } else {
        Err(Error::UnsupportedFormat(
            "zip archive is neither a word-processor nor a spreadsheet package".to_string(),
        ))
    }
}

/// Detect the kind of a file: by extension when it is a known one,
/// otherwise by content.
pub fn detect_kind_from_path<P: AsRef<Path>>(path: P) -> Result<DocumentKind> {
    let path = path.as_ref();
    if let Some(kind) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(DocumentKind::from_extension)
    {
        return Ok(kind);
    }
    let bytes = std::fs::read(path)?;
    detect_kind(&bytes)
}

/// Check if bytes look like a supported document.
pub fn is_supported_bytes(bytes: &[u8]) -> bool {
    detect_kind(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn zip_with(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_detect_flow_and_grid() {
        let docx = zip_with(&[("word/document.xml", "<w:document/>")]);
        assert_eq!(detect_kind(&docx).unwrap(), DocumentKind::Flow);

        let xlsx = zip_with(&[("xl/workbook.xml", "<workbook/>")]);
        assert_eq!(detect_kind(&xlsx).unwrap(), DocumentKind::Grid);
    }

    #[test]
    fn test_detect_by_content_types() {
        let renamed = zip_with(&[(
            "[Content_Types].xml",
            "<Types><Override ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/></Types>",
        )]);
        assert_eq!(detect_kind(&renamed).unwrap(), DocumentKind::Grid);
    }

    #[test]
    fn test_detect_unknown() {
        assert!(matches!(detect_kind(b""), Err(Error::UnsupportedFormat(_))));
        assert!(matches!(
            detect_kind(b"<!DOCTYPE html><html></html>"),
            Err(Error::UnsupportedFormat(_))
        ));
        let other_zip = zip_with(&[("mimetype", "application/epub+zip")]);
        assert!(matches!(detect_kind(&other_zip), Err(Error::UnsupportedFormat(_))));
        assert!(!is_supported_bytes(&other_zip));
    }

    #[test]
    fn test_detect_from_path_extension() {
        assert_eq!(
            detect_kind_from_path("informe.DOCX").unwrap(),
            DocumentKind::Flow
        );
    }
}
