//! Embedded images and their anchors.

use super::NodeId;
use serde::{Deserialize, Serialize};

/// Position of a cell inside a specific table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    /// Table holding the cell (may be a nested table)
    pub table: NodeId,
    /// Anchor row of the cell
    pub row: u32,
    /// Anchor column of the cell
    pub col: u32,
}

/// What an image is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anchor {
    /// A top-level block
    Block {
        /// Block id
        block: NodeId,
    },
    /// A table cell
    Cell(CellRef),
}

/// Where the image sat in the source, kept for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionHint {
    /// Order of appearance in the document (0-based)
    pub ordinal: u32,
    /// Section (sheet) index
    pub section: usize,
    /// Source grid row, when the container records one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    /// Source grid column, when the container records one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
}

/// An image owned by a document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Image id, unique within the document
    pub id: String,

    /// Raw binary payload
    #[serde(skip_serializing, default)]
    pub data: Vec<u8>,

    /// MIME type (e.g. "image/png")
    pub mime_type: String,

    /// File name inside the package
    pub filename: Option<String>,

    /// Block or cell the image is bound to
    pub anchor: Anchor,

    /// Source position
    pub position: PositionHint,
}

impl Image {
    /// Create an image; the MIME type is sniffed from the payload, then
    /// from the file name.
    pub fn new(
        id: impl Into<String>,
        data: Vec<u8>,
        filename: Option<String>,
        anchor: Anchor,
        position: PositionHint,
    ) -> Self {
        let mime_type = detect_mime_type(&data)
            .or_else(|| filename.as_deref().and_then(mime_from_filename))
            .unwrap_or("application/octet-stream")
            .to_string();
        Self {
            id: id.into(),
            data,
            mime_type,
            filename,
            anchor,
            position,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// File name to use when writing the payload out.
    pub fn suggested_filename(&self) -> String {
        if let Some(name) = self.filename.as_deref().and_then(|f| f.rsplit('/').next()) {
            return format!("{}_{}", self.id, name);
        }
        format!("{}.{}", self.id, extension_for(&self.mime_type))
    }
}

/// Payload-free view of an image, as carried in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Image id
    pub id: String,
    /// MIME type
    pub mime_type: String,
    /// File name inside the package
    pub filename: Option<String>,
    /// Payload size in bytes
    pub size: usize,
    /// Block or cell the image is bound to
    pub anchor: Anchor,
    /// Source position
    pub position: PositionHint,
}

impl From<&Image> for ImageRef {
    fn from(image: &Image) -> Self {
        Self {
            id: image.id.clone(),
            mime_type: image.mime_type.clone(),
            filename: image.filename.clone(),
            size: image.size(),
            anchor: image.anchor,
            position: image.position,
        }
    }
}

/// Detect an image MIME type from magic bytes.
pub fn detect_mime_type(data: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
        (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], "image/png"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (&[0x49, 0x49, 0x2A, 0x00], "image/tiff"),
        (&[0x4D, 0x4D, 0x00, 0x2A], "image/tiff"),
        (&[0x01, 0x00, 0x00, 0x00], "image/x-emf"),
        (&[0xD7, 0xCD, 0xC6, 0x9A], "image/x-wmf"),
        (b"BM", "image/bmp"),
    ];

    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, mime)| *mime)
}

fn mime_from_filename(name: &str) -> Option<&'static str> {
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "tif" | "tiff" => Some("image/tiff"),
        "bmp" => Some("image/bmp"),
        "emf" => Some("image/x-emf"),
        "wmf" => Some("image/x-wmf"),
        "svg" => Some("image/svg+xml"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/tiff" => "tiff",
        "image/bmp" => "bmp",
        "image/x-emf" => "emf",
        "image/x-wmf" => "wmf",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> Anchor {
        Anchor::Block { block: NodeId(3) }
    }

    #[test]
    fn test_detect_mime_type() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(detect_mime_type(&png), Some("image/png"));
        assert_eq!(detect_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(detect_mime_type(b"hello"), None);
    }

    #[test]
    fn test_mime_falls_back_to_filename() {
        let image = Image::new(
            "img1",
            b"not really".to_vec(),
            Some("word/media/image1.emf".into()),
            anchor(),
            PositionHint::default(),
        );
        assert_eq!(image.mime_type, "image/x-emf");
        assert_eq!(image.suggested_filename(), "img1_image1.emf");
    }

    #[test]
    fn test_image_ref_drops_payload() {
        let image = Image::new("img2", vec![0xFF, 0xD8, 0xFF, 0x00], None, anchor(), PositionHint::default());
        let view = ImageRef::from(&image);
        assert_eq!(view.size, 4);
        assert_eq!(view.mime_type, "image/jpeg");
        assert_eq!(image.suggested_filename(), "img2.jpg");

        let json = serde_json::to_string(&image).unwrap();
        assert!(!json.contains("\"data\""));
    }
}
