//! OOXML package access: zip parts, relationships, core properties and the
//! small XML helpers both readers share.

use crate::error::{Error, Result};
use crate::model::Metadata;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::{Cursor, Read};

pub(crate) const REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// An opened OOXML container.
pub(crate) struct Package<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Package<'a> {
    /// Open a container. Bytes that are not a zip archive are rejected as
    /// an unsupported format; a zip that cannot be read is corrupt.
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        if !bytes.starts_with(b"PK") {
            return Err(Error::UnsupportedFormat(
                "not an OOXML package (missing zip signature)".to_string(),
            ));
        }
        let archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self { archive })
    }

    /// Whether a part exists.
    pub fn has(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// Names of every part.
    pub fn part_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Read a part as UTF-8, `None` if absent.
    pub fn read_string(&mut self, name: &str) -> Result<Option<String>> {
        let Ok(mut file) = self.archive.by_name(name) else {
            return Ok(None);
        };
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(Some(content))
    }

    /// Read a part as bytes, `None` if absent.
    pub fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let Ok(mut file) = self.archive.by_name(name) else {
            return Ok(None);
        };
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(Some(content))
    }

    /// Payload of an image part. Without `load_data` only the part's
    /// existence is checked and the payload is left empty. Missing or
    /// unreadable parts are logged and give `None`.
    pub fn image_payload(&mut self, target: &str, load_data: bool) -> Option<Vec<u8>> {
        if !load_data {
            if self.has(target) {
                return Some(Vec::new());
            }
            log::warn!("Image part {} is missing, skipped", target);
            return None;
        }
        match self.read_bytes(target) {
            Ok(Some(data)) => Some(data),
            Ok(None) => {
                log::warn!("Image part {} is missing, skipped", target);
                None
            }
            Err(e) => {
                log::warn!("Cannot read image part {}: {}", target, e);
                None
            }
        }
    }

    /// Relationships of a part, keyed by id, with targets resolved to part
    /// names. Missing or unreadable relationship parts yield an empty map.
    pub fn relationships(&mut self, part: &str) -> Relationships {
        let rels_name = rels_path(part);
        let xml = match self.read_string(&rels_name) {
            Ok(Some(xml)) => xml,
            Ok(None) => return Relationships::default(),
            Err(e) => {
                log::warn!("Cannot read {}: {}", rels_name, e);
                return Relationships::default();
            }
        };
        let Ok(doc) = roxmltree::Document::parse(&xml) else {
            log::warn!("Malformed relationships part {}", rels_name);
            return Relationships::default();
        };

        let mut targets = HashMap::new();
        let mut types = Vec::new();
        for rel in doc
            .root_element()
            .children()
            .filter(|n| n.has_tag_name((PKG_REL_NS, "Relationship")))
        {
            let (Some(id), Some(target)) = (rel.attribute("Id"), rel.attribute("Target")) else {
                continue;
            };
            if rel.attribute("TargetMode") == Some("External") {
                continue;
            }
            let resolved = resolve_target(part, target);
            if let Some(kind) = rel.attribute("Type") {
                types.push((kind.to_string(), resolved.clone()));
            }
            targets.insert(id.to_string(), resolved);
        }
        Relationships { targets, types }
    }

    /// Main document part named by the package relationships, or
    /// `fallback` when the package does not say.
    pub fn main_part(&mut self, fallback: &str) -> String {
        self.relationships("")
            .target_of_type("/officeDocument")
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Core properties (`docProps/core.xml`). Absent or malformed parts give
    /// empty metadata.
    pub fn core_properties(&mut self) -> Metadata {
        match self.read_string("docProps/core.xml") {
            Ok(Some(xml)) => parse_core_properties(&xml),
            _ => Metadata::default(),
        }
    }
}

/// Relationship targets of one part.
#[derive(Debug, Default)]
pub(crate) struct Relationships {
    targets: HashMap<String, String>,
    types: Vec<(String, String)>,
}

impl Relationships {
    /// Part name targeted by a relationship id.
    pub fn target(&self, id: &str) -> Option<&str> {
        self.targets.get(id).map(String::as_str)
    }

    /// First target whose relationship type ends with `type_suffix`
    /// (e.g. `/officeDocument`).
    pub fn target_of_type(&self, type_suffix: &str) -> Option<&str> {
        self.types
            .iter()
            .find(|(kind, _)| kind.ends_with(type_suffix))
            .map(|(_, target)| target.as_str())
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the directory of its source part.
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// First child element with the given local name, in any namespace.
pub(crate) fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Child elements with the given local name.
pub(crate) fn children<'a, 'input: 'a>(
    node: roxmltree::Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// Attribute by local name, ignoring its namespace.
pub(crate) fn attr<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == name)
        .map(|a| a.value())
}

/// Concatenated text of every descendant text node.
pub(crate) fn descendant_text(node: roxmltree::Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Normalize an OOXML color (`RRGGBB` or `AARRGGBB`) to `#RRGGBB`.
pub(crate) fn normalize_color(value: &str) -> Option<String> {
    if !value.is_ascii() {
        return None;
    }
    let hex = match value.len() {
        6 => value,
        8 => &value[2..],
        _ => return None,
    };
    if value.eq_ignore_ascii_case("auto") || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("#{}", hex.to_ascii_uppercase()))
}

fn parse_core_properties(xml: &str) -> Metadata {
    let Ok(doc) = roxmltree::Document::parse(xml) else {
        log::warn!("Malformed docProps/core.xml, metadata skipped");
        return Metadata::default();
    };
    let root = doc.root_element();
    let text = |name: &str| {
        child(root, name)
            .map(descendant_text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    };
    let date = |name: &str| {
        text(name).and_then(|t| {
            DateTime::parse_from_rfc3339(&t)
                .map(|d| d.with_timezone(&Utc))
                .ok()
        })
    };

    Metadata {
        title: text("title"),
        author: text("creator"),
        subject: text("subject"),
        description: text("description"),
        keywords: text("keywords"),
        category: text("category"),
        last_modified_by: text("lastModifiedBy"),
        revision: text("revision").and_then(|r| r.parse().ok()),
        created: date("created"),
        modified: date("modified"),
        sheets: Vec::new(),
    }
}
