//! Word-processor (DOCX) reader.

use super::package::{attr, child, children, normalize_color, Package, REL_NS};
use super::{DocumentReader, NormalizeOptions};
use crate::error::{Error, Result};
use crate::model::{
    Alignment, Anchor, Block, BorderLine, Borders, Cell, CellRef, DocumentKind, DocumentTree,
    IdAllocator, Image, Node, PositionHint, Row, Run, RunStyle, Section, Table,
};
use crate::text::fold;
use std::collections::HashMap;

/// Reader for `.docx` / `.docm` packages.
#[derive(Debug, Default)]
pub struct DocxReader;

impl DocxReader {
    /// Create a new reader.
    pub fn new() -> Self {
        Self
    }
}

impl DocumentReader for DocxReader {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Flow
    }

    fn supported_extensions(&self) -> &[&str] {
        &["docx", "docm"]
    }

    fn name(&self) -> &str {
        "docx"
    }

    fn read(&self, bytes: &[u8], options: &NormalizeOptions) -> Result<DocumentTree> {
        let mut package = Package::open(bytes)?;
        let main = package.main_part("word/document.xml");
        let xml = package
            .read_string(&main)?
            .ok_or_else(|| Error::CorruptDocument(format!("missing main part {}", main)))?;
        let doc = roxmltree::Document::parse(&xml)?;
        let body = child(doc.root_element(), "body")
            .ok_or_else(|| Error::CorruptDocument("document has no body".to_string()))?;

        let style_names = match package.read_string("word/styles.xml") {
            Ok(Some(styles)) => parse_style_names(&styles),
            _ => HashMap::new(),
        };

        let mut walker = BodyWalker {
            style_names,
            ids: IdAllocator::new(),
            pending: Vec::new(),
        };
        let mut section = Section::new(None);
        walker.body(body, &mut section.nodes);

        let mut tree = DocumentTree::new(DocumentKind::Flow);
        tree.metadata = package.core_properties();
        tree.add_section(section);

        let rels = package.relationships(&main);
        for pending in walker.pending {
            let Some(target) = rels.target(&pending.rel_id).map(str::to_string) else {
                log::warn!("Image relationship {} does not resolve, skipped", pending.rel_id);
                continue;
            };
            let Some(data) = package.image_payload(&target, options.image_data) else {
                continue;
            };

            let ordinal = tree.images.len() as u32;
            let position = PositionHint {
                ordinal,
                section: 0,
                row: pending.row,
                col: pending.col,
            };
            tree.images.push(Image::new(
                format!("img{}", ordinal + 1),
                data,
                Some(target),
                pending.anchor,
                position,
            ));
        }

        log::debug!(
            "DOCX normalized: {} nodes, {} images",
            tree.sections[0].nodes.len(),
            tree.images.len()
        );
        Ok(tree)
    }
}

/// An image reference found while walking, resolved once the walk is done.
struct PendingImage {
    rel_id: String,
    anchor: Anchor,
    row: Option<u32>,
    col: Option<u32>,
}

struct BodyWalker {
    style_names: HashMap<String, String>,
    ids: IdAllocator,
    pending: Vec<PendingImage>,
}

impl BodyWalker {
    fn body(&mut self, container: roxmltree::Node, nodes: &mut Vec<Node>) {
        for element in container.children().filter(|n| n.is_element()) {
            match element.tag_name().name() {
                "p" => {
                    let block = self.paragraph(element, None);
                    nodes.push(Node::Block(block));
                }
                "tbl" => {
                    let table = self.table(element);
                    nodes.push(Node::Table(table));
                }
                "sdt" => {
                    if let Some(content) = child(element, "sdtContent") {
                        self.body(content, nodes);
                    }
                }
                _ => {}
            }
        }
    }

    /// Parse a paragraph. Images inside it bind to `cell` when given, to
    /// the paragraph itself otherwise.
    fn paragraph(&mut self, p: roxmltree::Node, cell: Option<CellRef>) -> Block {
        let id = self.ids.next_id();
        let ppr = child(p, "pPr");

        let mut runs = Vec::new();
        let mut rel_ids = Vec::new();
        collect_inline(p, &mut runs, &mut rel_ids);

        let anchor = match cell {
            Some(cell) => Anchor::Cell(cell),
            None => Anchor::Block { block: id },
        };
        for rel_id in rel_ids {
            self.pending.push(PendingImage {
                rel_id,
                anchor,
                row: cell.map(|c| c.row),
                col: cell.map(|c| c.col),
            });
        }

        let level = ppr.and_then(|ppr| self.heading_level(ppr));
        let mut block = match level {
            Some(level) => Block::heading(id, level, runs),
            None => Block::paragraph(id, runs),
        };
        if let Some(alignment) = ppr
            .and_then(|ppr| child(ppr, "jc"))
            .and_then(|jc| attr(jc, "val"))
            .and_then(Alignment::from_ooxml)
        {
            block = block.with_alignment(alignment);
        }
        block
    }

    fn heading_level(&self, ppr: roxmltree::Node) -> Option<u8> {
        if let Some(style_id) = child(ppr, "pStyle").and_then(|s| attr(s, "val")) {
            let name = self
                .style_names
                .get(style_id)
                .map(String::as_str)
                .unwrap_or(style_id);
            if let Some(level) = heading_level(name) {
                return Some(level);
            }
        }
        child(ppr, "outlineLvl")
            .and_then(|o| attr(o, "val"))
            .and_then(|v| v.parse::<u8>().ok())
            .filter(|v| *v < 9)
            .map(|v| v + 1)
    }

    fn table(&mut self, tbl: roxmltree::Node) -> Table {
        let id = self.ids.next_id();
        let mut table = Table::new(id);
        // column -> (row position, cell position) of the open vertical merge
        let mut open_merges: HashMap<u32, (usize, usize)> = HashMap::new();

        for (row_index, tr) in children(tbl, "tr").enumerate() {
            let row_index = row_index as u32;
            let mut col = child(tr, "trPr")
                .and_then(|pr| child(pr, "gridBefore"))
                .and_then(|g| attr(g, "val"))
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0);
            let mut cells: Vec<Cell> = Vec::new();

            for tc in children(tr, "tc") {
                let tcpr = child(tc, "tcPr");
                let span = tcpr
                    .and_then(|pr| child(pr, "gridSpan"))
                    .and_then(|g| attr(g, "val"))
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(1)
                    .max(1);
                let merge = tcpr
                    .and_then(|pr| child(pr, "vMerge"))
                    .map(|m| attr(m, "val").unwrap_or("continue"));

                match merge {
                    Some("continue") => {
                        if let Some(&(r, c)) = open_merges.get(&col) {
                            table.rows[r].cells[c].row_span += 1;
                            col += span;
                            continue;
                        }
                    }
                    Some(_) => {}
                    None => {
                        open_merges.remove(&col);
                    }
                }

                let cell_ref = CellRef {
                    table: id,
                    row: row_index,
                    col,
                };
                let mut cell = Cell::new(row_index, col).with_span(1, span);
                self.cell_content(tc, cell_ref, &mut cell);
                if let Some(pr) = tcpr {
                    cell.fill_color = child(pr, "shd")
                        .and_then(|s| attr(s, "fill"))
                        .and_then(normalize_color);
                    cell.borders = child(pr, "tcBorders").and_then(parse_borders);
                }

                if merge.is_some() {
                    open_merges.insert(col, (table.rows.len(), cells.len()));
                }
                cells.push(cell);
                col += span;
            }
            table.add_row(Row::new(row_index, cells));
        }
        table
    }

    fn cell_content(&mut self, container: roxmltree::Node, cell_ref: CellRef, cell: &mut Cell) {
        for element in container.children().filter(|n| n.is_element()) {
            match element.tag_name().name() {
                "p" => {
                    let block = self.paragraph(element, Some(cell_ref));
                    cell.blocks.push(block);
                }
                "tbl" => {
                    let nested = self.table(element);
                    cell.nested_tables.push(nested);
                }
                "sdt" => {
                    if let Some(content) = child(element, "sdtContent") {
                        self.cell_content(content, cell_ref, cell);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Walk inline content, descending into hyperlinks, insertions, fields and
/// content controls. Deleted text is skipped.
fn collect_inline(node: roxmltree::Node, runs: &mut Vec<Run>, rel_ids: &mut Vec<String>) {
    for element in node.children().filter(|n| n.is_element()) {
        match element.tag_name().name() {
            "r" => read_run(element, runs, rel_ids),
            "hyperlink" | "ins" | "smartTag" | "fldSimple" | "customXml" | "sdtContent" => {
                collect_inline(element, runs, rel_ids)
            }
            "sdt" => {
                if let Some(content) = child(element, "sdtContent") {
                    collect_inline(content, runs, rel_ids);
                }
            }
            _ => {}
        }
    }
}

fn read_run(r: roxmltree::Node, runs: &mut Vec<Run>, rel_ids: &mut Vec<String>) {
    let style = run_style(child(r, "rPr"));
    let mut text = String::new();

    for element in r.children().filter(|n| n.is_element()) {
        match element.tag_name().name() {
            "t" => text.push_str(element.text().unwrap_or("")),
            "tab" => text.push('\t'),
            "br" | "cr" => text.push('\n'),
            "drawing" | "pict" | "object" => {
                for d in element.descendants().filter(|n| n.is_element()) {
                    let id = match d.tag_name().name() {
                        "blip" => d.attribute((REL_NS, "embed")),
                        "imagedata" => d.attribute((REL_NS, "id")),
                        _ => None,
                    };
                    if let Some(id) = id {
                        rel_ids.push(id.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    if !text.is_empty() {
        runs.push(Run::new(text, style));
    }
}

fn run_style(rpr: Option<roxmltree::Node>) -> RunStyle {
    let Some(rpr) = rpr else {
        return RunStyle::default();
    };
    let val = |name: &str| child(rpr, name).and_then(|n| attr(n, "val"));

    let vert = val("vertAlign");
    RunStyle {
        bold: toggle(child(rpr, "b")),
        italic: toggle(child(rpr, "i")),
        underline: child(rpr, "u").is_some_and(|u| attr(u, "val") != Some("none")),
        strike: toggle(child(rpr, "strike")) || toggle(child(rpr, "dstrike")),
        superscript: vert == Some("superscript"),
        subscript: vert == Some("subscript"),
        color: val("color").and_then(normalize_color),
        font: child(rpr, "rFonts")
            .and_then(|f| attr(f, "ascii").or_else(|| attr(f, "hAnsi")))
            .map(str::to_string),
        size: val("sz")
            .and_then(|v| v.parse::<f32>().ok())
            .map(|half_points| half_points / 2.0),
        highlight: val("highlight")
            .filter(|h| *h != "none")
            .map(str::to_string),
    }
}

/// On/off properties: present means on unless `val` turns them off.
fn toggle(node: Option<roxmltree::Node>) -> bool {
    match node {
        None => false,
        Some(n) => !matches!(attr(n, "val"), Some("0" | "false" | "off")),
    }
}

fn parse_borders(node: roxmltree::Node) -> Option<Borders> {
    let line = |names: &[&str]| {
        names.iter().find_map(|name| child(node, name)).and_then(|b| {
            let style = attr(b, "val")?;
            if matches!(style, "nil" | "none") {
                return None;
            }
            Some(BorderLine {
                style: style.to_string(),
                color: attr(b, "color").and_then(normalize_color),
            })
        })
    };
    let borders = Borders {
        top: line(&["top"]),
        bottom: line(&["bottom"]),
        left: line(&["left", "start"]),
        right: line(&["right", "end"]),
    };
    (!borders.is_empty()).then_some(borders)
}

/// Map style ids to display names from `word/styles.xml`.
fn parse_style_names(xml: &str) -> HashMap<String, String> {
    let Ok(doc) = roxmltree::Document::parse(xml) else {
        log::warn!("Malformed word/styles.xml, heading styles ignored");
        return HashMap::new();
    };
    children(doc.root_element(), "style")
        .filter_map(|style| {
            let id = attr(style, "styleId")?;
            let name = child(style, "name").and_then(|n| attr(n, "val"))?;
            Some((id.to_string(), name.to_string()))
        })
        .collect()
}

/// Heading level from a style name: "Heading 2", "heading2", "Título 1",
/// "Title". Other styles are body text.
fn heading_level(style_name: &str) -> Option<u8> {
    let folded: String = fold(style_name)
        .text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let rest = ["HEADING", "TITULO", "TITLE", "ENCABEZADO"]
        .iter()
        .find_map(|prefix| folded.strip_prefix(prefix))?;
    if rest.is_empty() {
        return Some(1);
    }
    if rest.chars().all(|c| c.is_ascii_digit()) {
        return rest.parse::<u8>().ok().map(|level| level.clamp(1, 9));
    }
    None
}
