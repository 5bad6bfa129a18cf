//! Spreadsheet (XLSX) reader: one section holding one grid table per sheet.

use super::package::{attr, child, children, normalize_color, Package, REL_NS};
use super::{DocumentReader, NormalizeOptions};
use crate::error::{Error, Result};
use crate::model::{
    Alignment, Anchor, Block, BorderLine, Borders, Cell, CellRef, DamagedRegion, DocumentKind,
    DocumentTree, IdAllocator, Image, Node, PositionHint, Row, Run, RunStyle, Section, Table,
};
use crate::text::strip_tags;
use std::collections::BTreeMap;

/// Reader for `.xlsx` / `.xlsm` workbooks.
#[derive(Debug, Default)]
pub struct XlsxReader;

impl XlsxReader {
    /// Create a new reader.
    pub fn new() -> Self {
        Self
    }
}

impl DocumentReader for XlsxReader {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Grid
    }

    fn supported_extensions(&self) -> &[&str] {
        &["xlsx", "xlsm"]
    }

    fn name(&self) -> &str {
        "xlsx"
    }

    fn read(&self, bytes: &[u8], options: &NormalizeOptions) -> Result<DocumentTree> {
        let mut package = Package::open(bytes)?;
        let workbook_part = package.main_part("xl/workbook.xml");
        let xml = package
            .read_string(&workbook_part)?
            .ok_or_else(|| Error::CorruptDocument(format!("missing workbook {}", workbook_part)))?;
        let sheets = parse_sheet_list(&xml, &package.relationships(&workbook_part))?;

        let workbook = Workbook::load(&mut package, &workbook_part, options)?;

        let mut tree = DocumentTree::new(DocumentKind::Grid);
        tree.metadata = package.core_properties();
        tree.metadata.sheets = sheets.iter().map(|s| s.name.clone()).collect();

        let mut ids = IdAllocator::new();
        for (index, sheet) in sheets.iter().enumerate() {
            let mut section = Section::new(Some(sheet.name.clone()));

            let xml = match package.read_string(&sheet.part) {
                Ok(Some(xml)) => xml,
                Ok(None) => {
                    let error = Error::CorruptDocument(format!("missing sheet part {}", sheet.part));
                    record_damage(&mut tree, options, &sheet.name, error, String::new())?;
                    tree.add_section(section);
                    continue;
                }
                Err(error) => {
                    record_damage(&mut tree, options, &sheet.name, error, String::new())?;
                    tree.add_section(section);
                    continue;
                }
            };

            match read_sheet(&xml, &workbook, &mut ids) {
                Ok(parsed) => {
                    if let Some(rel_id) = parsed.drawing_rel.as_deref() {
                        load_sheet_images(
                            &mut package,
                            &sheet.part,
                            rel_id,
                            &parsed.table,
                            index,
                            options,
                            &mut tree.images,
                        );
                    }
                    section.nodes.push(Node::Table(parsed.table));
                }
                Err(error) => {
                    record_damage(&mut tree, options, &sheet.name, error, strip_tags(&xml))?;
                }
            }
            tree.add_section(section);
        }

        log::debug!(
            "XLSX normalized: {} sheets, {} damaged, {} images",
            tree.sections.len(),
            tree.damaged.len(),
            tree.images.len()
        );
        Ok(tree)
    }
}

/// Keep going past a damaged sheet in lenient mode; fail in strict mode.
fn record_damage(
    tree: &mut DocumentTree,
    options: &NormalizeOptions,
    sheet: &str,
    error: Error,
    raw_text: String,
) -> Result<()> {
    if !options.is_lenient() {
        return Err(error);
    }
    log::warn!("Sheet '{}' is damaged, kept as raw text: {}", sheet, error);
    tree.damaged.push(DamagedRegion {
        name: sheet.to_string(),
        reason: error.to_string(),
        raw_text,
    });
    Ok(())
}

struct SheetEntry {
    name: String,
    part: String,
}

fn parse_sheet_list(xml: &str, rels: &super::package::Relationships) -> Result<Vec<SheetEntry>> {
    let doc = roxmltree::Document::parse(xml)?;
    let Some(sheets) = child(doc.root_element(), "sheets") else {
        return Err(Error::CorruptDocument("workbook lists no sheets".to_string()));
    };
    Ok(children(sheets, "sheet")
        .enumerate()
        .map(|(i, sheet)| {
            let name = attr(sheet, "name")
                .map(str::to_string)
                .unwrap_or_else(|| format!("Sheet{}", i + 1));
            let part = sheet
                .attribute((REL_NS, "id"))
                .and_then(|id| rels.target(id))
                .map(str::to_string)
                .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", i + 1));
            SheetEntry { name, part }
        })
        .collect())
}

/// One run of a shared string; `None` style means "use the cell's font".
struct SharedRun {
    text: String,
    style: Option<RunStyle>,
}

#[derive(Debug, Clone, Default)]
struct CellFormat {
    font: RunStyle,
    fill: Option<String>,
    borders: Option<Borders>,
    alignment: Option<Alignment>,
}

/// Workbook-wide tables every sheet refers to.
struct Workbook {
    shared: Vec<Vec<SharedRun>>,
    formats: Vec<CellFormat>,
    default_font: RunStyle,
}

impl Workbook {
    fn load(package: &mut Package, workbook_part: &str, options: &NormalizeOptions) -> Result<Self> {
        let rels = package.relationships(workbook_part);
        let styles_part = rels
            .target_of_type("/styles")
            .unwrap_or("xl/styles.xml")
            .to_string();
        let shared_part = rels
            .target_of_type("/sharedStrings")
            .unwrap_or("xl/sharedStrings.xml")
            .to_string();

        let (formats, default_font) = match package.read_string(&styles_part)? {
            Some(xml) => parse_formats(&xml),
            None => (Vec::new(), RunStyle::default()),
        };

        let shared = match package.read_string(&shared_part)? {
            Some(xml) => match parse_shared_strings(&xml, &default_font) {
                Ok(shared) => shared,
                Err(e) if options.is_lenient() => {
                    log::warn!("Shared strings are damaged, text cells will be empty: {}", e);
                    Vec::new()
                }
                Err(e) => return Err(e),
            },
            None => Vec::new(),
        };

        Ok(Self {
            shared,
            formats,
            default_font,
        })
    }

    fn format(&self, index: Option<usize>) -> Option<&CellFormat> {
        index.and_then(|i| self.formats.get(i))
    }

    /// Displayed runs of a `<c>` element.
    fn cell_runs(&self, c: roxmltree::Node, format: Option<&CellFormat>) -> Vec<Run> {
        let font = format.map(|f| f.font.clone()).unwrap_or_default();
        let value = child(c, "v").and_then(|v| v.text()).unwrap_or("");

        match attr(c, "t") {
            Some("s") => value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| self.shared.get(i))
                .map(|entry| {
                    entry
                        .iter()
                        .map(|r| Run::new(r.text.clone(), r.style.clone().unwrap_or_else(|| font.clone())))
                        .collect()
                })
                .unwrap_or_default(),
            Some("inlineStr") => child(c, "is")
                .map(|is| rich_text(is, &self.default_font))
                .unwrap_or_default()
                .into_iter()
                .map(|r| Run::new(r.text, r.style.unwrap_or_else(|| font.clone())))
                .collect(),
            Some("b") if !value.is_empty() => {
                let shown = if value == "1" { "TRUE" } else { "FALSE" };
                vec![Run::new(shown, font)]
            }
            _ if !value.is_empty() => vec![Run::new(value, font)],
            _ => Vec::new(),
        }
    }
}

/// Parse `styles.xml` into the `cellXfs` formats. Properties equal to the
/// workbook default font are dropped so plain cells render plain.
fn parse_formats(xml: &str) -> (Vec<CellFormat>, RunStyle) {
    let Ok(doc) = roxmltree::Document::parse(xml) else {
        log::warn!("Malformed styles part, cell formatting ignored");
        return (Vec::new(), RunStyle::default());
    };
    let root = doc.root_element();

    let raw_fonts: Vec<RunStyle> = child(root, "fonts")
        .map(|f| children(f, "font").map(font_style).collect())
        .unwrap_or_default();
    let default_font = raw_fonts.first().cloned().unwrap_or_default();
    let fonts: Vec<RunStyle> = raw_fonts
        .iter()
        .map(|f| relative_to(f.clone(), &default_font))
        .collect();

    let fills: Vec<Option<String>> = child(root, "fills")
        .map(|f| {
            children(f, "fill")
                .map(|fill| {
                    child(fill, "patternFill")
                        .filter(|p| attr(*p, "patternType").is_some_and(|t| t != "none"))
                        .and_then(|p| child(p, "fgColor"))
                        .and_then(|c| attr(c, "rgb"))
                        .and_then(normalize_color)
                })
                .collect()
        })
        .unwrap_or_default();

    let borders: Vec<Option<Borders>> = child(root, "borders")
        .map(|b| children(b, "border").map(parse_border).collect())
        .unwrap_or_default();

    let index = |node: roxmltree::Node, name: &str| {
        attr(node, name).and_then(|v| v.parse::<usize>().ok())
    };
    let formats = child(root, "cellXfs")
        .map(|xfs| {
            children(xfs, "xf")
                .map(|xf| CellFormat {
                    font: index(xf, "fontId")
                        .and_then(|i| fonts.get(i))
                        .cloned()
                        .unwrap_or_default(),
                    fill: index(xf, "fillId").and_then(|i| fills.get(i)).cloned().flatten(),
                    borders: index(xf, "borderId")
                        .and_then(|i| borders.get(i))
                        .cloned()
                        .flatten(),
                    alignment: child(xf, "alignment")
                        .and_then(|a| attr(a, "horizontal"))
                        .and_then(Alignment::from_ooxml),
                })
                .collect()
        })
        .unwrap_or_default();

    (formats, default_font)
}

/// Font properties of a `<font>` or `<rPr>` element.
fn font_style(font: roxmltree::Node) -> RunStyle {
    let val = |name: &str| child(font, name).and_then(|n| attr(n, "val"));
    let flag = |name: &str| {
        child(font, name).is_some_and(|n| !matches!(attr(n, "val"), Some("0" | "false")))
    };
    let vert = val("vertAlign");
    RunStyle {
        bold: flag("b"),
        italic: flag("i"),
        underline: child(font, "u").is_some_and(|u| attr(u, "val") != Some("none")),
        strike: flag("strike"),
        superscript: vert == Some("superscript"),
        subscript: vert == Some("subscript"),
        color: child(font, "color")
            .and_then(|c| attr(c, "rgb"))
            .and_then(normalize_color),
        font: val("name").or_else(|| val("rFont")).map(str::to_string),
        size: val("sz").and_then(|v| v.parse::<f32>().ok()),
        highlight: None,
    }
}

fn relative_to(mut style: RunStyle, default: &RunStyle) -> RunStyle {
    if style.font == default.font {
        style.font = None;
    }
    if style.size == default.size {
        style.size = None;
    }
    if style.color == default.color {
        style.color = None;
    }
    style
}

fn parse_border(border: roxmltree::Node) -> Option<Borders> {
    let line = |name: &str| {
        child(border, name).and_then(|side| {
            let style = attr(side, "style")?;
            Some(BorderLine {
                style: style.to_string(),
                color: child(side, "color")
                    .and_then(|c| attr(c, "rgb"))
                    .and_then(normalize_color),
            })
        })
    };
    let borders = Borders {
        top: line("top"),
        bottom: line("bottom"),
        left: line("left").or_else(|| line("start")),
        right: line("right").or_else(|| line("end")),
    };
    (!borders.is_empty()).then_some(borders)
}

fn parse_shared_strings(xml: &str, default_font: &RunStyle) -> Result<Vec<Vec<SharedRun>>> {
    let doc = roxmltree::Document::parse(xml)?;
    Ok(children(doc.root_element(), "si")
        .map(|si| rich_text(si, default_font))
        .collect())
}

/// Runs of a string item (`<si>` or `<is>`): either a single `<t>` or rich
/// `<r>` runs. Phonetic runs are skipped.
fn rich_text(item: roxmltree::Node, default_font: &RunStyle) -> Vec<SharedRun> {
    let mut runs = Vec::new();
    for element in item.children().filter(|n| n.is_element()) {
        match element.tag_name().name() {
            "t" => runs.push(SharedRun {
                text: element.text().unwrap_or("").to_string(),
                style: None,
            }),
            "r" => {
                let text: String = children(element, "t")
                    .filter_map(|t| t.text())
                    .collect();
                let style = child(element, "rPr").map(|rpr| relative_to(font_style(rpr), default_font));
                runs.push(SharedRun { text, style });
            }
            _ => {}
        }
    }
    runs
}

struct RawCell {
    runs: Vec<Run>,
    format: Option<usize>,
    formula: Option<String>,
    cached_value: Option<String>,
}

struct ParsedSheet {
    table: Table,
    drawing_rel: Option<String>,
}

/// A merged range, 0-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MergeRange {
    first_row: u32,
    first_col: u32,
    last_row: u32,
    last_col: u32,
}

impl MergeRange {
    fn parse(reference: &str) -> Option<Self> {
        let (start, end) = reference.split_once(':')?;
        let (r1, c1) = parse_cell_ref(start)?;
        let (r2, c2) = parse_cell_ref(end)?;
        Some(Self {
            first_row: r1.min(r2),
            first_col: c1.min(c2),
            last_row: r1.max(r2),
            last_col: c1.max(c2),
        })
    }

    fn is_anchor(&self, row: u32, col: u32) -> bool {
        row == self.first_row && col == self.first_col
    }

    fn covers(&self, row: u32, col: u32) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }
}

fn read_sheet(xml: &str, workbook: &Workbook, ids: &mut IdAllocator) -> Result<ParsedSheet> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    let mut values: BTreeMap<(u32, u32), RawCell> = BTreeMap::new();
    if let Some(data) = child(root, "sheetData") {
        let mut next_row = 0;
        for row in children(data, "row") {
            let r = attr(row, "r")
                .and_then(|v| v.parse::<u32>().ok())
                .map(|v| v.saturating_sub(1))
                .unwrap_or(next_row);
            next_row = r + 1;

            let mut next_col = 0;
            for c in children(row, "c") {
                let (ri, ci) = attr(c, "r").and_then(parse_cell_ref).unwrap_or((r, next_col));
                next_col = ci + 1;

                let format_index = attr(c, "s").and_then(|s| s.parse::<usize>().ok());
                let runs = workbook.cell_runs(c, workbook.format(format_index));
                let formula = child(c, "f").and_then(|f| f.text()).map(str::to_string);
                let cached_value = formula
                    .as_ref()
                    .and(child(c, "v").and_then(|v| v.text()))
                    .map(str::to_string);
                values.insert(
                    (ri, ci),
                    RawCell {
                        runs,
                        format: format_index,
                        formula,
                        cached_value,
                    },
                );
            }
        }
    }

    let merges: Vec<MergeRange> = child(root, "mergeCells")
        .map(|m| {
            children(m, "mergeCell")
                .filter_map(|mc| attr(mc, "ref").and_then(MergeRange::parse))
                .collect()
        })
        .unwrap_or_default();
    for merge in &merges {
        values
            .entry((merge.first_row, merge.first_col))
            .or_insert_with(|| RawCell {
                runs: Vec::new(),
                format: None,
                formula: None,
                cached_value: None,
            });
    }

    let mut table = Table::new(ids.next_id());
    let mut rows: BTreeMap<u32, Vec<Cell>> = BTreeMap::new();
    for ((r, c), raw) in values {
        let merge = merges.iter().find(|m| m.covers(r, c));
        if merge.is_some_and(|m| !m.is_anchor(r, c)) {
            continue;
        }
        let format = workbook.format(raw.format);
        if raw.runs.is_empty() && merge.is_none() && format.map_or(true, |f| f.fill.is_none()) {
            continue;
        }

        let mut cell = Cell::new(r, c);
        if let Some(m) = merge {
            cell = cell.with_span(m.last_row - m.first_row + 1, m.last_col - m.first_col + 1);
        }
        if !raw.runs.is_empty() {
            let mut block = Block::paragraph(ids.next_id(), raw.runs);
            if let Some(alignment) = format.and_then(|f| f.alignment) {
                block = block.with_alignment(alignment);
            }
            cell.blocks.push(block);
        }
        if let Some(format) = format {
            cell.fill_color = format.fill.clone();
            cell.borders = format.borders.clone();
        }
        cell.formula = raw.formula;
        cell.cached_value = raw.cached_value;
        rows.entry(r).or_default().push(cell);
    }
    for (index, cells) in rows {
        table.add_row(Row::new(index, cells));
    }

    let drawing_rel = child(root, "drawing")
        .and_then(|d| d.attribute((REL_NS, "id")))
        .map(str::to_string);

    Ok(ParsedSheet { table, drawing_rel })
}

/// Images of a sheet drawing, bound to the cell under their top-left
/// corner (the merge anchor when that cell is covered).
fn load_sheet_images(
    package: &mut Package,
    sheet_part: &str,
    drawing_rel: &str,
    table: &Table,
    section: usize,
    options: &NormalizeOptions,
    images: &mut Vec<Image>,
) {
    let Some(drawing_part) = package
        .relationships(sheet_part)
        .target(drawing_rel)
        .map(str::to_string)
    else {
        log::warn!("Drawing relationship {} of {} does not resolve", drawing_rel, sheet_part);
        return;
    };
    let xml = match package.read_string(&drawing_part) {
        Ok(Some(xml)) => xml,
        _ => {
            log::warn!("Drawing part {} is missing, its images are skipped", drawing_part);
            return;
        }
    };
    let Ok(doc) = roxmltree::Document::parse(&xml) else {
        log::warn!("Malformed drawing part {}, its images are skipped", drawing_part);
        return;
    };
    let rels = package.relationships(&drawing_part);

    for anchor in doc.root_element().children().filter(|n| {
        matches!(
            n.tag_name().name(),
            "twoCellAnchor" | "oneCellAnchor" | "absoluteAnchor"
        )
    }) {
        let from = child(anchor, "from");
        let coordinate = |name: &str| {
            from.and_then(|f| child(f, name))
                .and_then(|n| n.text())
                .and_then(|t| t.trim().parse::<u32>().ok())
                .unwrap_or(0)
        };
        let (row, col) = (coordinate("row"), coordinate("col"));
        let (anchor_row, anchor_col) = table
            .cell_covering(row, col)
            .map(|c| (c.row, c.col))
            .unwrap_or((row, col));

        for blip in anchor
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "blip")
        {
            let Some(rel_id) = blip.attribute((REL_NS, "embed")) else {
                continue;
            };
            let Some(target) = rels.target(rel_id).map(str::to_string) else {
                log::warn!("Image relationship {} does not resolve, skipped", rel_id);
                continue;
            };
            let Some(data) = package.image_payload(&target, options.image_data) else {
                continue;
            };

            let ordinal = images.len() as u32;
            images.push(Image::new(
                format!("img{}", ordinal + 1),
                data,
                Some(target),
                Anchor::Cell(CellRef {
                    table: table.id,
                    row: anchor_row,
                    col: anchor_col,
                }),
                PositionHint {
                    ordinal,
                    section,
                    row: Some(row),
                    col: Some(col),
                },
            ));
        }
    }
}

/// `B3` -> (2, 1), 0-based (row, col). Absolute markers are ignored.
fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim().replace('$', "");
    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .filter(|&i| i > 0)?;
    let (letters, digits) = reference.split_at(split);
    if !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}
