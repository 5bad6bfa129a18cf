//! Style-preserving rendering of runs, cells and tables to inline HTML.
//!
//! Output is deterministic: adjacent runs with identical style are merged and
//! formatting tags always nest in the same order (`b`, `i`, `u`, `s`, `sup`,
//! `sub`, then one `span` for font size, color, highlight and family).
//! Rendering the same input twice yields byte-identical markup.

use crate::model::{Block, BlockKind, Cell, DocumentTree, Node, Run, RunStyle, Table};
use crate::model::FormattedText;
use crate::text::escape_html;

/// Render a run sequence.
pub fn render_runs(runs: &[Run]) -> FormattedText {
    let mut renderer = MarkupRenderer::new();
    renderer.runs(runs);
    renderer.finish()
}

/// Render one block.
pub fn render_block(block: &Block) -> FormattedText {
    render_blocks(std::slice::from_ref(block))
}

/// Render consecutive blocks.
pub fn render_blocks(blocks: &[Block]) -> FormattedText {
    let mut renderer = MarkupRenderer::new();
    for block in blocks {
        renderer.block(block);
    }
    renderer.finish()
}

/// Render the content of a cell: its paragraphs, then nested tables inline.
pub fn render_cell(cell: &Cell) -> FormattedText {
    let mut renderer = MarkupRenderer::new();
    renderer.cell_content(cell);
    renderer.finish()
}

/// Render a whole table.
pub fn render_table(table: &Table) -> FormattedText {
    let mut renderer = MarkupRenderer::new();
    renderer.table(table);
    renderer.finish()
}

/// Render a top-level node.
pub fn render_node(node: &Node) -> FormattedText {
    let mut renderer = MarkupRenderer::new();
    renderer.node(node);
    renderer.finish()
}

/// Render every section of a document.
pub fn render_tree(tree: &DocumentTree) -> FormattedText {
    let mut renderer = MarkupRenderer::new();
    for section in &tree.sections {
        if let Some(name) = &section.name {
            renderer.heading_line(name);
        }
        for node in &section.nodes {
            renderer.node(node);
        }
    }
    renderer.finish()
}

/// Accumulates markup and the plain-text projection side by side.
struct MarkupRenderer {
    markup: String,
    lines: Vec<String>,
}

impl MarkupRenderer {
    fn new() -> Self {
        Self {
            markup: String::new(),
            lines: Vec::new(),
        }
    }

    fn finish(self) -> FormattedText {
        FormattedText::new(self.markup, self.lines.join("\n"))
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Block(block) => self.block(block),
            Node::Table(table) => self.table(table),
        }
    }

    fn heading_line(&mut self, text: &str) {
        self.markup.push_str(&format!("<h2>{}</h2>", escape_html(text)));
        self.lines.push(text.to_string());
    }

    fn block(&mut self, block: &Block) {
        if block.is_empty() {
            return;
        }
        let inner = runs_markup(&block.runs);
        match block.kind {
            BlockKind::Heading => {
                let level = block.level.clamp(1, 6);
                self.markup
                    .push_str(&format!("<h{level}>{inner}</h{level}>"));
            }
            BlockKind::Paragraph if block.alignment.as_css() != "left" => {
                self.markup.push_str(&format!(
                    "<p style=\"text-align:{}\">{}</p>",
                    block.alignment.as_css(),
                    inner
                ));
            }
            BlockKind::Paragraph => {
                self.markup.push_str(&format!("<p>{}</p>", inner));
            }
        }
        self.lines.push(block.plain_text());
    }

    fn runs(&mut self, runs: &[Run]) {
        self.markup.push_str(&runs_markup(runs));
        let text: String = runs.iter().map(|r| r.text()).collect();
        if !text.is_empty() {
            self.lines.push(text);
        }
    }

    fn cell_content(&mut self, cell: &Cell) {
        for block in &cell.blocks {
            self.block(block);
        }
        for nested in &cell.nested_tables {
            self.table(nested);
        }
    }

    fn table(&mut self, table: &Table) {
        if table.is_empty() {
            return;
        }
        self.markup.push_str("<table>");
        for row in &table.rows {
            self.markup.push_str("<tr>");
            let mut cells_text = Vec::with_capacity(row.cells.len());
            for cell in &row.cells {
                let mut attrs = String::new();
                if cell.row_span > 1 {
                    attrs.push_str(&format!(" rowspan=\"{}\"", cell.row_span));
                }
                if cell.col_span > 1 {
                    attrs.push_str(&format!(" colspan=\"{}\"", cell.col_span));
                }
                if let Some(fill) = &cell.fill_color {
                    attrs.push_str(&format!(
                        " style=\"background-color:{}\"",
                        escape_html(fill)
                    ));
                }
                let content = render_cell(cell);
                self.markup.push_str(&format!("<td{}>{}</td>", attrs, content.markup));
                cells_text.push(content.plain_text.replace('\n', " "));
            }
            self.markup.push_str("</tr>");
            self.lines.push(cells_text.join("\t"));
        }
        self.markup.push_str("</table>");
    }
}

/// Markup of a run sequence, with equal-style neighbours merged.
fn runs_markup(runs: &[Run]) -> String {
    let mut out = String::new();
    let mut pending: Option<(&RunStyle, String)> = None;

    for run in runs.iter().filter(|r| !r.text().is_empty()) {
        if let Some((style, text)) = pending.as_mut() {
            if *style == run.style() {
                text.push_str(run.text());
                continue;
            }
        }
        if let Some((style, text)) = pending.take() {
            out.push_str(&apply_style(&text, style));
        }
        pending = Some((run.style(), run.text().to_string()));
    }
    if let Some((style, text)) = pending {
        out.push_str(&apply_style(&text, style));
    }
    out
}

fn apply_style(text: &str, style: &RunStyle) -> String {
    let mut result = escape_html(text)
        .replace('\t', "&#9;")
        .replace('\n', "<br>");

    // innermost first
    let mut css = Vec::new();
    if let Some(size) = style.size {
        css.push(format!("font-size:{}pt", size));
    }
    if let Some(color) = &style.color {
        css.push(format!("color:{}", escape_html(color)));
    }
    if let Some(highlight) = &style.highlight {
        css.push(format!("background-color:{}", escape_html(highlight)));
    }
    if let Some(font) = &style.font {
        css.push(format!("font-family:{}", escape_html(font)));
    }
    if !css.is_empty() {
        result = format!("<span style=\"{}\">{}</span>", css.join("; "), result);
    }
    if style.subscript {
        result = format!("<sub>{}</sub>", result);
    }
    if style.superscript {
        result = format!("<sup>{}</sup>", result);
    }
    if style.strike {
        result = format!("<s>{}</s>", result);
    }
    if style.underline {
        result = format!("<u>{}</u>", result);
    }
    if style.italic {
        result = format!("<i>{}</i>", result);
    }
    if style.bold {
        result = format!("<b>{}</b>", result);
    }

    result
}
