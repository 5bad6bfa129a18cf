//! The structured matcher: walks a normalized tree and pairs observation
//! sections with proposal sections.

use super::anchors::{AnchorClass, AnchorHit, AnchorSet};
use super::details::{harvest, leading_code, LeadingCode};
use crate::model::{
    Block, Cell, DocumentTree, ExtractionMethod, FormattedText, Node, NodeId, ProposalRecord,
    Row, Section, SourceLocation, Table,
};
use crate::render::{render_block, render_blocks, render_cell, render_table};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Anchor and record counts of one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    /// Observation anchors seen (each column-layout data row counts once)
    pub observation_anchors: usize,
    /// Proposal anchors seen
    pub proposal_anchors: usize,
    /// Records whose proposal section is non-empty
    pub completed: usize,
    /// Records opened but never given a proposal
    pub unclosed: usize,
}

/// Content no record claimed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnattributedRegion {
    /// Section index
    pub section: usize,
    /// Rendered content
    pub content: FormattedText,
}

/// Result of [`ProposalMatcher::extract`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    /// Completed records, numbered from 1 in discovery order
    pub records: Vec<ProposalRecord>,
    /// Counts feeding the fallback decision
    pub stats: MatchStats,
    /// Content outside every completed record
    pub unattributed: Vec<UnattributedRegion>,
}

impl MatchOutcome {
    /// Highest record number, 0 when there are no records.
    pub fn max_number(&self) -> u32 {
        self.records.iter().map(|r| r.number).max().unwrap_or(0)
    }

    /// Unattributed regions as one piece of markup.
    pub fn unattributed_content(&self) -> FormattedText {
        let mut content = FormattedText::empty();
        for region in &self.unattributed {
            content.push(region.content.clone());
        }
        content
    }
}

/// Structured extractor over a [`DocumentTree`].
///
/// # Example
///
/// ```
/// use solvex::extract::ProposalMatcher;
/// use solvex::model::{DocumentKind, TreeBuilder};
///
/// let tree = TreeBuilder::new(DocumentKind::Flow)
///     .table(|t| {
///         t.row(&["Observación", "Faltan pólizas"]);
///         t.row(&["Propuesta de solventación", "Integrar pólizas"]);
///     })
///     .build();
///
/// let outcome = ProposalMatcher::default().extract(&tree);
/// assert_eq!(outcome.records.len(), 1);
/// assert_eq!(outcome.records[0].proposal.plain_text, "Integrar pólizas");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProposalMatcher {
    anchors: AnchorSet,
}

impl ProposalMatcher {
    /// Create a matcher with custom anchors.
    pub fn new(anchors: AnchorSet) -> Self {
        Self { anchors }
    }

    /// The anchors in use.
    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    /// Extract records: every table of every section first, then the
    /// top-level blocks of each section.
    pub fn extract(&self, tree: &DocumentTree) -> MatchOutcome {
        let mut collector = Collector::new(tree);
        let mut anchored_tables = HashSet::new();

        for (section, table) in tree.tables() {
            if self.has_anchor(table) {
                anchored_tables.insert(table.id);
                self.table_pass(&mut collector, section, table);
            }
        }
        for (index, section) in tree.sections.iter().enumerate() {
            self.block_pass(&mut collector, index, section, &anchored_tables);
        }

        log::debug!(
            "Matcher: {} records, {} observation / {} proposal anchors, {} unclosed",
            collector.records.len(),
            collector.stats.observation_anchors,
            collector.stats.proposal_anchors,
            collector.stats.unclosed
        );
        collector.finish()
    }

    fn has_anchor(&self, table: &Table) -> bool {
        table
            .cells()
            .filter(|c| !c.is_empty())
            .any(|c| self.anchors.is_anchor(&c.own_text()))
    }

    fn table_pass(&self, collector: &mut Collector, section: usize, table: &Table) {
        let mut scope = Scope::Idle;
        let mut layout: Option<ColumnLayout> = None;

        for (position, row) in table.rows.iter().enumerate() {
            if let Some(columns) = layout {
                if self.column_header(row).is_none() {
                    self.column_row(collector, section, table, row, columns);
                    continue;
                }
                layout = None;
            }
            let has_following_rows = position + 1 < table.rows.len();
            if has_following_rows {
                if let Some(columns) = self.column_header(row) {
                    collector.close();
                    layout = Some(columns);
                    scope = Scope::Idle;
                    continue;
                }
            }

            for (i, cell) in row.cells.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                let at = Span::rows(table.id, cell);
                let hit = self
                    .anchors
                    .classify(&cell.own_text())
                    .filter(|hit| !collector.repeats_label(hit.class, row.index))
                    .filter(|hit| scope != Scope::Row(row.index) || collector.switches_section(hit));

                let Some(hit) = hit else {
                    let content = render_cell(cell);
                    match scope {
                        Scope::Row(r) if r == row.index => collector.attribute(section, content, at),
                        Scope::FollowingRows => collector.attribute(section, content, at),
                        _ => collector.unattributed(section, content),
                    }
                    continue;
                };

                collector.open(hit.class, section, at, Some(row.index));
                if i > 0 {
                    if let Some(code) = self.row_code(row) {
                        collector.set_code(code);
                    }
                }
                let remainder = cell_remainder(cell, hit.remainder_start);
                if !remainder.is_empty() {
                    collector.attribute(section, remainder, at);
                }
                let more_in_row = row.cells[i + 1..].iter().any(|c| !c.is_empty());
                scope = if more_in_row {
                    Scope::Row(row.index)
                } else {
                    Scope::FollowingRows
                };
            }

            if scope == Scope::Row(row.index) {
                scope = Scope::Sealed;
            }
        }
        collector.close();
    }

    /// A header row naming an observation column and a proposal column.
    fn column_header(&self, row: &Row) -> Option<ColumnLayout> {
        let mut observation = None;
        let mut proposal = None;
        let mut other_columns = Vec::new();

        for cell in row.cells.iter().filter(|c| !c.is_empty()) {
            match self.anchors.classify(&cell.own_text()) {
                Some(hit) if !hit.bare => return None,
                Some(hit) => {
                    let slot = match hit.class {
                        AnchorClass::Observation => &mut observation,
                        AnchorClass::Proposal => &mut proposal,
                    };
                    if slot.is_some() {
                        return None;
                    }
                    *slot = Some(cell.col);
                }
                None => other_columns.push(cell.col),
            }
        }

        let (observation, proposal) = (observation?, proposal?);
        if observation >= proposal || other_columns.iter().any(|&c| c > observation && c < proposal) {
            return None;
        }
        let proposal_end = other_columns.into_iter().filter(|&c| c > proposal).min();
        Some(ColumnLayout {
            observation,
            proposal,
            proposal_end,
        })
    }

    /// One data row under a column header: one record.
    fn column_row(
        &self,
        collector: &mut Collector,
        section: usize,
        table: &Table,
        row: &Row,
        columns: ColumnLayout,
    ) {
        let mut observation = FormattedText::empty();
        let mut proposal = FormattedText::empty();
        let mut rest = FormattedText::empty();
        for cell in row.cells.iter().filter(|c| !c.is_empty()) {
            let content = render_cell(cell);
            if columns.is_observation(cell.col) {
                observation.push(content);
            } else if columns.is_proposal(cell.col) {
                proposal.push(content);
            } else {
                rest.push(content);
            }
        }
        if observation.is_empty() && proposal.is_empty() {
            collector.unattributed(section, rest);
            return;
        }

        let at = Span::Rows {
            table: table.id,
            first: row.index,
            last: row.index,
        };
        collector.open(AnchorClass::Observation, section, at, Some(row.index));
        if let Some(code) = row
            .cells
            .first()
            .filter(|c| c.col < columns.observation)
            .and_then(|c| leading_code(&c.own_text()))
        {
            collector.set_code(code);
        }
        collector.attribute(section, observation, at);
        collector.open(AnchorClass::Proposal, section, at, Some(row.index));
        collector.attribute(section, proposal, at);
        collector.close();
    }

    /// Reference or classification in the first cell of a row, unless that
    /// cell is itself an anchor.
    fn row_code(&self, row: &Row) -> Option<LeadingCode> {
        let first = row.cells.first()?;
        let text = first.own_text();
        if self.anchors.is_anchor(&text) {
            return None;
        }
        leading_code(&text)
    }

    fn block_pass(
        &self,
        collector: &mut Collector,
        index: usize,
        section: &Section,
        anchored_tables: &HashSet<NodeId>,
    ) {
        let mut sealed = false;
        for node in &section.nodes {
            match node {
                Node::Table(table) => {
                    if anchored_tables.contains(&table.id) {
                        collector.close();
                        sealed = false;
                        continue;
                    }
                    let content = render_table(table);
                    if collector.is_open() && !sealed {
                        collector.attribute(index, content, Span::node(table.id));
                    } else {
                        collector.unattributed(index, content);
                    }
                }
                Node::Block(block) => {
                    if block.is_empty() {
                        continue;
                    }
                    let at = Span::node(block.id);
                    match self.anchors.classify(&block.plain_text()) {
                        Some(hit) => {
                            collector.open(hit.class, index, at, None);
                            sealed = false;
                            let tail = block.tail(hit.remainder_start);
                            if !tail.is_empty() {
                                collector.attribute(index, render_block(&tail), at);
                            }
                        }
                        None if block.is_heading() => {
                            sealed = true;
                            collector.unattributed(index, render_block(block));
                        }
                        None if collector.is_open() && !sealed => {
                            collector.attribute(index, render_block(block), at);
                        }
                        None => collector.unattributed(index, render_block(block)),
                    }
                }
            }
        }
        collector.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// No section is taking content
    Idle,
    /// The rest of this grid row is section content
    Row(u32),
    /// The following rows are section content
    FollowingRows,
    /// The record waits for an anchor; plain content is not attributed
    Sealed,
}

#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    observation: u32,
    proposal: u32,
    proposal_end: Option<u32>,
}

impl ColumnLayout {
    fn is_observation(&self, col: u32) -> bool {
        col >= self.observation && col < self.proposal
    }

    fn is_proposal(&self, col: u32) -> bool {
        col >= self.proposal && self.proposal_end.map_or(true, |end| col < end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Rows { table: NodeId, first: u32, last: u32 },
    Nodes { first: NodeId, last: NodeId },
}

impl Span {
    fn rows(table: NodeId, cell: &Cell) -> Self {
        Span::Rows {
            table,
            first: cell.row,
            last: cell.row + cell.row_span.max(1) - 1,
        }
    }

    fn node(id: NodeId) -> Self {
        Span::Nodes {
            first: id,
            last: id,
        }
    }

    fn extend(&mut self, other: Span) {
        match (self, other) {
            (
                Span::Rows { table, first, last },
                Span::Rows {
                    table: other_table,
                    first: other_first,
                    last: other_last,
                },
            ) if *table == other_table => {
                *first = (*first).min(other_first);
                *last = (*last).max(other_last);
            }
            (
                Span::Nodes { first, last },
                Span::Nodes {
                    first: other_first,
                    last: other_last,
                },
            ) => {
                *first = (*first).min(other_first);
                *last = (*last).max(other_last);
            }
            _ => {}
        }
    }

    fn location(self, section: usize) -> SourceLocation {
        match self {
            Span::Rows { table, first, last } => SourceLocation::Table {
                section,
                table,
                first_row: first,
                last_row: last,
            },
            Span::Nodes { first, last } => SourceLocation::Blocks {
                section,
                first,
                last,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Observation,
    Proposal,
}

struct OpenRecord {
    section: usize,
    phase: Phase,
    observation: FormattedText,
    proposal: FormattedText,
    span: Span,
    anchor_row: Option<u32>,
    code: Option<LeadingCode>,
}

impl OpenRecord {
    fn new(section: usize, phase: Phase, span: Span, anchor_row: Option<u32>) -> Self {
        Self {
            section,
            phase,
            observation: FormattedText::empty(),
            proposal: FormattedText::empty(),
            span,
            anchor_row,
            code: None,
        }
    }

    fn active(&mut self) -> &mut FormattedText {
        match self.phase {
            Phase::Observation => &mut self.observation,
            Phase::Proposal => &mut self.proposal,
        }
    }
}

/// Record state shared by the table and block passes.
struct Collector<'t> {
    tree: &'t DocumentTree,
    records: Vec<ProposalRecord>,
    stats: MatchStats,
    unattributed: Vec<UnattributedRegion>,
    current: Option<OpenRecord>,
    in_gap: bool,
}

impl<'t> Collector<'t> {
    fn new(tree: &'t DocumentTree) -> Self {
        Self {
            tree,
            records: Vec::new(),
            stats: MatchStats::default(),
            unattributed: Vec::new(),
            current: None,
            in_gap: false,
        }
    }

    fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// A label of the open section's own class, repeated in the anchor row
    /// before any content arrived, is content rather than a new record.
    fn repeats_label(&self, class: AnchorClass, row: u32) -> bool {
        let Some(open) = &self.current else {
            return false;
        };
        let same_class = matches!(
            (open.phase, class),
            (Phase::Observation, AnchorClass::Observation) | (Phase::Proposal, AnchorClass::Proposal)
        );
        let section_empty = match open.phase {
            Phase::Observation => open.observation.is_empty(),
            Phase::Proposal => open.proposal.is_empty(),
        };
        same_class && section_empty && open.anchor_row == Some(row)
    }

    /// Inside an anchor row, only a label of the other class that opens its
    /// cell starts a new section; other mentions are content.
    fn switches_section(&self, hit: &AnchorHit) -> bool {
        let Some(open) = &self.current else {
            return true;
        };
        let other_class = matches!(
            (open.phase, hit.class),
            (Phase::Observation, AnchorClass::Proposal) | (Phase::Proposal, AnchorClass::Observation)
        );
        other_class && (hit.bare || hit.leading)
    }

    fn open(&mut self, class: AnchorClass, section: usize, at: Span, anchor_row: Option<u32>) {
        self.in_gap = false;
        match class {
            AnchorClass::Observation => {
                self.stats.observation_anchors += 1;
                self.close();
                self.current = Some(OpenRecord::new(section, Phase::Observation, at, anchor_row));
            }
            AnchorClass::Proposal => {
                self.stats.proposal_anchors += 1;
                let awaiting_proposal = matches!(
                    &self.current,
                    Some(open) if open.phase == Phase::Observation && open.section == section
                );
                if !awaiting_proposal {
                    self.close();
                    self.current = Some(OpenRecord::new(section, Phase::Proposal, at, anchor_row));
                } else if let Some(open) = self.current.as_mut() {
                    open.phase = Phase::Proposal;
                    open.span.extend(at);
                    open.anchor_row = anchor_row;
                }
            }
        }
    }

    fn set_code(&mut self, code: LeadingCode) {
        if let Some(open) = self.current.as_mut() {
            open.code.get_or_insert(code);
        }
    }

    fn attribute(&mut self, section: usize, content: FormattedText, at: Span) {
        if content.is_empty() {
            return;
        }
        let Some(open) = self.current.as_mut() else {
            self.unattributed(section, content);
            return;
        };
        self.in_gap = false;
        open.span.extend(at);
        open.active().push(content);
    }

    fn unattributed(&mut self, section: usize, content: FormattedText) {
        if content.is_empty() {
            return;
        }
        match self.unattributed.last_mut() {
            Some(last) if self.in_gap && last.section == section => last.content.push(content),
            _ => self.unattributed.push(UnattributedRegion { section, content }),
        }
        self.in_gap = true;
    }

    /// Close the open record: emit it when its proposal is non-empty,
    /// otherwise count it as unclosed and hand its content back.
    fn close(&mut self) {
        let Some(open) = self.current.take() else {
            return;
        };
        if open.proposal.is_empty() {
            self.stats.unclosed += 1;
            self.in_gap = false;
            self.unattributed(open.section, open.observation);
            return;
        }

        self.stats.completed += 1;
        let number = self.records.len() as u32 + 1;
        let section_name = self.tree.section_name(open.section).map(str::to_string);
        let mut record = ProposalRecord::new(
            number,
            open.observation,
            open.proposal,
            ExtractionMethod::Structured,
            open.span.location(open.section),
        )
        .with_section(section_name);
        match open.code {
            Some(LeadingCode::Reference(reference)) => record.reference = Some(reference),
            Some(LeadingCode::Classification(code)) => record.classification = Some(code),
            None => {}
        }
        record.details = harvest(&format!(
            "{}\n{}",
            record.observation.plain_text, record.proposal.plain_text
        ));
        self.records.push(record);
    }

    fn finish(mut self) -> MatchOutcome {
        self.close();
        MatchOutcome {
            records: self.records,
            stats: self.stats,
            unattributed: self.unattributed,
        }
    }
}

/// Content of an anchor cell after the label: the following paragraphs
/// (or the tail of the label paragraph) and nested tables.
fn cell_remainder(cell: &Cell, chars: usize) -> FormattedText {
    let blocks = blocks_after(&cell.blocks, chars);
    let mut content = render_blocks(&blocks);
    for nested in &cell.nested_tables {
        content.push(render_table(nested));
    }
    content
}

/// Blocks after a char offset into their newline-joined text.
fn blocks_after(blocks: &[Block], chars: usize) -> Vec<Block> {
    let mut skip = chars;
    let mut out = Vec::new();
    for block in blocks {
        let len = block.plain_text().chars().count();
        if skip > len {
            skip -= len + 1;
            continue;
        }
        let tail = if skip == 0 { block.clone() } else { block.tail(skip) };
        skip = 0;
        if !tail.is_empty() {
            out.push(tail);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentKind, Run, RunStyle, TreeBuilder};

    fn extract(tree: &DocumentTree) -> MatchOutcome {
        ProposalMatcher::default().extract(tree)
    }

    #[test]
    fn test_two_rows_of_inline_anchor_cells() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.row(&["Observación: faltan pólizas", "Propuesta de solventación: integrar pólizas"]);
                t.row(&["Observación: sin firma", "Propuesta de solventación: recabar firma"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].number, 1);
        assert_eq!(outcome.records[1].number, 2);
        assert_eq!(outcome.records[0].observation.plain_text, "faltan pólizas");
        assert_eq!(outcome.records[1].proposal.plain_text, "recabar firma");
        assert!(outcome.records.iter().all(|r| r.is_structured()));
        assert_eq!(outcome.stats.observation_anchors, 2);
        assert_eq!(outcome.stats.unclosed, 0);
    }

    #[test]
    fn test_key_value_rows() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.row(&["Observación", "Faltan pólizas de seguro"]);
                t.row(&["Propuesta de solventación", "Integrar pólizas vigentes"]);
                t.row(&["Observación", "Conciliaciones sin firma"]);
                t.row(&["Propuesta de solventación", "Recabar firmas"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].observation.plain_text, "Faltan pólizas de seguro");
        assert_eq!(outcome.records[0].proposal.plain_text, "Integrar pólizas vigentes");
        assert_eq!(
            outcome.records[1].source_location,
            SourceLocation::Table {
                section: 0,
                table: tree.tables().next().unwrap().1.id,
                first_row: 2,
                last_row: 3
            }
        );
    }

    #[test]
    fn test_banner_rows_take_following_rows() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.merged_row("OBSERVACIÓN", 3);
                t.row(&["Faltan", "pólizas", ""]);
                t.merged_row("PROPUESTA DE SOLVENTACIÓN", 3);
                t.merged_row("Integrar expediente", 3);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.observation.plain_text, "Faltan\npólizas");
        assert_eq!(record.proposal.plain_text, "Integrar expediente");
        assert!(record.proposal.markup.starts_with("<p>"));
    }

    #[test]
    fn test_merged_anchor_cell_is_one_cell() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.merged_row("Observación: el inventario no coincide", 3);
                t.merged_row("Propuesta de solventación: conciliar inventario", 3);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.stats.observation_anchors, 1);
        assert_eq!(
            outcome.records[0].observation.plain_text,
            "el inventario no coincide"
        );
    }

    #[test]
    fn test_column_header_layout_keeps_every_row() {
        let tree = TreeBuilder::new(DocumentKind::Grid)
            .section("Cédula")
            .table(|t| {
                t.row(&["No.", "Observación", "Propuesta de solventación", "Responsable"]);
                t.row(&["1.1", "Faltan pólizas", "Integrar pólizas", "Tesorería"]);
                t.row(&["1.2", "Sin firma", "Recabar firma", "Contraloría"]);
                t.row(&["AF-03", "Sin soporte", "Anexar soporte", ""]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[0].reference.as_deref(), Some("1.1"));
        assert_eq!(outcome.records[2].classification.as_deref(), Some("AF-03"));
        assert_eq!(outcome.records[1].proposal.plain_text, "Recabar firma");
        assert_eq!(outcome.records[0].sheet_or_section.as_deref(), Some("Cédula"));
        assert_eq!(outcome.stats.observation_anchors, 3);
        assert_eq!(outcome.stats.completed, 3);
    }

    #[test]
    fn test_value_cell_mentioning_observation_is_content() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.row(&["Observación", "Faltan pólizas"]);
                t.row(&["Propuesta de solventación", "Se solventa la observación"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].observation.plain_text, "Faltan pólizas");
        assert_eq!(
            outcome.records[0].proposal.plain_text,
            "Se solventa la observación"
        );
        assert_eq!(outcome.stats.observation_anchors, 1);
        assert_eq!(outcome.stats.proposal_anchors, 1);
        assert_eq!(outcome.stats.unclosed, 0);
    }

    #[test]
    fn test_column_rows_mentioning_observation_stay_rows() {
        let tree = TreeBuilder::new(DocumentKind::Grid)
            .section("Cédula")
            .table(|t| {
                t.row(&["Observación", "Propuesta de solventación"]);
                t.row(&["Faltan pólizas", "Integrar pólizas"]);
                t.row(&["Sin observación", "Ratificar cierre"]);
                t.row(&["Sin firma", "Se solventa la observación"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[1].observation.plain_text, "Sin observación");
        assert_eq!(
            outcome.records[2].proposal.plain_text,
            "Se solventa la observación"
        );
        assert_eq!(outcome.stats.completed, 3);
        assert_eq!(outcome.stats.unclosed, 0);
    }

    #[test]
    fn test_new_header_row_restarts_column_layout() {
        let tree = TreeBuilder::new(DocumentKind::Grid)
            .table(|t| {
                t.row(&["Observación", "Propuesta de solventación"]);
                t.row(&["Faltan pólizas", "Integrar pólizas"]);
                t.row(&["Responsable", "Observación", "Propuesta de solventación"]);
                t.row(&["Tesorería", "Sin firma", "Recabar firma"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[1].observation.plain_text, "Sin firma");
        assert_eq!(outcome.records[1].proposal.plain_text, "Recabar firma");
    }

    #[test]
    fn test_second_proposal_opens_proposal_only_record() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.row(&["Observación", "Faltan pólizas"]);
                t.row(&["Propuesta de solventación", "Integrar pólizas"]);
                t.row(&["Propuesta de solventación", "Actualizar padrón"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.records[1].observation.is_empty());
        assert_eq!(outcome.records[1].proposal.plain_text, "Actualizar padrón");
        assert_eq!(outcome.stats.proposal_anchors, 2);
    }

    #[test]
    fn test_unclosed_record_is_counted() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.row(&["Observación", "Faltan pólizas"]);
                t.row(&["Propuesta de solventación", "Integrar pólizas"]);
                t.row(&["Observación", "Sin respuesta"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.stats.unclosed, 1);
        assert_eq!(outcome.stats.observation_anchors, 2);
        assert!(outcome
            .unattributed_content()
            .plain_text
            .contains("Sin respuesta"));
    }

    #[test]
    fn test_nested_table_renders_inline() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                let label = t.text_cell("Observación");
                let mut body = t.text_cell("Se detectó:");
                body.nested_tables.push(t.nested(|n| {
                    n.row(&["Observación", "interna"]);
                    n.row(&["Propuesta de solventación", "interna"]);
                }));
                t.cells(vec![label, body]);
                t.row(&["Propuesta de solventación", "Atender"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.records[0].observation.markup.contains("<table>"));
        assert_eq!(outcome.stats.observation_anchors, 1);
    }

    #[test]
    fn test_block_pass_with_headings() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .paragraph("Cédula de seguimiento")
            .paragraph("Observación: faltan pólizas")
            .paragraph("de seguro vigentes")
            .runs(vec![Run::new("Propuesta de solventación:", RunStyle::bold())])
            .paragraph("Integrar pólizas")
            .heading(1, "Anexos")
            .paragraph("Listado de anexos")
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.observation.plain_text, "faltan pólizas\nde seguro vigentes");
        assert_eq!(record.proposal.plain_text, "Integrar pólizas");
        assert!(matches!(record.source_location, SourceLocation::Blocks { .. }));

        let rest = outcome.unattributed_content().plain_text;
        assert!(rest.contains("Cédula de seguimiento"));
        assert!(rest.contains("Listado de anexos"));
    }

    #[test]
    fn test_tables_first_then_blocks() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .paragraph("Observación: en párrafo")
            .paragraph("Propuesta de solventación: atender párrafo")
            .table(|t| {
                t.row(&["Observación", "en tabla"]);
                t.row(&["Propuesta de solventación", "atender tabla"]);
            })
            .build();
        let outcome = extract(&tree);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].observation.plain_text, "en tabla");
        assert_eq!(outcome.records[1].observation.plain_text, "en párrafo");
    }

    #[test]
    fn test_no_anchors() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .paragraph("Informe general")
            .table(|t| {
                t.row(&["Cuenta", "Saldo"]);
            })
            .build();
        let outcome = extract(&tree);

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.stats, MatchStats::default());
        assert_eq!(outcome.unattributed.len(), 1);
        assert_eq!(outcome.max_number(), 0);
    }

    #[test]
    fn test_blocks_after_offset() {
        let tree = TreeBuilder::new(DocumentKind::Flow)
            .table(|t| {
                t.row(&["Observación\nprimera línea\nsegunda"]);
            })
            .build();
        let (_, table) = tree.tables().next().unwrap();
        let cell = &table.rows[0].cells[0];

        let rest = blocks_after(&cell.blocks, "Observación\n".chars().count());
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].plain_text(), "primera línea");
    }
}
