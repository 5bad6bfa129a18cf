//! Document model shared by every reader and by the extraction engine.
//!
//! Word-processor and spreadsheet sources are normalized into the same
//! closed set of node kinds: blocks, tables (rows of cells with spans) and
//! runs, plus images bound to a block or cell. Extracted records live here
//! as well.

mod block;
mod builder;
mod document;
mod image;
mod record;
mod table;

pub use block::{Alignment, Block, BlockKind, IdAllocator, NodeId, Run, RunStyle};
pub use builder::{TableBuilder, TreeBuilder};
pub use document::{DamagedRegion, DocumentKind, DocumentTree, Heading, Metadata, Node, Section};
pub use image::{detect_mime_type, Anchor, CellRef, Image, ImageRef, PositionHint};
pub use record::{
    ExtractionMethod, FormattedText, ProposalRecord, RecordDetails, SourceLocation,
};
pub use table::{BorderLine, Borders, Cell, Row, Table};
