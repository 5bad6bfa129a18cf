//! Image association: which images fall inside a record's source range.
//!
//! An image is inside a record when it is anchored to a block or cell lying
//! within the record's [`SourceLocation`]. Images in nested tables resolve
//! to the row of the outer table. Images elsewhere in the same table are
//! reported as [`Placement::Ambiguous`] rather than guessed either way.

use crate::model::{Anchor, DocumentTree, Image, ImageRef, Node, NodeId, SourceLocation, Table};
use serde::Serialize;
use std::collections::HashMap;

/// How an image relates to a queried location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Anchored within the range
    Inside,
    /// Same table, outside the row range
    Ambiguous,
}

/// Image returned by a location query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageHit<'a> {
    /// The image
    pub image: &'a Image,
    /// Relation to the queried range
    pub placement: Placement,
}

/// Container for [`ImageIndex::images_within`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// A section (a sheet, for grid documents)
    Section(usize),
    /// A table; top-level tables include the images of their nested tables
    Table(NodeId),
}

#[derive(Debug, Clone, Copy)]
enum Site {
    Block,
    Row { table: NodeId, row: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Located<'a> {
    image: &'a Image,
    section: usize,
    position: usize,
    site: Site,
}

#[derive(Debug, Clone, Copy)]
struct TablePlace {
    section: usize,
    position: usize,
    outer: NodeId,
    outer_row: Option<u32>,
}

/// Lookup structure over the images of one tree.
#[derive(Debug)]
pub struct ImageIndex<'a> {
    located: Vec<Located<'a>>,
    nodes: HashMap<NodeId, (usize, usize)>,
}

impl<'a> ImageIndex<'a> {
    /// Index the images of `tree`.
    pub fn build(tree: &'a DocumentTree) -> Self {
        let mut nodes = HashMap::new();
        let mut tables = HashMap::new();
        for (section, s) in tree.sections.iter().enumerate() {
            for (position, node) in s.nodes.iter().enumerate() {
                nodes.insert(node.id(), (section, position));
                if let Node::Table(table) = node {
                    let place = TablePlace {
                        section,
                        position,
                        outer: table.id,
                        outer_row: None,
                    };
                    tables.insert(table.id, place);
                    index_nested(table, place, &mut tables);
                }
            }
        }

        let mut located = Vec::with_capacity(tree.images.len());
        for image in &tree.images {
            let entry = match image.anchor {
                Anchor::Block { block } => nodes.get(&block).map(|&(section, position)| Located {
                    image,
                    section,
                    position,
                    site: Site::Block,
                }),
                Anchor::Cell(cell) => tables.get(&cell.table).map(|place| Located {
                    image,
                    section: place.section,
                    position: place.position,
                    site: Site::Row {
                        table: place.outer,
                        row: place.outer_row.unwrap_or(cell.row),
                    },
                }),
            };
            match entry {
                Some(entry) => located.push(entry),
                None => log::warn!("Image {} is anchored outside the document tree", image.id),
            }
        }

        Self { located, nodes }
    }

    /// Number of indexed images.
    pub fn len(&self) -> usize {
        self.located.len()
    }

    /// Check if no image is indexed.
    pub fn is_empty(&self) -> bool {
        self.located.is_empty()
    }

    /// Images inside a section or table, in document order.
    pub fn images_within(&self, scope: Scope) -> Vec<&'a Image> {
        self.located
            .iter()
            .filter(|l| match scope {
                Scope::Section(section) => l.section == section,
                Scope::Table(id) => {
                    matches!(l.site, Site::Row { table, .. } if table == id)
                        || matches!(l.image.anchor, Anchor::Cell(cell) if cell.table == id)
                }
            })
            .map(|l| l.image)
            .collect()
    }

    /// Images related to a record's source location.
    pub fn images_for_location(&self, location: &SourceLocation) -> Vec<ImageHit<'a>> {
        match *location {
            SourceLocation::Table {
                table,
                first_row,
                last_row,
                ..
            } => self
                .located
                .iter()
                .filter_map(|l| match l.site {
                    Site::Row { table: t, row } if t == table => {
                        let placement = if (first_row..=last_row).contains(&row) {
                            Placement::Inside
                        } else {
                            Placement::Ambiguous
                        };
                        Some(ImageHit {
                            image: l.image,
                            placement,
                        })
                    }
                    _ => None,
                })
                .collect(),
            SourceLocation::Blocks {
                section,
                first,
                last,
            } => {
                let (Some(&(_, start)), Some(&(_, end))) =
                    (self.nodes.get(&first), self.nodes.get(&last))
                else {
                    return Vec::new();
                };
                self.located
                    .iter()
                    .filter(|l| l.section == section && (start..=end).contains(&l.position))
                    .map(|l| ImageHit {
                        image: l.image,
                        placement: Placement::Inside,
                    })
                    .collect()
            }
            SourceLocation::Fallback { .. } => Vec::new(),
        }
    }
}

fn index_nested(table: &Table, place: TablePlace, tables: &mut HashMap<NodeId, TablePlace>) {
    for cell in table.cells() {
        for nested in &cell.nested_tables {
            let nested_place = TablePlace {
                outer_row: Some(place.outer_row.unwrap_or(cell.row)),
                ..place
            };
            tables.insert(nested.id, nested_place);
            index_nested(nested, nested_place, tables);
        }
    }
}

/// Payload-free views of every image in the tree.
pub fn associate(tree: &DocumentTree) -> Vec<ImageRef> {
    tree.images.iter().map(ImageRef::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellRef, DocumentKind, PositionHint, TreeBuilder};

    fn image(id: &str, anchor: Anchor) -> Image {
        Image::new(id, vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], None, anchor, PositionHint::default())
    }

    fn sample() -> DocumentTree {
        let mut tree = TreeBuilder::new(DocumentKind::Flow)
            .paragraph("Observación: Falta evidencia fotográfica")
            .paragraph("Propuesta de solventación: Anexar fotografías")
            .table(|t| {
                t.row(&["Observación", "Faltan pólizas"]);
                let inner = t.nested(|n| {
                    n.row(&["detalle"]);
                });
                let mut cell = t.text_cell("Integrar expediente");
                cell.nested_tables.push(inner);
                let label = t.text_cell("Propuesta de solventación");
                t.cells(vec![label, cell]);
                t.row(&["Notas", "sin cambios"]);
            })
            .build();

        let first_block = tree.sections[0].nodes[0].id();
        let (_, table) = tree.tables().next().unwrap();
        let outer = table.id;
        let nested = table.rows[1].cells[1].nested_tables[0].id;

        tree.images = vec![
            image("img1", Anchor::Block { block: first_block }),
            image("img2", Anchor::Cell(CellRef { table: nested, row: 0, col: 0 })),
            image("img3", Anchor::Cell(CellRef { table: outer, row: 2, col: 1 })),
        ];
        tree
    }

    fn ids<'a>(hits: &[ImageHit<'a>]) -> Vec<(&'a str, Placement)> {
        hits.iter().map(|h| (h.image.id.as_str(), h.placement)).collect()
    }

    #[test]
    fn test_nested_image_resolves_to_outer_row() {
        let tree = sample();
        let index = ImageIndex::build(&tree);
        let (_, table) = tree.tables().next().unwrap();

        let location = SourceLocation::Table {
            section: 0,
            table: table.id,
            first_row: 0,
            last_row: 1,
        };
        let hits = index.images_for_location(&location);
        assert_eq!(
            ids(&hits),
            vec![("img2", Placement::Inside), ("img3", Placement::Ambiguous)]
        );
    }

    #[test]
    fn test_block_range() {
        let tree = sample();
        let index = ImageIndex::build(&tree);
        let nodes = &tree.sections[0].nodes;

        let location = SourceLocation::Blocks {
            section: 0,
            first: nodes[0].id(),
            last: nodes[1].id(),
        };
        assert_eq!(ids(&index.images_for_location(&location)), vec![("img1", Placement::Inside)]);

        let fallback = SourceLocation::Fallback {
            region: "document".to_string(),
        };
        assert!(index.images_for_location(&fallback).is_empty());
    }

    #[test]
    fn test_images_within() {
        let tree = sample();
        let index = ImageIndex::build(&tree);
        let (_, table) = tree.tables().next().unwrap();
        let nested = table.rows[1].cells[1].nested_tables[0].id;

        assert_eq!(index.len(), 3);
        assert_eq!(index.images_within(Scope::Section(0)).len(), 3);
        assert_eq!(index.images_within(Scope::Section(1)).len(), 0);
        assert_eq!(index.images_within(Scope::Table(table.id)).len(), 2);
        let inner = index.images_within(Scope::Table(nested));
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].id, "img2");
    }

    #[test]
    fn test_dangling_anchor_is_skipped() {
        let mut tree = sample();
        tree.images.push(image("img9", Anchor::Block { block: NodeId(999) }));
        let index = ImageIndex::build(&tree);
        assert_eq!(index.len(), 3);
        assert_eq!(associate(&tree).len(), 4);
    }
}
