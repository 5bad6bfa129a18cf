//! Rendering of document content to inline markup and of reports to JSON.

mod json;
mod markup;

pub use json::{to_json, JsonFormat};
pub use markup::{
    render_block, render_blocks, render_cell, render_node, render_runs, render_table, render_tree,
};
