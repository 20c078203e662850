//! Serializers for the execution graph
//!
//! The graph is written to a single path per run; the extension picks the
//! format (`.md`/`.mmd` for Mermaid, anything else for Graphviz DOT).

pub mod dot;
pub mod mermaid;

use crate::graph::ExecutionGraph;
use std::path::Path;

/// Render the graph in the format implied by `path` and write it there
pub fn write_graph(graph: &ExecutionGraph, path: &Path) -> std::io::Result<()> {
    let rendered = match path.extension().and_then(|ext| ext.to_str()) {
        Some("md") | Some("mmd") => mermaid::render(graph),
        _ => dot::render(graph),
    };
    std::fs::write(path, rendered)
}
