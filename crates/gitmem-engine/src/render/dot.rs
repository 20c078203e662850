//! Graphviz DOT output
//!
//! One cluster per thread, walked in program order from thread 0's `Start`.
//! Spawned threads are reached through their `Spawn` nodes, so every thread
//! in the run appears. Reads-from, sync and race edges are drawn with
//! `constraint=false` so program order alone dictates the layout.

use crate::graph::{ConflictSources, EventKind, ExecutionGraph, NodeId};
use crate::state::ThreadId;
use std::fmt::Write;

/// Render the whole graph as a DOT digraph
pub fn render(graph: &ExecutionGraph) -> String {
    let mut out = String::new();
    out.push_str("digraph G {\n");
    visit(graph, &mut out, graph.start_of(ThreadId(0)));
    out.push_str("}\n");
    out
}

fn emit_node(out: &mut String, id: NodeId, label: &str, style: &str) {
    let _ = write!(
        out,
        "\t{}[label=\"{}\", shape=rectangle, style=\"rounded,filled\", ",
        id.0, label
    );
    if !style.is_empty() {
        out.push_str(style);
    }
    out.push_str("];\n");
}

fn emit_edge(out: &mut String, from: NodeId, to: NodeId, label: &str, style: &str) {
    let _ = write!(out, "\t{} -> {}", from.0, to.0);
    if !style.is_empty() || !label.is_empty() {
        out.push('[');
        out.push_str(style);
        if !label.is_empty() {
            let _ = write!(out, " label=\"{}\"", label);
        }
        out.push(']');
    }
    out.push_str(";\n");
}

fn emit_sync_edge(out: &mut String, from: NodeId, to: NodeId) {
    emit_edge(out, from, to, "sync", "style=bold, constraint=false");
}

fn emit_conflict(out: &mut String, id: NodeId, conflict: &ConflictSources) {
    let _ = writeln!(out, "\t{}[fillcolor = red];", id.0);
    let (s1, s2) = conflict.sources;
    emit_edge(out, id, s1, "race", "style=dashed, color=red, constraint=false");
    emit_edge(out, id, s2, "race", "style=dashed, color=red, constraint=false");
}

/// Emit the program-order edge and continue, or close the cluster at the
/// end of a thread's chain
fn follow(graph: &ExecutionGraph, out: &mut String, from: NodeId) {
    match graph.node(from).next {
        Some(next) => {
            emit_edge(out, from, next, "", "");
            visit(graph, out, next);
        }
        None => out.push_str("}\n"),
    }
}

fn visit(graph: &ExecutionGraph, out: &mut String, id: NodeId) {
    match &graph.node(id).kind {
        EventKind::Start { tid } => {
            let _ = writeln!(out, "subgraph cluster_Thread_{} {{", tid);
            let _ = writeln!(out, "\tlabel = \"Thread #{}\";", tid);
            out.push_str("\tcolor=black;\n");
            emit_node(out, id, "", "shape=circle width=.3 style=filled color=black");
            follow(graph, out, id);
        }
        EventKind::End => {
            emit_node(out, id, "", "shape=doublecircle width=.2 style=empty");
            out.push_str("}\n");
        }
        EventKind::Write { var, value, .. } => {
            emit_node(out, id, &format!("W{} = {}", var, value), "");
            follow(graph, out, id);
        }
        EventKind::Read { var, value, source, .. } => {
            emit_node(out, id, &format!("R{} = {}", var, value), "");
            follow(graph, out, id);
            emit_edge(out, id, *source, "rf", "style=dashed, constraint=false");
        }
        EventKind::Spawn { tid, spawned } => {
            emit_node(out, id, &format!("Spawn {}", tid), "");
            follow(graph, out, id);
            emit_sync_edge(out, id, *spawned);
            visit(graph, out, *spawned);
        }
        EventKind::Join { tid, joinee, conflict } => {
            emit_node(out, id, &format!("Join {}", tid), "");
            follow(graph, out, id);
            emit_sync_edge(out, *joinee, id);
            if let Some(conflict) = conflict {
                emit_conflict(out, id, conflict);
            }
        }
        EventKind::Lock { var, after, conflict } => {
            emit_node(out, id, &format!("lock {}", var), "");
            follow(graph, out, id);
            if let Some(after) = after {
                emit_sync_edge(out, *after, id);
            }
            if let Some(conflict) = conflict {
                emit_conflict(out, id, conflict);
            }
        }
        EventKind::Unlock { var } => {
            emit_node(out, id, &format!("unlock {}", var), "");
            follow(graph, out, id);
        }
        EventKind::AssertFailed { cond } => {
            emit_node(out, id, &format!("assert {}", cond), "fillcolor=red");
            follow(graph, out, id);
        }
        EventKind::Pending { label } => {
            emit_node(out, id, label, "style=dashed");
            out.push_str("}\n");
        }
    }
}
