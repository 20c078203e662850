//! Mermaid flowchart output
//!
//! Same walk as the DOT writer, emitted as a `flowchart TB` with one
//! subgraph per thread. Node labels are quoted so statement text renders
//! verbatim.

use crate::graph::{ConflictSources, EventKind, ExecutionGraph, NodeId};
use crate::state::ThreadId;
use std::fmt::Write;

/// Render the whole graph as a Mermaid flowchart
pub fn render(graph: &ExecutionGraph) -> String {
    let mut out = String::new();
    out.push_str("flowchart TB\n");
    visit(graph, &mut out, graph.start_of(ThreadId(0)));
    out
}

fn emit_node(out: &mut String, id: NodeId, label: &str, shape: &str) {
    let label = label.replace('"', "'");
    if shape.is_empty() {
        let _ = writeln!(out, "\t{}(\"{}\")", id.0, label);
    } else {
        let _ = writeln!(out, "\t{}@{{ shape: {}, label: \"{}\" }}", id.0, shape, label);
    }
}

fn emit_edge(out: &mut String, from: NodeId, to: NodeId, style: &str) {
    if style.is_empty() {
        let _ = writeln!(out, "\t{} --> {}", from.0, to.0);
    } else {
        let _ = writeln!(out, "\t{} -.{}.-> {}", from.0, style, to.0);
    }
}

fn emit_conflict(out: &mut String, id: NodeId, conflict: &ConflictSources) {
    let _ = writeln!(out, "\tstyle {} fill:red", id.0);
    let (s1, s2) = conflict.sources;
    emit_edge(out, id, s1, "");
    emit_edge(out, id, s2, "");
}

/// Emit the program-order edge and continue, or close the subgraph at the
/// end of a thread's chain
fn follow(graph: &ExecutionGraph, out: &mut String, from: NodeId) {
    match graph.node(from).next {
        Some(next) => {
            emit_edge(out, from, next, "");
            visit(graph, out, next);
        }
        None => out.push_str("end\n"),
    }
}

fn visit(graph: &ExecutionGraph, out: &mut String, id: NodeId) {
    match &graph.node(id).kind {
        EventKind::Start { tid } => {
            let _ = writeln!(out, "subgraph Thread {}", tid);
            out.push_str("\tdirection TB\n");
            emit_node(out, id, "start", "circle");
            follow(graph, out, id);
        }
        EventKind::End => {
            emit_node(out, id, "end", "dbl-circ");
            out.push_str("end\n");
        }
        EventKind::Write { var, value, commit } => {
            emit_node(out, id, &format!("write {} = {} : #{}", var, value, commit), "");
            follow(graph, out, id);
        }
        EventKind::Read {
            var,
            value,
            commit,
            source,
        } => {
            emit_node(out, id, &format!("read {} = {} : #{}", var, value, commit), "");
            follow(graph, out, id);
            emit_edge(out, id, *source, "rf");
        }
        EventKind::Spawn { tid, spawned } => {
            emit_node(out, id, &format!("spawn {}", tid), "");
            follow(graph, out, id);
            emit_edge(out, id, *spawned, "");
            visit(graph, out, *spawned);
        }
        EventKind::Join { tid, joinee, conflict } => {
            emit_node(out, id, &format!("join Thread {}", tid), "");
            follow(graph, out, id);
            emit_edge(out, *joinee, id, "");
            if let Some(conflict) = conflict {
                emit_conflict(out, id, conflict);
            }
        }
        EventKind::Lock { var, after, conflict } => {
            emit_node(out, id, &format!("lock {}", var), "");
            follow(graph, out, id);
            if let Some(after) = after {
                emit_edge(out, *after, id, "");
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
            emit_node(out, id, &format!("assert {}", cond), "");
            let _ = writeln!(out, "\tstyle {} fill:red", id.0);
            follow(graph, out, id);
        }
        EventKind::Pending { label } => {
            emit_node(out, id, label, "");
            out.push_str("end\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::run_threads;
    use crate::state::GlobalContext;

    fn render_src(src: &str) -> String {
        let mut gctx = GlobalContext::new(gitmem_core::compile(src).expect("compile failed"));
        run_threads(&mut gctx);
        render(&gctx.graph)
    }

    #[test]
    fn renders_flowchart_with_subgraphs() {
        let out = render_src("$t = spawn { x = 1; }; join $t; $r = x;");
        assert!(out.starts_with("flowchart TB\n"));
        assert!(out.contains("subgraph Thread 0"));
        assert!(out.contains("subgraph Thread 1"));
        assert!(out.contains("write x = 1 : #0"));
        assert!(out.contains(".rf.->"));
    }

    #[test]
    fn conflicts_are_styled_red() {
        let out = render_src("$t = spawn { x = 1; }; x = 2; join $t;");
        assert!(out.contains("fill:red"));
    }
}
