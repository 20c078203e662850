//! Exhaustive schedule exploration
//!
//! The space of schedulings is a tree of [`TraceNode`]s: a path from the
//! root is a trace, each node naming the thread scheduled at that point. The
//! explorer walks the tree depth-first, leftmost-first. A finished subtree is
//! marked `complete`; to move to the next trace the engine state is rebuilt
//! from scratch and the remaining non-complete prefix is replayed.
//!
//! Terminal states are deduplicated with the structural equality of
//! [`GlobalContext`] (block identity for threads, values without histories),
//! so schedules that only reorder commits collapse into one reported state.

use crate::render::write_graph;
use crate::sched::{progress_thread, SliceOutcome};
use crate::state::{GlobalContext, ThreadId};
use gitmem_core::Block;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A point in the space of possible schedulings
#[derive(Debug)]
struct TraceNode {
    tid: usize,
    /// This branch and all sibling orderings from it have been exhausted
    complete: bool,
    children: Vec<TraceNode>,
}

impl TraceNode {
    fn new(tid: usize) -> Self {
        Self {
            tid,
            complete: false,
            children: Vec::new(),
        }
    }

    /// Follow a path of child indices from this node
    fn at_path_mut(&mut self, path: &[usize]) -> &mut TraceNode {
        path.iter().fold(self, |node, &i| &mut node.children[i])
    }

    fn at_path(&self, path: &[usize]) -> &TraceNode {
        path.iter().fold(self, |node, &i| &node.children[i])
    }
}

/// One recorded terminal state: the trace that reached it and the state
#[derive(Debug)]
pub struct TerminalState {
    pub trace: Vec<ThreadId>,
    pub context: GlobalContext,
}

/// Everything the exploration found
#[derive(Debug, Default)]
pub struct Exploration {
    /// All distinct terminal states, in discovery order
    pub terminal: Vec<TerminalState>,
    /// Indices into `terminal` of states where a thread crashed
    pub failing: Vec<usize>,
    /// Indices into `terminal` of deadlocked states
    pub deadlocked: Vec<usize>,
}

impl Exploration {
    pub fn has_errors(&self) -> bool {
        !self.failing.is_empty() || !self.deadlocked.is_empty()
    }
}

/// Explore every scheduling of the program and collect distinct terminal
/// states.
pub fn explore(block: &Arc<Block>) -> Exploration {
    let mut result = Exploration::default();

    let mut root = TraceNode::new(0);
    let mut path: Vec<usize> = Vec::new();
    let mut gctx = GlobalContext::new(block.clone());
    let mut current_trace = vec![ThreadId(0)];
    debug!("==== Thread 0 ====");
    progress_thread(&mut gctx, ThreadId(0));

    while !root.complete {
        // Replay: follow the last child of each node while it is still open
        loop {
            let cursor = root.at_path(&path);
            match cursor.children.last() {
                Some(last) if !last.complete => {
                    let tid = last.tid;
                    path.push(cursor.children.len() - 1);
                    current_trace.push(ThreadId(tid));
                    debug!("==== Thread {} (replay) ====", tid);
                    progress_thread(&mut gctx, ThreadId(tid));
                }
                _ => break,
            }
        }

        // Extend: the smallest thread id after the last child that moves
        let start_tid = root
            .at_path(&path)
            .children
            .last()
            .map(|child| child.tid + 1)
            .unwrap_or(0);
        let thread_count = gctx.threads.len();
        let mut made_progress = false;
        let mut tid = start_tid;
        while tid < thread_count && !made_progress {
            if gctx.threads[tid].terminated.is_none() {
                debug!("==== Thread {} ====", tid);
                let outcome = progress_thread(&mut gctx, ThreadId(tid));
                match outcome {
                    SliceOutcome::Terminated(status) => {
                        made_progress = true;
                        extend(&mut root, &mut path, &mut current_trace, tid);
                        if status.is_error() {
                            debug!("Thread {} terminated with an error", tid);
                            root.at_path_mut(&path).complete = true;
                        }
                    }
                    SliceOutcome::Progress => {
                        made_progress = true;
                        extend(&mut root, &mut path, &mut current_trace, tid);
                    }
                    SliceOutcome::NoProgress => {}
                }
            }
            tid += 1;
        }

        if !made_progress {
            root.at_path_mut(&path).complete = true;
        }

        let all_completed = gctx.all_completed();
        let any_crashed = gctx.any_crashed();
        let is_deadlock =
            !all_completed && !made_progress && root.at_path(&path).children.is_empty();

        if all_completed || any_crashed || is_deadlock {
            let is_new = !result
                .terminal
                .iter()
                .any(|state| state.context == gctx);
            if is_new {
                let index = result.terminal.len();
                result.terminal.push(TerminalState {
                    trace: current_trace.clone(),
                    context: gctx.clone(),
                });
                if any_crashed {
                    result.failing.push(index);
                } else if is_deadlock {
                    result.deadlocked.push(index);
                }
            }
            root.at_path_mut(&path).complete = true;
        }

        if root.at_path(&path).complete && !root.complete {
            // Rebuild the state and replay the remaining open prefix
            debug!("Restarting trace...");
            gctx = GlobalContext::new(block.clone());
            path.clear();
            current_trace.clear();
            current_trace.push(ThreadId(0));
            debug!("==== Thread 0 (replay) ====");
            progress_thread(&mut gctx, ThreadId(0));
        }
    }

    result
}

fn extend(
    root: &mut TraceNode,
    path: &mut Vec<usize>,
    current_trace: &mut Vec<ThreadId>,
    tid: usize,
) {
    let cursor = root.at_path_mut(path);
    cursor.children.push(TraceNode::new(tid));
    path.push(cursor.children.len() - 1);
    current_trace.push(ThreadId(tid));
}

/// Graph path for the n-th reported terminal state: a zero-padded index is
/// inserted before the extension (`out.dot` becomes `out_003.dot`).
fn indexed_output_path(output_path: &Path, index: usize) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = output_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    output_path.with_file_name(format!("{}_{:03}{}", stem, index, ext))
}

fn format_trace(trace: &[ThreadId]) -> String {
    trace
        .iter()
        .map(|tid| tid.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Explore all schedulings, print failing and deadlocked traces, and write
/// one execution graph per reported state. Returns the process exit code.
pub fn model_check(
    block: &Arc<Block>,
    output_path: &Path,
    out: &mut impl Write,
) -> std::io::Result<i32> {
    let exploration = explore(block);

    debug!(
        "Found a total of {} trace(s) with distinct final states:",
        exploration.terminal.len()
    );
    for state in &exploration.terminal {
        debug!("{}", format_trace(&state.trace));
    }

    let mut graph_index = 0;
    if !exploration.failing.is_empty() {
        writeln!(
            out,
            "Found {} trace(s) with errors:",
            exploration.failing.len()
        )?;
        for &index in &exploration.failing {
            writeln!(out, "{}", format_trace(&exploration.terminal[index].trace))?;
        }
        for &index in &exploration.failing {
            let path = indexed_output_path(output_path, graph_index);
            write_graph(&exploration.terminal[index].context.graph, &path)?;
            graph_index += 1;
        }
    }

    if !exploration.deadlocked.is_empty() {
        writeln!(
            out,
            "Found {} trace(s) leading to deadlock:",
            exploration.deadlocked.len()
        )?;
        for &index in &exploration.deadlocked {
            writeln!(out, "{}", format_trace(&exploration.terminal[index].trace))?;
        }
        for &index in &exploration.deadlocked {
            let path = indexed_output_path(output_path, graph_index);
            write_graph(&exploration.terminal[index].context.graph, &path)?;
            graph_index += 1;
        }
    }

    Ok(i32::from(exploration.has_errors()))
}
