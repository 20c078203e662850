//! gitmem-engine - Versioned-memory engine for the gitmem language
//!
//! This crate provides:
//! - **Versioned memory**: per-view commit histories with pull/fast-forward
//! - **Execution graph**: typed event recording for every step
//! - **Interpreter**: evaluator, statement stepper and thread driver
//! - **Schedulers**: the concrete round-robin driver and the interactive one
//! - **Model checker**: exhaustive schedule exploration with terminal-state
//!   deduplication
//!
//! # Quick start
//!
//! ```rust
//! use gitmem_engine::{run_threads, GlobalContext};
//!
//! let block = gitmem_core::compile("$r = 1; x = $r; assert x == 1;").unwrap();
//! let mut gctx = GlobalContext::new(block);
//! assert_eq!(run_threads(&mut gctx), 0);
//! ```

pub mod debug;
pub mod eval;
pub mod explore;
pub mod graph;
pub mod memory;
pub mod render;
pub mod sched;
pub mod state;
pub mod step;

// Re-exports
pub use debug::{interpret_interactive, parse_command, Command, DebugError};
pub use eval::{evaluate, EvalResult};
pub use explore::{explore, model_check, Exploration, TerminalState};
pub use graph::{ConflictSources, EventKind, EventNode, ExecutionGraph, NodeId};
pub use memory::{commit, conflict, pull, CommitHistory, CommitId, Conflict, Global, Globals};
pub use render::write_graph;
pub use sched::{
    progress_thread, run_thread_to_sync, run_threads, run_threads_to_sync, RoundOutcome,
    SliceOutcome,
};
pub use state::{GlobalContext, Lock, Termination, Thread, ThreadId, View};
pub use step::{is_syncing, run_statement, StepOutcome};
