//! Process state: threads, locks and the global context
//!
//! "Threads" are logical coroutines: a private view of the versioned
//! globals, a shared reference to the statement block they execute, and an
//! explicit program counter. All of it is owned by the single
//! [`GlobalContext`]; the engine is cooperative and single-threaded.

use crate::graph::{ExecutionGraph, NodeId};
use crate::memory::{CommitId, Globals};
use gitmem_core::{Block, Name};
use im::OrdMap;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Index of a thread in the context; ids equal positions and never change
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a thread stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ran past its last statement
    Completed,
    /// A pull detected a history conflict
    DataRace,
    /// An assertion evaluated to zero
    AssertionFailure,
    /// A register or global was read before any assignment in this view
    UnassignedRead,
    /// The thread unlocked a lock it does not hold
    UnlockNotHeld,
}

impl Termination {
    pub fn is_error(self) -> bool {
        self != Termination::Completed
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::DataRace => write!(f, "data-race exception"),
            Termination::AssertionFailure => write!(f, "assertion-failure exception"),
            Termination::UnassignedRead => write!(f, "unassigned-variable-read exception"),
            Termination::UnlockNotHeld => write!(f, "unlock exception"),
        }
    }
}

/// A thread's private state: registers, versioned globals, graph tail
#[derive(Debug, Clone)]
pub struct View {
    /// Thread-local registers; never synchronised
    pub registers: OrdMap<Name, i64>,
    /// Versioned globals this thread has encountered
    pub globals: Globals,
    /// Last event this thread recorded
    pub tail: NodeId,
}

/// A logical thread
#[derive(Debug, Clone)]
pub struct Thread {
    pub view: View,
    /// The statement sequence this thread executes. Block identity is what
    /// matches "the same thread" across differently-ordered schedules.
    pub block: Arc<Block>,
    /// Index of the next statement in `block`
    pub pc: usize,
    pub terminated: Option<Termination>,
}

impl Thread {
    pub fn new(block: Arc<Block>, globals: Globals, start: NodeId) -> Self {
        Self {
            view: View {
                registers: OrdMap::new(),
                globals,
                tail: start,
            },
            block,
            pc: 0,
            terminated: None,
        }
    }

    /// Terminal-state comparison: block identity, position, termination,
    /// registers, and global *values* (histories and commit ids are ignored
    /// so that schedule-induced commit reordering collapses).
    fn state_eq(&self, other: &Thread) -> bool {
        if self.view.globals.len() != other.view.globals.len() {
            return false;
        }
        for (var, global) in self.view.globals.iter() {
            match other.view.globals.get(var) {
                Some(other_global) if other_global.value == global.value => {}
                _ => return false,
            }
        }
        self.view.registers == other.view.registers
            && Arc::ptr_eq(&self.block, &other.block)
            && self.pc == other.pc
            && self.terminated == other.terminated
    }
}

/// A lock: an owner, the view published by the last unlocker, and the last
/// unlock event for graph ordering
#[derive(Debug, Clone, Default)]
pub struct Lock {
    pub globals: Globals,
    pub owner: Option<ThreadId>,
    pub last_unlock: Option<NodeId>,
}

/// The whole process state
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Threads indexable by id; spawn appends, nothing reorders
    pub threads: Vec<Thread>,
    /// Locks by name, created lazily on first `lock`
    pub locks: OrdMap<Name, Lock>,
    /// The execution graph recorded so far
    pub graph: ExecutionGraph,
    /// Memoised `join` targets keyed by (thread id, pc of the join)
    pub join_cache: FxHashMap<(usize, usize), i64>,
    /// Engine-wide commit counter
    uuid: u64,
}

impl GlobalContext {
    /// Fresh state: the root thread (id 0) with an empty view
    pub fn new(block: Arc<Block>) -> Self {
        let mut graph = ExecutionGraph::new();
        let start = graph.push_start(ThreadId(0));
        let root = Thread::new(block, Globals::new(), start);
        Self {
            threads: vec![root],
            locks: OrdMap::new(),
            graph,
            join_cache: FxHashMap::default(),
            uuid: 0,
        }
    }

    /// Draw the next commit identifier
    pub fn next_commit(&mut self) -> CommitId {
        let id = CommitId(self.uuid);
        self.uuid += 1;
        id
    }

    pub fn thread(&self, tid: ThreadId) -> &Thread {
        &self.threads[tid.0]
    }

    pub fn thread_mut(&mut self, tid: ThreadId) -> &mut Thread {
        &mut self.threads[tid.0]
    }

    /// Whether every thread completed normally
    pub fn all_completed(&self) -> bool {
        self.threads
            .iter()
            .all(|t| t.terminated == Some(Termination::Completed))
    }

    /// Whether any thread terminated with an error
    pub fn any_crashed(&self) -> bool {
        self.threads
            .iter()
            .any(|t| t.terminated.is_some_and(Termination::is_error))
    }
}

impl PartialEq for GlobalContext {
    /// Terminal-state equality (see `Thread::state_eq`). Threads are matched
    /// by block identity, not by id, to absorb spawn-order differences
    /// between schedules. Locks must agree on owners.
    fn eq(&self, other: &Self) -> bool {
        if self.threads.len() != other.threads.len() || self.locks.len() != other.locks.len() {
            return false;
        }

        for thread in &self.threads {
            let matched = other
                .threads
                .iter()
                .find(|t| Arc::ptr_eq(&t.block, &thread.block));
            match matched {
                Some(candidate) if thread.state_eq(candidate) => {}
                _ => return false,
            }
        }

        for (name, lock) in self.locks.iter() {
            match other.locks.get(name) {
                Some(other_lock) if other_lock.owner == lock.owner => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Global;
    use smallvec::smallvec;

    fn context_with_global(ids: &[u64], value: i64) -> GlobalContext {
        let block = Arc::new(gitmem_core::parse("nop;").expect("parse failed"));
        let mut gctx = GlobalContext::new(block);
        gctx.threads[0].view.globals.insert(
            Arc::from("x"),
            Global {
                value,
                pending: None,
                history: ids.iter().map(|&i| CommitId(i)).collect(),
            },
        );
        gctx.threads[0].terminated = Some(Termination::Completed);
        gctx.threads[0].pc = 1;
        gctx
    }

    #[test]
    fn commit_ids_are_strictly_increasing() {
        let block = Arc::new(gitmem_core::parse("nop;").expect("parse failed"));
        let mut gctx = GlobalContext::new(block);
        let a = gctx.next_commit();
        let b = gctx.next_commit();
        assert!(a < b);
    }

    #[test]
    fn terminal_equality_ignores_histories() {
        // Same terminal value through different commit orders
        let a = context_with_global(&[0, 1], 7);
        let b = context_with_global(&[1, 0], 7);
        assert_eq!(a, b);
    }

    #[test]
    fn terminal_equality_distinguishes_values() {
        let a = context_with_global(&[0], 1);
        let b = context_with_global(&[0], 2);
        assert_ne!(a, b);
    }

    #[test]
    fn terminal_equality_requires_same_block_identity() {
        let a = context_with_global(&[0], 1);
        let mut b = context_with_global(&[0], 1);
        // A structurally identical but distinct block is a different thread
        b.threads[0].block = Arc::new(gitmem_core::parse("nop;").expect("parse failed"));
        assert_ne!(a, b);
    }

    #[test]
    fn terminal_equality_checks_lock_owners() {
        let a = context_with_global(&[0], 1);
        let mut b = context_with_global(&[0], 1);
        b.locks.insert(Arc::from("m"), Lock::default());
        assert_ne!(a, b);

        let mut a2 = context_with_global(&[0], 1);
        a2.locks.insert(
            Arc::from("m"),
            Lock {
                owner: Some(ThreadId(0)),
                ..Lock::default()
            },
        );
        assert_ne!(a2, b);
    }

    #[test]
    fn global_read_commit_prefers_pending() {
        let global = Global {
            value: 3,
            pending: Some(CommitId(5)),
            history: smallvec![CommitId(1)],
        };
        assert_eq!(global.read_commit(), Some(CommitId(5)));
    }
}
