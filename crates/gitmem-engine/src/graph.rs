//! The execution-graph recorder
//!
//! Every step that observes or modifies state appends a typed event node.
//! Nodes live in an arena indexed by [`NodeId`]; cross-thread references
//! (reads-from, sync and conflict edges) are plain ids, which keeps the
//! graph cyclic-reference-free even though conflict edges point backwards.
//!
//! Each thread owns a tail id: `append` links the tail's `next` to the new
//! node and advances the tail. `record_pending` links a transient
//! placeholder for the next statement *without* advancing, so the next real
//! event overwrites it.

use crate::memory::CommitId;
use crate::state::ThreadId;
use gitmem_core::Name;
use rustc_hash::FxHashMap;
use std::fmt;

/// Index of an event node in the arena
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Sources of a recorded data race: the two divergent `Write` nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSources {
    pub var: Name,
    pub sources: (NodeId, NodeId),
}

/// A typed event node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Head of a thread's event chain
    Start { tid: ThreadId },
    /// A thread stopped, normally or not
    End,
    /// A global write and the commit it produced
    Write {
        var: Name,
        value: i64,
        commit: CommitId,
    },
    /// A global read, back-linked to the write whose commit it observed
    Read {
        var: Name,
        value: i64,
        commit: CommitId,
        source: NodeId,
    },
    /// A spawn, linked to the child's `Start`
    Spawn { tid: ThreadId, spawned: NodeId },
    /// A join, linked to the joinee's tail at pull time
    Join {
        tid: ThreadId,
        joinee: NodeId,
        conflict: Option<ConflictSources>,
    },
    /// A lock acquisition, ordered after the previous unlock if any
    Lock {
        var: Name,
        after: Option<NodeId>,
        conflict: Option<ConflictSources>,
    },
    /// A lock release
    Unlock { var: Name },
    /// A failed assertion, with the condition text
    AssertFailed { cond: String },
    /// Transient placeholder for the next statement of a live thread
    Pending { label: String },
}

/// An event node with its forward program-order edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNode {
    pub kind: EventKind,
    pub next: Option<NodeId>,
}

/// Arena of event nodes plus the per-commit write lookup
#[derive(Debug, Clone, Default)]
pub struct ExecutionGraph {
    nodes: Vec<EventNode>,
    /// Commit id to the `Write` node that produced it; injective
    commit_writes: FxHashMap<CommitId, NodeId>,
    /// `Start` node of each thread, indexed by thread id
    starts: Vec<NodeId>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &EventNode {
        &self.nodes[id.0]
    }

    /// `Start` node of the given thread
    pub fn start_of(&self, tid: ThreadId) -> NodeId {
        self.starts[tid.0]
    }

    /// The `Write` node registered for a commit
    pub fn write_node(&self, commit: CommitId) -> NodeId {
        *self
            .commit_writes
            .get(&commit)
            .expect("every commit in a history has a recorded write")
    }

    fn push(&mut self, kind: EventKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(EventNode { kind, next: None });
        id
    }

    /// Head a new thread's chain. Must be called in thread-id order.
    pub fn push_start(&mut self, tid: ThreadId) -> NodeId {
        let id = self.push(EventKind::Start { tid });
        debug_assert_eq!(self.starts.len(), tid.0);
        self.starts.push(id);
        id
    }

    /// Append `kind` after the tail and advance the tail to it
    pub fn append(&mut self, tail: &mut NodeId, kind: EventKind) -> NodeId {
        let id = self.push(kind);
        self.nodes[tail.0].next = Some(id);
        *tail = id;
        id
    }

    /// Append a `Write` and register it in the commit map
    pub fn record_write(
        &mut self,
        tail: &mut NodeId,
        var: Name,
        value: i64,
        commit: CommitId,
    ) -> NodeId {
        let id = self.append(tail, EventKind::Write { var, value, commit });
        self.commit_writes.insert(commit, id);
        id
    }

    /// Append a `Read` back-linked to the registered source write
    pub fn record_read(
        &mut self,
        tail: &mut NodeId,
        var: Name,
        value: i64,
        commit: CommitId,
    ) -> NodeId {
        let source = self.write_node(commit);
        self.append(
            tail,
            EventKind::Read {
                var,
                value,
                commit,
                source,
            },
        )
    }

    /// Append a `Spawn` wired to the child's `Start`
    pub fn record_spawn(&mut self, tail: &mut NodeId, tid: ThreadId, spawned: NodeId) -> NodeId {
        self.append(tail, EventKind::Spawn { tid, spawned })
    }

    /// Append a `Join` wired to the joinee's tail, carrying the conflict if
    /// the pull raced
    pub fn record_join(
        &mut self,
        tail: &mut NodeId,
        tid: ThreadId,
        joinee: NodeId,
        conflict: Option<ConflictSources>,
    ) -> NodeId {
        self.append(
            tail,
            EventKind::Join {
                tid,
                joinee,
                conflict,
            },
        )
    }

    /// Append a `Lock` ordered after the previous unlock, carrying the
    /// conflict if the pull raced
    pub fn record_lock(
        &mut self,
        tail: &mut NodeId,
        var: Name,
        after: Option<NodeId>,
        conflict: Option<ConflictSources>,
    ) -> NodeId {
        self.append(
            tail,
            EventKind::Lock {
                var,
                after,
                conflict,
            },
        )
    }

    /// Append an `Unlock`
    pub fn record_unlock(&mut self, tail: &mut NodeId, var: Name) -> NodeId {
        self.append(tail, EventKind::Unlock { var })
    }

    /// Park a placeholder for the next statement without advancing the tail
    pub fn record_pending(&mut self, tail: NodeId, label: String) {
        let id = self.push(EventKind::Pending { label });
        self.nodes[tail.0].next = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn append_links_and_advances_tail() {
        let mut graph = ExecutionGraph::new();
        let start = graph.push_start(ThreadId(0));
        let mut tail = start;
        let write = graph.record_write(&mut tail, Arc::from("x"), 1, CommitId(0));
        assert_eq!(tail, write);
        assert_eq!(graph.node(start).next, Some(write));
    }

    #[test]
    fn read_links_to_registered_write() {
        let mut graph = ExecutionGraph::new();
        let start = graph.push_start(ThreadId(0));
        let mut tail = start;
        let write = graph.record_write(&mut tail, Arc::from("x"), 1, CommitId(0));
        let read = graph.record_read(&mut tail, Arc::from("x"), 1, CommitId(0));
        match &graph.node(read).kind {
            EventKind::Read { source, .. } => assert_eq!(*source, write),
            other => panic!("expected read, got {:?}", other),
        }
    }

    #[test]
    fn pending_does_not_advance_and_is_overwritten() {
        let mut graph = ExecutionGraph::new();
        let start = graph.push_start(ThreadId(0));
        let mut tail = start;
        graph.record_pending(tail, "lock m".to_string());
        let pending = graph.node(start).next.expect("pending linked");
        assert!(matches!(
            graph.node(pending).kind,
            EventKind::Pending { .. }
        ));
        assert_eq!(tail, start);

        let write = graph.record_write(&mut tail, Arc::from("x"), 1, CommitId(0));
        assert_eq!(graph.node(start).next, Some(write));
    }

    #[test]
    fn sync_recorders_wire_cross_thread_references() {
        let mut graph = ExecutionGraph::new();
        let start0 = graph.push_start(ThreadId(0));
        let mut tail0 = start0;

        let start1 = graph.push_start(ThreadId(1));
        let mut tail1 = start1;

        let spawn = graph.record_spawn(&mut tail0, ThreadId(1), start1);
        match &graph.node(spawn).kind {
            EventKind::Spawn { tid, spawned } => {
                assert_eq!(*tid, ThreadId(1));
                assert_eq!(*spawned, start1);
            }
            other => panic!("expected spawn, got {:?}", other),
        }

        let lock = graph.record_lock(&mut tail1, Arc::from("m"), None, None);
        let unlock = graph.record_unlock(&mut tail1, Arc::from("m"));
        assert_eq!(graph.node(lock).next, Some(unlock));

        let join = graph.record_join(&mut tail0, ThreadId(1), tail1, None);
        match &graph.node(join).kind {
            EventKind::Join { joinee, .. } => assert_eq!(*joinee, unlock),
            other => panic!("expected join, got {:?}", other),
        }
        assert_eq!(tail0, join);
    }

    #[test]
    fn starts_are_indexed_by_thread_id() {
        let mut graph = ExecutionGraph::new();
        let s0 = graph.push_start(ThreadId(0));
        let s1 = graph.push_start(ThreadId(1));
        assert_eq!(graph.start_of(ThreadId(0)), s0);
        assert_eq!(graph.start_of(ThreadId(1)), s1);
    }
}
