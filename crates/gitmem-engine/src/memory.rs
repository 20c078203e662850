//! The versioned-memory algebra
//!
//! A global variable is not stored in one memory location. Every
//! synchronising object (thread or lock) holds its own [`Global`]: the value
//! it last saw, an optional pending commit for a write that has not reached
//! a sync point yet, and the linearised history of committed writes visible
//! in this view. Histories act as per-variable vector clocks: a view may
//! adopt another view's variable iff its own history is a prefix of the
//! other's. Divergence is a data race.

use gitmem_core::Name;
use im::OrdMap;
use smallvec::SmallVec;
use std::fmt;
use tracing::debug;

/// Identifier of a committed or pending write, drawn from the engine-wide
/// counter. No two writes share one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(pub u64);

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The linearised ancestry of committed writes visible in a view
pub type CommitHistory = SmallVec<[CommitId; 8]>;

/// One view's version of a global variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Current payload
    pub value: i64,
    /// Write since the last sync point, not yet in `history`
    pub pending: Option<CommitId>,
    /// Committed writes, oldest first
    pub history: CommitHistory,
}

impl Global {
    /// The commit a read of this view observes: the pending write if there is
    /// one, the latest committed write otherwise.
    pub fn read_commit(&self) -> Option<CommitId> {
        self.pending.or_else(|| self.history.last().copied())
    }
}

/// A view's mapping from variable name to versioned global
pub type Globals = OrdMap<Name, Global>;

/// A history divergence found by [`pull`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The variable whose histories diverge
    pub var: Name,
    /// The first differing commit pair (source side, destination side)
    pub commits: (CommitId, CommitId),
}

/// Promote every pending write in the view into its variable's history.
///
/// Invoked at every outgoing sync point. Idempotent on views without pending
/// commits; values are untouched.
pub fn commit(globals: &mut Globals) {
    let vars: Vec<Name> = globals.keys().cloned().collect();
    for var in vars {
        let global = globals.get_mut(&var).expect("key from globals.keys()");
        if let Some(id) = global.pending.take() {
            global.history.push(id);
            debug!("Committed global '{}' with id {}", var, id);
        }
    }
}

/// Two histories are compatible iff one is a prefix of the other. Returns
/// the first differing commit pair as the conflict witness, or `None` when
/// one history fast-forwards the other.
pub fn conflict(h1: &CommitHistory, h2: &CommitHistory) -> Option<(CommitId, CommitId)> {
    h1.iter()
        .zip(h2.iter())
        .find(|(a, b)| a != b)
        .map(|(a, b)| (*a, *b))
}

/// Merge `src` into `dst`, variable by variable.
///
/// Unknown variables are copied; known variables fast-forward when `src`
/// holds a strictly longer compatible history, and are left alone otherwise.
/// The first divergence aborts the merge and is returned; `dst` keeps its
/// version of that variable and the caller turns the conflict into a
/// data-race termination.
pub fn pull(dst: &mut Globals, src: &Globals) -> Option<Conflict> {
    for (var, src_global) in src.iter() {
        match dst.get_mut(var) {
            Some(dst_global) => {
                if let Some(commits) = conflict(&src_global.history, &dst_global.history) {
                    debug!(
                        "A data race on '{}' was detected from commits {} and {}",
                        var, commits.0, commits.1
                    );
                    return Some(Conflict {
                        var: var.clone(),
                        commits,
                    });
                } else if src_global.history.len() > dst_global.history.len() {
                    debug!("Fast-forward '{}' to {}", var, src_global.value);
                    dst_global.value = src_global.value;
                    dst_global.history = src_global.history.clone();
                }
            }
            None => {
                dst.insert(
                    var.clone(),
                    Global {
                        value: src_global.value,
                        pending: None,
                        history: src_global.history.clone(),
                    },
                );
            }
        }
    }
    None
}
