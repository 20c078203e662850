//! The statement stepper
//!
//! Runs exactly one statement of one thread and reports how the program
//! counter moves. The outcome is deliberately three-valued (advance, blocked,
//! terminated): a blocked statement is a transient condition of the
//! scheduler, not a property of the thread, and conflating the two loses
//! completions.

use crate::eval::evaluate;
use crate::graph::EventKind;
use crate::memory::{commit, pull, Global};
use crate::state::{GlobalContext, Lock, Termination, ThreadId};
use gitmem_core::{LVal, Name, Spanned, Stmt};
use tracing::debug;

/// Outcome of running one statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Advance the pc by this many statements (1 for straight-line code)
    Advance(usize),
    /// The statement cannot run now; the thread waits
    Blocked,
    /// The thread stopped with this status
    Terminated(Termination),
}

/// Whether a statement is a sync point (also a commit and pull point)
pub fn is_syncing(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Join(_) | Stmt::Lock(_) | Stmt::Unlock(_))
}

/// Run the statement at `pc` of thread `tid`
pub fn run_statement(
    gctx: &mut GlobalContext,
    tid: ThreadId,
    pc: usize,
    stmt: &Spanned<Stmt>,
) -> StepOutcome {
    match &stmt.node {
        Stmt::Nop => {
            debug!("Nop");
            StepOutcome::Advance(1)
        }
        Stmt::Jump(delta) => StepOutcome::Advance(*delta),
        Stmt::Cond { cond, delta } => match evaluate(gctx, tid, cond) {
            Ok(value) => StepOutcome::Advance(if value != 0 { 1 } else { *delta }),
            Err(term) => StepOutcome::Terminated(term),
        },
        Stmt::Assign { lval, expr } => {
            let value = match evaluate(gctx, tid, expr) {
                Ok(value) => value,
                Err(term) => return StepOutcome::Terminated(term),
            };
            match lval {
                LVal::Reg(name) => {
                    // Registers can be re-assigned whenever
                    debug!("Set register '${}' to {}", name, value);
                    gctx.threads[tid.0]
                        .view
                        .registers
                        .insert(name.clone(), value);
                }
                LVal::Var(name) => {
                    // Global writes draw a fresh commit id to version the
                    // history of updates
                    let commit_id = gctx.next_commit();
                    let thread = &mut gctx.threads[tid.0];
                    match thread.view.globals.get_mut(name) {
                        Some(global) => {
                            global.value = value;
                            global.pending = Some(commit_id);
                        }
                        None => {
                            thread.view.globals.insert(
                                name.clone(),
                                Global {
                                    value,
                                    pending: Some(commit_id),
                                    history: Default::default(),
                                },
                            );
                        }
                    }
                    debug!("Set global '{}' to {} with id {}", name, value, commit_id);
                    gctx.graph
                        .record_write(&mut thread.view.tail, name.clone(), value, commit_id);
                }
            }
            StepOutcome::Advance(1)
        }
        Stmt::Join(expr) => run_join(gctx, tid, pc, expr),
        Stmt::Lock(name) => run_lock(gctx, tid, name),
        Stmt::Unlock(name) => run_unlock(gctx, tid, name),
        Stmt::Assert(expr) => match evaluate(gctx, tid, expr) {
            Ok(value) if value != 0 => {
                debug!("Assertion passed: {}", expr.node);
                StepOutcome::Advance(1)
            }
            Ok(_) => {
                debug!("Assertion failed: {}", expr.node);
                let thread = &mut gctx.threads[tid.0];
                gctx.graph.append(
                    &mut thread.view.tail,
                    EventKind::AssertFailed {
                        cond: expr.node.to_string(),
                    },
                );
                StepOutcome::Terminated(Termination::AssertionFailure)
            }
            Err(term) => StepOutcome::Terminated(term),
        },
        Stmt::If { .. } => unreachable!("if statements are lowered before execution"),
    }
}

/// `join e`: wait for the target thread to complete, then pull its view.
///
/// The target expression is evaluated once per join site and memoised: it
/// can contain a spawn, and the blocked statement is re-entered on every
/// scheduler turn.
fn run_join(
    gctx: &mut GlobalContext,
    tid: ThreadId,
    pc: usize,
    expr: &Spanned<gitmem_core::Expr>,
) -> StepOutcome {
    let target = match gctx.join_cache.get(&(tid.0, pc)) {
        Some(&target) => target,
        None => match evaluate(gctx, tid, expr) {
            Ok(value) => {
                gctx.join_cache.insert((tid.0, pc), value);
                value
            }
            Err(term) => return StepOutcome::Terminated(term),
        },
    };

    // A join on a thread that never existed waits forever; the scheduler
    // reports it as deadlock
    if target < 0 || target as usize >= gctx.threads.len() {
        debug!("Waiting on thread {} (does not exist)", target);
        return StepOutcome::Blocked;
    }
    let joinee = ThreadId(target as usize);

    // An errored joinee is never joined: the joiner keeps waiting
    if gctx.threads[joinee.0].terminated != Some(Termination::Completed) {
        debug!("Waiting on thread {}", joinee);
        return StepOutcome::Blocked;
    }

    // Both sides commit, then the joiner pulls the joinee's view
    commit(&mut gctx.threads[tid.0].view.globals);
    commit(&mut gctx.threads[joinee.0].view.globals);
    debug!("Pulling from thread {}", joinee);

    let src = gctx.threads[joinee.0].view.globals.clone();
    let joinee_tail = gctx.threads[joinee.0].view.tail;
    let conflict = pull(&mut gctx.threads[tid.0].view.globals, &src);

    let conflict_sources = conflict.map(|c| crate::graph::ConflictSources {
        var: c.var,
        sources: (
            gctx.graph.write_node(c.commits.0),
            gctx.graph.write_node(c.commits.1),
        ),
    });
    let raced = conflict_sources.is_some();

    let thread = &mut gctx.threads[tid.0];
    gctx.graph
        .record_join(&mut thread.view.tail, joinee, joinee_tail, conflict_sources);

    if raced {
        StepOutcome::Terminated(Termination::DataRace)
    } else {
        StepOutcome::Advance(1)
    }
}

/// `lock v`: wait until the lock is free, take it, and pull the view the
/// last unlocker published. An unknown lock name creates a free lock with an
/// empty view.
fn run_lock(gctx: &mut GlobalContext, tid: ThreadId, name: &Name) -> StepOutcome {
    let (src, after) = match gctx.locks.get_mut(name) {
        Some(lock) => {
            if let Some(owner) = lock.owner {
                debug!("Waiting for lock {} owned by {}", name, owner);
                return StepOutcome::Blocked;
            }
            lock.owner = Some(tid);
            (lock.globals.clone(), lock.last_unlock)
        }
        None => {
            gctx.locks.insert(
                name.clone(),
                Lock {
                    owner: Some(tid),
                    ..Lock::default()
                },
            );
            (Default::default(), None)
        }
    };

    commit(&mut gctx.threads[tid.0].view.globals);
    let conflict = pull(&mut gctx.threads[tid.0].view.globals, &src);

    let conflict_sources = conflict.map(|c| crate::graph::ConflictSources {
        var: c.var,
        sources: (
            gctx.graph.write_node(c.commits.0),
            gctx.graph.write_node(c.commits.1),
        ),
    });
    let raced = conflict_sources.is_some();

    let thread = &mut gctx.threads[tid.0];
    gctx.graph
        .record_lock(&mut thread.view.tail, name.clone(), after, conflict_sources);

    if raced {
        StepOutcome::Terminated(Termination::DataRace)
    } else {
        debug!("Locked {}", name);
        StepOutcome::Advance(1)
    }
}

/// `unlock v`: publish the committed view into the lock and release it.
/// Unlocking a lock this thread does not hold terminates the thread.
fn run_unlock(gctx: &mut GlobalContext, tid: ThreadId, name: &Name) -> StepOutcome {
    commit(&mut gctx.threads[tid.0].view.globals);

    let mut lock = gctx.locks.remove(name).unwrap_or_default();
    if lock.owner != Some(tid) {
        gctx.locks.insert(name.clone(), lock);
        return StepOutcome::Terminated(Termination::UnlockNotHeld);
    }

    let thread = &mut gctx.threads[tid.0];
    let node = gctx
        .graph
        .record_unlock(&mut thread.view.tail, name.clone());

    lock.globals = thread.view.globals.clone();
    lock.owner = None;
    lock.last_unlock = Some(node);
    gctx.locks.insert(name.clone(), lock);

    debug!("Unlocked {}", name);
    StepOutcome::Advance(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    fn context(src: &str) -> GlobalContext {
        GlobalContext::new(gitmem_core::compile(src).expect("compile failed"))
    }

    fn step(gctx: &mut GlobalContext, tid: usize) -> StepOutcome {
        let block = gctx.threads[tid].block.clone();
        let pc = gctx.threads[tid].pc;
        let outcome = run_statement(gctx, ThreadId(tid), pc, &block.stmts[pc]);
        if let StepOutcome::Advance(delta) = outcome {
            gctx.threads[tid].pc += delta;
        }
        outcome
    }

    #[test]
    fn assign_to_global_creates_pending_commit() {
        let mut gctx = context("x = 4;");
        assert_eq!(step(&mut gctx, 0), StepOutcome::Advance(1));
        let x = gctx.threads[0].view.globals.get("x").unwrap();
        assert_eq!(x.value, 4);
        assert!(x.pending.is_some());
        assert!(x.history.is_empty());
    }

    #[test]
    fn second_write_replaces_pending_commit() {
        let mut gctx = context("x = 1; x = 2;");
        step(&mut gctx, 0);
        let first = gctx.threads[0].view.globals.get("x").unwrap().pending;
        step(&mut gctx, 0);
        let x = gctx.threads[0].view.globals.get("x").unwrap();
        assert_eq!(x.value, 2);
        assert_ne!(x.pending, first);
        assert!(x.history.is_empty());
    }

    #[test]
    fn lock_is_created_lazily_and_taken() {
        let mut gctx = context("lock m;");
        assert_eq!(step(&mut gctx, 0), StepOutcome::Advance(1));
        let lock = gctx.locks.get("m").unwrap();
        assert_eq!(lock.owner, Some(ThreadId(0)));
    }

    #[test]
    fn locking_a_held_lock_blocks() {
        let mut gctx = context("lock m; lock m;");
        step(&mut gctx, 0);
        assert_eq!(step(&mut gctx, 0), StepOutcome::Blocked);
    }

    #[test]
    fn unlock_of_unheld_lock_terminates() {
        let mut gctx = context("unlock m;");
        assert_eq!(
            step(&mut gctx, 0),
            StepOutcome::Terminated(Termination::UnlockNotHeld)
        );
        // The unknown lock was still created, matching lazy creation on lock
        assert!(gctx.locks.contains_key("m"));
    }

    #[test]
    fn lock_unlock_roundtrip_preserves_view_values(){
        let mut gctx = context("x = 3; lock m; unlock m;");
        step(&mut gctx, 0);
        step(&mut gctx, 0);
        step(&mut gctx, 0);
        let x = gctx.threads[0].view.globals.get("x").unwrap();
        assert_eq!(x.value, 3);
        assert_eq!(x.pending, None);
        assert_eq!(x.history.len(), 1);
        // The lock now holds the published view
        let lock = gctx.locks.get("m").unwrap();
        assert_eq!(lock.owner, None);
        assert_eq!(lock.globals.get("x").unwrap().value, 3);
    }

    #[test]
    fn assert_failure_terminates_thread() {
        let mut gctx = context("assert 1 == 2;");
        assert_eq!(
            step(&mut gctx, 0),
            StepOutcome::Terminated(Termination::AssertionFailure)
        );
    }

    #[test]
    fn join_on_missing_thread_blocks() {
        let mut gctx = context("join 7;");
        assert_eq!(step(&mut gctx, 0), StepOutcome::Blocked);
    }

    #[test]
    fn cond_selects_branch_delta() {
        let mut gctx = context("if (1 == 1) { x = 1; } else { x = 2; };");
        assert_eq!(step(&mut gctx, 0), StepOutcome::Advance(1));
        let mut gctx = context("if (1 == 2) { x = 1; } else { x = 2; };");
        assert_eq!(step(&mut gctx, 0), StepOutcome::Advance(3));
    }

    #[test]
    fn spawn_in_join_argument_runs_once() {
        let mut gctx = context("join spawn { nop; };");
        // First attempt: spawn runs, child is not terminated, join blocks
        assert_eq!(step(&mut gctx, 0), StepOutcome::Blocked);
        assert_eq!(gctx.threads.len(), 2);
        // Re-entry must not spawn again
        assert_eq!(step(&mut gctx, 0), StepOutcome::Blocked);
        assert_eq!(gctx.threads.len(), 2);
    }
}
