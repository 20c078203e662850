//! Thread driver and the concrete round-robin scheduler
//!
//! A thread runs until its next sync point: `run_thread_to_sync` executes
//! statements one by one and stops *before* a syncing statement unless that
//! statement opens the slice. The round scheduler sweeps every thread in id
//! order until all of them terminated or no thread can move (deadlock).

use crate::graph::EventKind;
use crate::state::{GlobalContext, Termination, ThreadId};
use crate::step::{is_syncing, run_statement, StepOutcome};
use tracing::debug;

/// Outcome of one scheduling slice of one thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOutcome {
    /// At least one statement ran
    Progress,
    /// Nothing could run
    NoProgress,
    /// The thread stopped during this slice (or had stopped before)
    Terminated(Termination),
}

/// Outcome of one scheduler round over all threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every thread has terminated, normally or not
    AllTerminated,
    /// Some thread moved; run another round
    Progress,
    /// No thread moved: the system is stuck
    NoProgress,
}

/// Whether a live thread is parked directly at a syncing statement
fn parked_at_sync(gctx: &GlobalContext, tid: ThreadId) -> bool {
    let thread = gctx.thread(tid);
    thread.terminated.is_none()
        && thread.pc < thread.block.len()
        && is_syncing(&thread.block.stmts[thread.pc].node)
}

/// Mark a thread terminated and close its event chain
fn terminate(gctx: &mut GlobalContext, tid: ThreadId, status: Termination) {
    let thread = &mut gctx.threads[tid.0];
    thread.terminated = Some(status);
    gctx.graph.append(&mut thread.view.tail, EventKind::End);
}

/// Park a `Pending` placeholder for the statement the thread would run next
fn record_pending(gctx: &mut GlobalContext, tid: ThreadId) {
    let thread = &gctx.threads[tid.0];
    if thread.pc < thread.block.len() {
        let label = thread.block.stmts[thread.pc].node.to_string();
        let tail = thread.view.tail;
        gctx.graph.record_pending(tail, label);
    }
}

/// Run one thread from its current pc to its next sync point, the end of its
/// block, or a no-progress condition.
pub fn run_thread_to_sync(gctx: &mut GlobalContext, tid: ThreadId) -> SliceOutcome {
    if let Some(status) = gctx.thread(tid).terminated {
        return SliceOutcome::Terminated(status);
    }

    let block = gctx.thread(tid).block.clone();
    let mut first_statement = true;
    while gctx.thread(tid).pc < block.len() {
        let pc = gctx.thread(tid).pc;
        let stmt = &block.stmts[pc];

        // Suspend before a sync statement that does not open the slice
        if !first_statement && is_syncing(&stmt.node) {
            record_pending(gctx, tid);
            return SliceOutcome::Progress;
        }

        match run_statement(gctx, tid, pc, stmt) {
            StepOutcome::Terminated(status) => {
                terminate(gctx, tid, status);
                return SliceOutcome::Terminated(status);
            }
            StepOutcome::Blocked => {
                record_pending(gctx, tid);
                return if first_statement {
                    SliceOutcome::NoProgress
                } else {
                    SliceOutcome::Progress
                };
            }
            StepOutcome::Advance(delta) => {
                gctx.threads[tid.0].pc += delta;
                first_statement = false;
            }
        }
    }

    terminate(gctx, tid, Termination::Completed);
    SliceOutcome::Terminated(Termination::Completed)
}

/// Run a thread to its next sync point, then advance every thread it spawned
/// (recursively) to *their* first sync points, so a burst of spawns all park
/// in one scheduler turn. Progress is accumulated across the burst.
pub fn progress_thread(gctx: &mut GlobalContext, tid: ThreadId) -> SliceOutcome {
    let threads_before = gctx.threads.len();
    let outcome = run_thread_to_sync(gctx, tid);

    let mut any_progress = outcome == SliceOutcome::Progress;
    let mut child = threads_before;
    while child < gctx.threads.len() {
        any_progress = true;
        if !parked_at_sync(gctx, ThreadId(child)) {
            debug!("==== Thread {} (spawn) ====", child);
            progress_thread(gctx, ThreadId(child));
        }
        child += 1;
    }

    match outcome {
        SliceOutcome::Terminated(_) => outcome,
        _ if any_progress => SliceOutcome::Progress,
        _ => SliceOutcome::NoProgress,
    }
}

/// One round of the concrete scheduler: every thread in id order gets a
/// slice. Threads spawned mid-round are appended and get theirs before the
/// round ends.
pub fn run_threads_to_sync(gctx: &mut GlobalContext) -> RoundOutcome {
    debug!("-----------------------");
    let mut all_terminated = true;
    let mut any_progress = false;
    let mut i = 0;
    while i < gctx.threads.len() {
        debug!("==== t{} ====", i);
        if gctx.threads[i].terminated.is_none() {
            match run_thread_to_sync(gctx, ThreadId(i)) {
                SliceOutcome::Progress | SliceOutcome::Terminated(_) => any_progress = true,
                SliceOutcome::NoProgress => {}
            }
            all_terminated &= gctx.threads[i].terminated.is_some();
        }
        i += 1;
    }

    if all_terminated {
        RoundOutcome::AllTerminated
    } else if any_progress {
        RoundOutcome::Progress
    } else {
        RoundOutcome::NoProgress
    }
}

/// Drive rounds until global termination or deadlock, then classify every
/// thread. Returns the process exit code: 0 iff all threads completed.
pub fn run_threads(gctx: &mut GlobalContext) -> i32 {
    loop {
        match run_threads_to_sync(gctx) {
            RoundOutcome::Progress => {}
            RoundOutcome::AllTerminated | RoundOutcome::NoProgress => break,
        }
    }

    debug!("----------- execution complete -----------");

    let mut exception_detected = false;
    for i in 0..gctx.threads.len() {
        match gctx.threads[i].terminated {
            Some(Termination::Completed) => debug!("Thread {} terminated normally", i),
            Some(Termination::UnlockNotHeld) => {
                debug!("Thread {} unlocked a lock it does not own", i);
                exception_detected = true;
            }
            Some(Termination::DataRace) => {
                debug!("Thread {} encountered a data-race", i);
                exception_detected = true;
            }
            Some(Termination::AssertionFailure) => {
                debug!("Thread {} failed an assertion", i);
                exception_detected = true;
            }
            Some(Termination::UnassignedRead) => {
                debug!("Thread {} read an uninitialised value", i);
                exception_detected = true;
            }
            None => {
                exception_detected = true;
                // Close the stuck thread's chain so the graph is well-formed
                let thread = &mut gctx.threads[i];
                gctx.graph.append(&mut thread.view.tail, EventKind::End);
                debug!("Thread {} is stuck", i);
            }
        }
    }

    i32::from(exception_detected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(src: &str) -> GlobalContext {
        GlobalContext::new(gitmem_core::compile(src).expect("compile failed"))
    }

    #[test]
    fn straight_line_thread_completes() {
        let mut gctx = context("$r = 1; x = $r; assert x == 1;");
        assert_eq!(
            run_thread_to_sync(&mut gctx, ThreadId(0)),
            SliceOutcome::Terminated(Termination::Completed)
        );
        assert_eq!(run_threads(&mut gctx), 0);
    }

    #[test]
    fn slice_stops_before_sync_statement() {
        let mut gctx = context("x = 1; lock m; unlock m;");
        assert_eq!(
            run_thread_to_sync(&mut gctx, ThreadId(0)),
            SliceOutcome::Progress
        );
        // Stopped before the lock, which has not run yet
        assert_eq!(gctx.threads[0].pc, 1);
        assert!(gctx.locks.get("m").is_none());
    }

    #[test]
    fn sync_statement_opening_a_slice_runs() {
        let mut gctx = context("lock m; x = 1; unlock m;");
        assert_eq!(
            run_thread_to_sync(&mut gctx, ThreadId(0)),
            SliceOutcome::Progress
        );
        // The lock ran because it was first; the slice stopped at the unlock
        assert_eq!(gctx.threads[0].pc, 2);
        assert_eq!(gctx.locks.get("m").unwrap().owner, Some(ThreadId(0)));
    }

    #[test]
    fn spawn_burst_parks_children_at_their_first_sync() {
        let mut gctx = context("$t = spawn { x = 1; lock m; unlock m; }; join $t;");
        assert_eq!(progress_thread(&mut gctx, ThreadId(0)), SliceOutcome::Progress);
        assert_eq!(gctx.threads.len(), 2);
        // The child advanced to its lock without executing it
        assert_eq!(gctx.threads[1].pc, 1);
        assert!(gctx.locks.get("m").is_none());
    }

    #[test]
    fn deadlock_is_detected_as_no_progress() {
        let mut gctx = context("lock m; lock m;");
        // First round takes the lock and stops before the second lock
        assert_eq!(run_threads_to_sync(&mut gctx), RoundOutcome::Progress);
        // Second round cannot move
        assert_eq!(run_threads_to_sync(&mut gctx), RoundOutcome::NoProgress);
        assert_eq!(run_threads(&mut gctx), 1);
        assert_eq!(gctx.threads[0].terminated, None);
    }

    #[test]
    fn racing_writes_terminate_the_joiner() {
        let mut gctx = context("$t = spawn { x = 1; }; x = 2; join $t;");
        assert_eq!(run_threads(&mut gctx), 1);
        assert_eq!(gctx.threads[0].terminated, Some(Termination::DataRace));
        assert_eq!(gctx.threads[1].terminated, Some(Termination::Completed));
    }

    #[test]
    fn join_pulls_joinee_values() {
        let mut gctx = context("$t = spawn { x = 1; }; join $t; assert x == 1;");
        assert_eq!(run_threads(&mut gctx), 0);
        assert_eq!(
            gctx.threads[0].view.globals.get("x").unwrap().value,
            1
        );
    }

    #[test]
    fn join_on_errored_thread_waits() {
        // The child fails its assertion; the joiner never proceeds and the
        // driver classifies the run as stuck
        let mut gctx = context("$t = spawn { assert 1 == 2; }; join $t;");
        assert_eq!(run_threads(&mut gctx), 1);
        assert_eq!(
            gctx.threads[1].terminated,
            Some(Termination::AssertionFailure)
        );
        assert_eq!(gctx.threads[0].terminated, None);
    }

    #[test]
    fn uninitialised_global_read_exits_nonzero() {
        let mut gctx = context("assert y == 0;");
        assert_eq!(run_threads(&mut gctx), 1);
        assert_eq!(
            gctx.threads[0].terminated,
            Some(Termination::UnassignedRead)
        );
    }

    #[test]
    fn lock_mediated_writes_do_not_race() {
        let mut gctx = context(
            "$t = spawn { lock m; x = 1; unlock m; }; lock m; x = 2; unlock m; join $t;",
        );
        assert_eq!(run_threads(&mut gctx), 0);
        let x = gctx.threads[0].view.globals.get("x").unwrap();
        assert!(x.value == 1 || x.value == 2);
    }

    #[test]
    fn thread_ids_equal_indices() {
        let mut gctx = context(
            "$a = spawn { nop; }; $b = spawn { nop; }; join $a; join $b;",
        );
        run_threads(&mut gctx);
        assert_eq!(gctx.threads.len(), 3);
        for (i, thread) in gctx.threads.iter().enumerate() {
            assert_eq!(thread.terminated, Some(Termination::Completed), "thread {}", i);
        }
    }

    #[test]
    fn histories_stay_duplicate_free_after_syncs() {
        let mut gctx = context(
            "x = 1; $t = spawn { lock m; x = 2; unlock m; }; lock m; unlock m; join $t; \
             lock m; unlock m;",
        );
        run_threads(&mut gctx);
        for thread in &gctx.threads {
            for (_, global) in thread.view.globals.iter() {
                let mut seen = std::collections::HashSet::new();
                for commit in &global.history {
                    assert!(seen.insert(*commit), "duplicate commit in history");
                }
            }
        }
    }

    #[test]
    fn synced_views_have_prefix_comparable_histories() {
        let mut gctx = context("$t = spawn { x = 1; }; join $t; x = 3; nop;");
        run_threads(&mut gctx);
        let a = &gctx.threads[0].view.globals.get("x").unwrap().history;
        let b = &gctx.threads[1].view.globals.get("x").unwrap().history;
        assert!(crate::memory::conflict(a, b).is_none());
    }
}
