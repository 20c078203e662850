//! Interactive driver
//!
//! Lets the user pick which thread to schedule next. After every step the
//! views of all non-completed threads and the lock table are printed. To
//! keep the loop predictable, an uninitialised read or an unlock of an
//! unheld lock is fatal here; every other termination becomes a message and
//! the session continues.

use crate::render::write_graph;
use crate::sched::{progress_thread, run_threads, SliceOutcome};
use crate::state::{GlobalContext, Lock, Termination, Thread, ThreadId};
use gitmem_core::{Block, Stmt};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Fatal interactive-session errors
#[derive(Debug, Error)]
pub enum DebugError {
    /// An uninitialised read surfaces as a runtime error in this driver
    #[error("Thread {0} read an uninitialised variable")]
    UninitRead(ThreadId),
    /// Unlocking an unheld lock surfaces as a runtime error in this driver
    #[error("Thread {0} unlocked a lock it does not own")]
    UnlockNotHeld(ThreadId),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A command read from the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run one thread to its next sync point
    Step(usize),
    /// Finish the rest of the program
    Finish,
    /// Start the program from the beginning
    Restart,
    /// List all threads, completed ones included
    List,
    /// Print the execution graph now
    Print,
    /// Toggle automatic graph printing
    Graph,
    /// Quit the interpreter
    Quit,
    /// Show the command summary
    Info,
    /// Do nothing (used for invalid input)
    Skip,
}

/// Parse a single command line. See the `?` help for the surface.
pub fn parse_command(input: &str) -> Result<Command, String> {
    let command = input.trim();
    if command.is_empty() {
        return Ok(Command::Skip);
    }

    if command.chars().all(|c| c.is_ascii_digit()) {
        // Bare numbers step the named thread
        return command
            .parse()
            .map(Command::Step)
            .map_err(|_| "Expected thread id".to_string());
    }

    let mut chars = command.chars();
    if chars.next() == Some('s') && !chars.next().is_some_and(|c| c.is_alphabetic()) {
        let arg = command[1..].trim();
        if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_digit()) {
            return arg
                .parse()
                .map(Command::Step)
                .map_err(|_| "Expected thread id".to_string());
        }
        return Err("Expected thread id".to_string());
    }

    match command {
        "q" => Ok(Command::Quit),
        "r" => Ok(Command::Restart),
        "f" => Ok(Command::Finish),
        "l" => Ok(Command::List),
        "g" => Ok(Command::Graph),
        "p" => Ok(Command::Print),
        "?" => Ok(Command::Info),
        _ => Err(format!("Unknown command: {}", command)),
    }
}

fn show_global(
    out: &mut impl Write,
    var: &str,
    global: &crate::memory::Global,
) -> std::io::Result<()> {
    write!(out, "{} = {} [", var, global.value)?;
    match global.pending {
        Some(commit) => write!(out, "{}", commit)?,
        None => write!(out, "_")?,
    }
    write!(out, "; ")?;
    for (i, commit) in global.history.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        write!(out, "{}", commit)?;
    }
    writeln!(out, "]")
}

/// Print a thread's registers, globals and position in its block
fn show_thread(out: &mut impl Write, thread: &Thread, tid: usize) -> std::io::Result<()> {
    writeln!(out, "---- Thread {}", tid)?;
    if !thread.view.registers.is_empty() {
        for (reg, value) in thread.view.registers.iter() {
            writeln!(out, "${} = {}", reg, value)?;
        }
        writeln!(out, "--")?;
    }

    if !thread.view.globals.is_empty() {
        for (var, global) in thread.view.globals.iter() {
            show_global(out, var, global)?;
        }
        writeln!(out, "--")?;
    }

    for (idx, stmt) in thread.block.stmts.iter().enumerate() {
        let cursor = if idx == thread.pc { "-> " } else { "   " };
        writeln!(out, "{}{};", cursor, stmt.node)?;
    }
    if thread.pc == thread.block.len() {
        writeln!(out, "-> ")?;
    }
    Ok(())
}

fn show_lock(out: &mut impl Write, name: &str, lock: &Lock) -> std::io::Result<()> {
    write!(out, "{}: ", name)?;
    match lock.owner {
        Some(owner) => writeln!(out, "held by thread {}", owner)?,
        None => writeln!(out, "<free>")?,
    }
    for (var, global) in lock.globals.iter() {
        show_global(out, var, global)?;
    }
    Ok(())
}

/// Print the locks and all threads that are still interesting. With
/// `show_all`, completed threads are printed too.
fn show_global_context(
    out: &mut impl Write,
    gctx: &GlobalContext,
    show_all: bool,
) -> std::io::Result<()> {
    let mut showed_any = false;
    for (tid, thread) in gctx.threads.iter().enumerate() {
        if show_all || thread.terminated != Some(Termination::Completed) {
            show_thread(out, thread, tid)?;
            writeln!(out)?;
            showed_any = true;
        }
    }

    if showed_any && !gctx.locks.is_empty() {
        writeln!(out, "---- Locks")?;
        for (name, lock) in gctx.locks.iter() {
            show_lock(out, name, lock)?;
        }
        writeln!(out, "--")?;
    }
    Ok(())
}

/// Step one thread. The message explains what happened; the return value
/// says whether the state should be printed afterwards.
fn step_thread(
    gctx: &mut GlobalContext,
    tid: usize,
    msg: &mut String,
) -> Result<bool, DebugError> {
    if tid >= gctx.threads.len() {
        *msg = format!("Invalid thread id: {}", tid);
        return Ok(false);
    }

    if let Some(status) = gctx.threads[tid].terminated {
        *msg = if status == Termination::Completed {
            format!("Thread {} has terminated normally", tid)
        } else {
            format!("Thread {} has terminated with an error", tid)
        };
        return Ok(false);
    }

    match progress_thread(gctx, ThreadId(tid)) {
        SliceOutcome::Progress => Ok(true),
        SliceOutcome::NoProgress => {
            let thread = &gctx.threads[tid];
            *msg = format!(
                "Thread {} is blocking on '{}'",
                tid, thread.block.stmts[thread.pc].node
            );
            Ok(false)
        }
        SliceOutcome::Terminated(Termination::Completed) => {
            *msg = format!("Thread {} terminated normally", tid);
            Ok(true)
        }
        SliceOutcome::Terminated(Termination::DataRace) => {
            *msg = format!("Thread {} encountered a data race and was terminated", tid);
            Ok(false)
        }
        SliceOutcome::Terminated(Termination::AssertionFailure) => {
            let thread = &gctx.threads[tid];
            let cond = match &thread.block.stmts[thread.pc].node {
                Stmt::Assert(expr) => expr.node.to_string(),
                other => other.to_string(),
            };
            *msg = format!(
                "Thread {} failed assertion '{}' and was terminated",
                tid, cond
            );
            Ok(false)
        }
        SliceOutcome::Terminated(Termination::UnassignedRead) => {
            Err(DebugError::UninitRead(ThreadId(tid)))
        }
        SliceOutcome::Terminated(Termination::UnlockNotHeld) => {
            Err(DebugError::UnlockNotHeld(ThreadId(tid)))
        }
    }
}

/// Interpret the program interactively, letting the user choose which thread
/// to schedule next.
pub fn interpret_interactive(
    block: &Arc<Block>,
    output_path: &Path,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<i32, DebugError> {
    let mut gctx = GlobalContext::new(block.clone());

    let mut prev_thread_count = 1;
    let mut command = Command::List;
    let mut msg = String::new();
    let mut print_graphs = true;
    write_graph(&gctx.graph, output_path)?;

    loop {
        if command != Command::Skip || prev_thread_count != gctx.threads.len() {
            show_global_context(out, &gctx, command == Command::List)?;
        }
        prev_thread_count = gctx.threads.len();

        if !msg.is_empty() {
            writeln!(out, "{}", msg)?;
            msg.clear();
        }

        write!(out, "> ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            // End of input quits the session
            break;
        }
        if !line.trim().is_empty() {
            command = match parse_command(&line) {
                Ok(cmd) => cmd,
                Err(error) => {
                    writeln!(out, "{}", error)?;
                    Command::Skip
                }
            };
        }

        match command {
            Command::Step(tid) => {
                if !step_thread(&mut gctx, tid, &mut msg)? {
                    command = Command::Skip;
                }
                if print_graphs {
                    write_graph(&gctx.graph, output_path)?;
                    debug!("Execution graph written to {}", output_path.display());
                }
            }
            Command::Finish => {
                msg = if run_threads(&mut gctx) == 0 {
                    "Program finished successfully".to_string()
                } else {
                    "Program terminated with an error".to_string()
                };
                if print_graphs {
                    write_graph(&gctx.graph, output_path)?;
                    debug!("Execution graph written to {}", output_path.display());
                }
            }
            Command::Restart => {
                gctx = GlobalContext::new(block.clone());
                command = Command::List;
                if print_graphs {
                    write_graph(&gctx.graph, output_path)?;
                    debug!("Execution graph written to {}", output_path.display());
                }
            }
            Command::Graph => {
                print_graphs = !print_graphs;
                writeln!(
                    out,
                    "graphs {} print automatically",
                    if print_graphs { "will" } else { "won't" }
                )?;
                command = Command::Skip;
            }
            Command::Print => {
                write_graph(&gctx.graph, output_path)?;
                debug!("Execution graph written to {}", output_path.display());
                command = Command::Skip;
            }
            Command::Info => {
                writeln!(out, "Commands:")?;
                writeln!(out, "s [tid] - Step to next sync point in thread")?;
                writeln!(out, "[tid] - Step to next sync point in thread")?;
                writeln!(out, "f - Finish the program")?;
                writeln!(out, "r - Restart the program")?;
                writeln!(out, "l - List all threads")?;
                writeln!(out, "g - Toggle printing the execution graph at sync points")?;
                writeln!(out, "p - Print the execution graph at the current sync point")?;
                writeln!(out, "q - Quit the interpreter")?;
                writeln!(out, "? - Display this help message")?;
                command = Command::Skip;
            }
            Command::Quit => break,
            Command::List | Command::Skip => {}
        }
    }

    Ok(0)
}
