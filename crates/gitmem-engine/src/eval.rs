//! Expression evaluation against a thread's view
//!
//! Evaluation either produces an integer or the exceptional termination of
//! the evaluating thread. Reads and spawns have side effects: a global read
//! records a `Read` event sourced from the observed commit, and a spawn is a
//! sync point that commits the caller's view and appends a new thread.

use crate::memory::commit;
use crate::state::{GlobalContext, Termination, Thread, ThreadId};
use gitmem_core::{Expr, Spanned};
use tracing::debug;

/// Either the value of the expression or the evaluating thread's
/// exceptional termination
pub type EvalResult = Result<i64, Termination>;

/// Evaluate `expr` in the context of thread `tid`
pub fn evaluate(
    gctx: &mut GlobalContext,
    tid: ThreadId,
    expr: &Spanned<Expr>,
) -> EvalResult {
    match &expr.node {
        Expr::Reg(name) => {
            // It is invalid to read a previously unwritten register
            match gctx.thread(tid).view.registers.get(name) {
                Some(value) => Ok(*value),
                None => Err(Termination::UnassignedRead),
            }
        }
        Expr::Var(name) => {
            // It is invalid to read a previously unwritten global
            let (value, observed) = match gctx.thread(tid).view.globals.get(name) {
                Some(global) => (
                    global.value,
                    global
                        .read_commit()
                        .expect("a known global has a pending or committed write"),
                ),
                None => return Err(Termination::UnassignedRead),
            };
            let thread = &mut gctx.threads[tid.0];
            gctx.graph
                .record_read(&mut thread.view.tail, name.clone(), value, observed);
            Ok(value)
        }
        Expr::Const(value) => Ok(*value),
        Expr::Add(summands) => {
            let mut sum: i64 = 0;
            for summand in summands {
                sum = sum.wrapping_add(evaluate(gctx, tid, summand)?);
            }
            Ok(sum)
        }
        Expr::Eq(lhs, rhs) => {
            let l = evaluate(gctx, tid, lhs)?;
            let r = evaluate(gctx, tid, rhs)?;
            Ok((l == r) as i64)
        }
        Expr::Neq(lhs, rhs) => {
            let l = evaluate(gctx, tid, lhs)?;
            let r = evaluate(gctx, tid, rhs)?;
            Ok((l != r) as i64)
        }
        Expr::Spawn(block) => {
            // Spawning is a sync point: commit pending writes, then hand the
            // child a snapshot of the committed globals
            commit(&mut gctx.threads[tid.0].view.globals);

            let child = ThreadId(gctx.threads.len());
            let start = gctx.graph.push_start(child);
            let globals = gctx.thread(tid).view.globals.clone();
            gctx.threads.push(Thread::new(block.clone(), globals, start));

            let thread = &mut gctx.threads[tid.0];
            gctx.graph
                .record_spawn(&mut thread.view.tail, child, start);
            debug!("Spawned thread {}", child);

            Ok(child.0 as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitmem_core::Span;
    use std::sync::Arc;

    fn context() -> GlobalContext {
        let block = Arc::new(gitmem_core::parse("nop;").expect("parse failed"));
        GlobalContext::new(block)
    }

    fn eval_src(gctx: &mut GlobalContext, src: &str) -> EvalResult {
        // Parse the expression as an assert condition or assignment rhs
        let block = gitmem_core::parse(&format!("probe = {};", src))
            .or_else(|_| gitmem_core::parse(&format!("assert {};", src)))
            .expect("parse failed");
        let expr = match &block.stmts[0].node {
            gitmem_core::Stmt::Assign { expr, .. } => expr.clone(),
            gitmem_core::Stmt::Assert(expr) => expr.clone(),
            other => panic!("unexpected statement {:?}", other),
        };
        evaluate(gctx, ThreadId(0), &expr)
    }

    #[test]
    fn constants_and_addition() {
        let mut gctx = context();
        assert_eq!(eval_src(&mut gctx, "1 + 2 + 3"), Ok(6));
    }

    #[test]
    fn equality_yields_one_or_zero() {
        let mut gctx = context();
        assert_eq!(eval_src(&mut gctx, "1 == 1"), Ok(1));
        assert_eq!(eval_src(&mut gctx, "1 == 2"), Ok(0));
        assert_eq!(eval_src(&mut gctx, "1 != 2"), Ok(1));
        assert_eq!(eval_src(&mut gctx, "2 != 2"), Ok(0));
    }

    #[test]
    fn unassigned_register_read_terminates() {
        let mut gctx = context();
        let expr = Spanned::new(Expr::Reg(Arc::from("r")), Span::dummy());
        assert_eq!(
            evaluate(&mut gctx, ThreadId(0), &expr),
            Err(Termination::UnassignedRead)
        );
    }

    #[test]
    fn unassigned_global_read_terminates() {
        let mut gctx = context();
        let expr = Spanned::new(Expr::Var(Arc::from("x")), Span::dummy());
        assert_eq!(
            evaluate(&mut gctx, ThreadId(0), &expr),
            Err(Termination::UnassignedRead)
        );
    }

    #[test]
    fn comparison_short_circuits_on_failing_operand() {
        let mut gctx = context();
        assert_eq!(eval_src(&mut gctx, "$nope == 1"), Err(Termination::UnassignedRead));
    }

    #[test]
    fn spawn_appends_thread_with_snapshot() {
        let mut gctx = context();
        let body = Arc::new(gitmem_core::parse("nop;").expect("parse failed"));
        let expr = Spanned::new(Expr::Spawn(body), Span::dummy());
        let tid = evaluate(&mut gctx, ThreadId(0), &expr).expect("spawn failed");
        assert_eq!(tid, 1);
        assert_eq!(gctx.threads.len(), 2);
        assert!(gctx.threads[1].view.registers.is_empty());
    }
}
