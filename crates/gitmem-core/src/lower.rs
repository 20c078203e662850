//! Lowering from the surface AST to the flat, interpretable form
//!
//! Two rewrites happen here, mirroring what the statement tree needs before
//! the engine may run it:
//!
//! 1. **Branch flattening.** `if (c) { A } else { B }` becomes
//!    `cond c Δt ; A… ; jump Δe ; B…` where `Δt = |A| + 2` skips the
//!    then-branch and its trailing jump, and `Δe = |B| + 1` skips the
//!    else-branch. Bodies are flattened bottom-up first, so the deltas count
//!    flattened statements. After this pass a thread's code is a single
//!    statement sequence addressed by a program counter.
//!
//! 2. **Register-use check.** Reading a register with no textually preceding
//!    assignment in the same thread body is rejected. Spawn bodies start from
//!    an empty register scope, matching the empty register file a spawned
//!    thread begins with.

use crate::ast::{Block, Expr, LVal, Stmt};
use crate::span::{Span, Spanned};
use std::collections::HashSet;
use std::sync::Arc;

/// An error found during lowering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for LowerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LowerError {}

/// Lower a parsed program into its flat executable form.
///
/// Collects every error rather than stopping at the first one.
pub fn lower(block: &Block) -> Result<Arc<Block>, Vec<LowerError>> {
    let mut errors = Vec::new();
    let flat = flatten_block(block, &mut errors);
    check_block(&flat, &mut errors);
    if errors.is_empty() {
        Ok(Arc::new(flat))
    } else {
        Err(errors)
    }
}

fn flatten_block(block: &Block, errors: &mut Vec<LowerError>) -> Block {
    let mut stmts = Vec::new();
    for stmt in &block.stmts {
        match &stmt.node {
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let then_flat = flatten_block(then_block, errors);
                let else_flat = flatten_block(else_block, errors);
                stmts.push(Spanned::new(
                    Stmt::Cond {
                        cond: lower_expr(cond, errors),
                        delta: then_flat.len() + 2,
                    },
                    stmt.span,
                ));
                let jump = Spanned::new(Stmt::Jump(else_flat.len() + 1), stmt.span);
                stmts.extend(then_flat.stmts);
                stmts.push(jump);
                stmts.extend(else_flat.stmts);
            }
            Stmt::Assign { lval, expr } => stmts.push(Spanned::new(
                Stmt::Assign {
                    lval: lval.clone(),
                    expr: lower_expr(expr, errors),
                },
                stmt.span,
            )),
            Stmt::Join(expr) => stmts.push(Spanned::new(
                Stmt::Join(lower_expr(expr, errors)),
                stmt.span,
            )),
            Stmt::Assert(expr) => stmts.push(Spanned::new(
                Stmt::Assert(lower_expr(expr, errors)),
                stmt.span,
            )),
            Stmt::Cond { cond, delta } => stmts.push(Spanned::new(
                Stmt::Cond {
                    cond: lower_expr(cond, errors),
                    delta: *delta,
                },
                stmt.span,
            )),
            Stmt::Nop | Stmt::Lock(_) | Stmt::Unlock(_) | Stmt::Jump(_) => {
                stmts.push(stmt.clone())
            }
        }
    }
    Block::new(stmts)
}

fn lower_expr(expr: &Spanned<Expr>, errors: &mut Vec<LowerError>) -> Spanned<Expr> {
    let node = match &expr.node {
        Expr::Spawn(block) => Expr::Spawn(Arc::new(flatten_block(block, errors))),
        Expr::Eq(lhs, rhs) => Expr::Eq(
            Box::new(lower_expr(lhs, errors)),
            Box::new(lower_expr(rhs, errors)),
        ),
        Expr::Neq(lhs, rhs) => Expr::Neq(
            Box::new(lower_expr(lhs, errors)),
            Box::new(lower_expr(rhs, errors)),
        ),
        Expr::Add(summands) => {
            Expr::Add(summands.iter().map(|s| lower_expr(s, errors)).collect())
        }
        leaf => leaf.clone(),
    };
    Spanned::new(node, expr.span)
}

/// Walk a flat block in textual order, tracking which registers have been
/// assigned so far. Spawn bodies are checked with a fresh scope.
fn check_block(block: &Block, errors: &mut Vec<LowerError>) {
    let mut defined: HashSet<Arc<str>> = HashSet::new();
    for stmt in &block.stmts {
        match &stmt.node {
            Stmt::Assign { lval, expr } => {
                check_expr(expr, &defined, errors);
                if let LVal::Reg(name) = lval {
                    defined.insert(name.clone());
                }
            }
            Stmt::Join(expr) | Stmt::Assert(expr) | Stmt::Cond { cond: expr, .. } => {
                check_expr(expr, &defined, errors)
            }
            Stmt::Nop | Stmt::Lock(_) | Stmt::Unlock(_) | Stmt::Jump(_) => {}
            Stmt::If { .. } => {
                // flatten_block ran first, so no If can remain
                unreachable!("if statement survived flattening")
            }
        }
    }
}

fn check_expr(expr: &Spanned<Expr>, defined: &HashSet<Arc<str>>, errors: &mut Vec<LowerError>) {
    match &expr.node {
        Expr::Reg(name) => {
            if !defined.contains(name) {
                errors.push(LowerError {
                    message: "Register has not been assigned".to_string(),
                    span: expr.span,
                });
            }
        }
        Expr::Spawn(block) => check_block(block, errors),
        Expr::Eq(lhs, rhs) | Expr::Neq(lhs, rhs) => {
            check_expr(lhs, defined, errors);
            check_expr(rhs, defined, errors);
        }
        Expr::Add(summands) => {
            for summand in summands {
                check_expr(summand, defined, errors);
            }
        }
        Expr::Var(_) | Expr::Const(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parser::parse;

    fn lower_src(src: &str) -> Arc<Block> {
        lower(&parse(src).expect("parse failed")).expect("lower failed")
    }

    fn lower_err(src: &str) -> Vec<String> {
        lower(&parse(src).expect("parse failed"))
            .expect_err("expected lower errors")
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn flattens_if_else() {
        let block = lower_src("if (x == 1) { y = 2; } else { y = 3; };");
        let rendered: Vec<String> = block.stmts.iter().map(|s| s.node.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["if (x == 1) jump 3", "y = 2", "jump 2", "y = 3"]
        );
    }

    #[test]
    fn flattens_if_without_else_to_nop() {
        let block = lower_src("if (x == 1) { y = 2; };");
        let rendered: Vec<String> = block.stmts.iter().map(|s| s.node.to_string()).collect();
        assert_eq!(rendered, vec!["if (x == 1) jump 3", "y = 2", "jump 2", "nop"]);
    }

    #[test]
    fn flattens_nested_if_with_outer_deltas_counting_inner_statements() {
        let block = lower_src(
            "if (x == 1) { if (y == 1) { z = 1; }; } else { z = 2; };",
        );
        let rendered: Vec<String> = block.stmts.iter().map(|s| s.node.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "if (x == 1) jump 6",
                "if (y == 1) jump 3",
                "z = 1",
                "jump 2",
                "nop",
                "jump 2",
                "z = 2",
            ]
        );
    }

    #[test]
    fn flattens_spawn_bodies() {
        let block = lower_src("$t = spawn { if (x == 1) { y = 2; }; }; join $t;");
        match &block.stmts[0].node {
            Stmt::Assign { expr, .. } => match &expr.node {
                Expr::Spawn(body) => {
                    assert_eq!(body.len(), 4);
                    assert!(matches!(body.stmts[0].node, Stmt::Cond { .. }));
                }
                other => panic!("expected spawn, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unassigned_register_read() {
        assert_eq!(lower_err("x = $r;"), vec!["Register has not been assigned"]);
    }

    #[test]
    fn rejects_register_from_parent_thread_scope() {
        // Spawned threads start with an empty register file
        assert_eq!(
            lower_err("$r = 1; $t = spawn { x = $r; }; join $t;"),
            vec!["Register has not been assigned"]
        );
    }

    #[test]
    fn accepts_register_assigned_in_earlier_branch() {
        // Flattened branches read in textual order, so an assignment in the
        // then-branch is visible to the else-branch check
        lower_src("if (x == 1) { $r = 1; } else { $r = 2; }; y = $r;");
    }

    #[test]
    fn collects_multiple_errors() {
        assert_eq!(lower_err("x = $a; y = $b;").len(), 2);
    }

    #[test]
    fn self_read_before_first_assignment_is_rejected() {
        assert_eq!(lower_err("$r = $r + 1;"), vec!["Register has not been assigned"]);
    }
}
