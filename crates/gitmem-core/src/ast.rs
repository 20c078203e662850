//! Abstract syntax tree for gitmem programs
//!
//! The parser produces this tree directly from source text. Lowering
//! (see [`crate::lower`]) rewrites `If` statements into flat `Cond`/`Jump`
//! sequences, so the tree handed to the interpreter contains only
//! pc-addressable statements.

use crate::span::Spanned;
use std::fmt;
use std::sync::Arc;

/// An interned identifier (register, global or lock name)
pub type Name = Arc<str>;

/// A non-empty ordered sequence of statements
///
/// Blocks are shared behind `Arc`: a spawned thread holds the block of its
/// `spawn` expression, and block identity (`Arc::ptr_eq`) is what makes two
/// threads "the same" when terminal states are compared across schedules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub stmts: Vec<Spanned<Stmt>>,
}

impl Block {
    pub fn new(stmts: Vec<Spanned<Stmt>>) -> Self {
        Self { stmts }
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

/// The target of an assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LVal {
    /// A thread-local register, `$r`
    Reg(Name),
    /// A versioned global, `x`
    Var(Name),
}

/// A gitmem statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `nop`
    Nop,
    /// `$r = e` or `x = e`
    Assign { lval: LVal, expr: Spanned<Expr> },
    /// `join e` where `e` evaluates to a thread id
    Join(Spanned<Expr>),
    /// `lock m`
    Lock(Name),
    /// `unlock m`
    Unlock(Name),
    /// `assert c`
    Assert(Spanned<Expr>),
    /// `if (c) { ... } else { ... }` -- surface form only, removed by lowering
    If {
        cond: Spanned<Expr>,
        then_block: Block,
        else_block: Block,
    },
    /// Unconditional forward jump by `delta` statements (lowering artifact)
    Jump(usize),
    /// Conditional jump: advance 1 when `cond` is non-zero, `delta` otherwise
    /// (lowering artifact)
    Cond { cond: Spanned<Expr>, delta: usize },
}

/// A gitmem expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Register read, `$r`
    Reg(Name),
    /// Global read, `x`
    Var(Name),
    /// Decimal integer literal
    Const(i64),
    /// `spawn { ... }`, evaluates to the new thread's id
    Spawn(Arc<Block>),
    /// `l == r`, evaluates to 1 or 0
    Eq(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    /// `l != r`, evaluates to 1 or 0
    Neq(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    /// `a + b + ...` with two or more summands
    Add(Vec<Spanned<Expr>>),
}

impl Expr {
    /// Whether this is a comparison (`==` / `!=`) at the top level
    pub fn is_comparison(&self) -> bool {
        matches!(self, Expr::Eq(..) | Expr::Neq(..))
    }
}

// Display regenerates source-shaped text. It is used for `Pending` graph
// labels, the interactive statement listing and error messages, so it keeps
// every statement on a single line.

impl fmt::Display for LVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LVal::Reg(name) => write!(f, "${}", name),
            LVal::Var(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Reg(name) => write!(f, "${}", name),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Const(value) => write!(f, "{}", value),
            Expr::Spawn(block) => {
                write!(f, "spawn {{ ")?;
                for stmt in &block.stmts {
                    write!(f, "{}; ", stmt.node)?;
                }
                write!(f, "}}")
            }
            Expr::Eq(lhs, rhs) => write!(f, "{} == {}", lhs.node, rhs.node),
            Expr::Neq(lhs, rhs) => write!(f, "{} != {}", lhs.node, rhs.node),
            Expr::Add(summands) => {
                for (i, summand) in summands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    if summand.node.is_comparison() {
                        write!(f, "({})", summand.node)?;
                    } else {
                        write!(f, "{}", summand.node)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Nop => write!(f, "nop"),
            Stmt::Assign { lval, expr } => write!(f, "{} = {}", lval, expr.node),
            Stmt::Join(expr) => write!(f, "join {}", expr.node),
            Stmt::Lock(name) => write!(f, "lock {}", name),
            Stmt::Unlock(name) => write!(f, "unlock {}", name),
            Stmt::Assert(expr) => write!(f, "assert {}", expr.node),
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                write!(f, "if ({}) {{ ", cond.node)?;
                for stmt in &then_block.stmts {
                    write!(f, "{}; ", stmt.node)?;
                }
                write!(f, "}} else {{ ")?;
                for stmt in &else_block.stmts {
                    write!(f, "{}; ", stmt.node)?;
                }
                write!(f, "}}")
            }
            Stmt::Jump(delta) => write!(f, "jump {}", delta),
            Stmt::Cond { cond, delta } => write!(f, "if ({}) jump {}", cond.node, delta),
        }
    }
}
