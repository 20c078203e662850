//! Recursive-descent parser for gitmem
//!
//! The grammar is small enough that the parser builds the typed AST
//! directly, one `Spanned` node per construct:
//!
//! ```text
//! program := stmt ';' (stmt ';')*
//! stmt    := 'nop' | lval '=' rval | 'join' rval | 'lock' var
//!          | 'unlock' var | 'assert' cond
//!          | 'if' '(' cond ')' '{' program '}' ['else' '{' program '}']
//! cond    := add ('==' | '!=') add
//! rval    := add | primary            -- no bare comparisons
//! add     := primary ('+' primary)+
//! primary := reg | var | int | 'spawn' '{' program '}' | '(' expr ')'
//! ```
//!
//! Comparisons are only valid where a condition is expected (`assert`, `if`)
//! or inside parentheses; assignment and `join` operands reject them with
//! the same messages the statement checker has always used.

use crate::ast::{Block, Expr, LVal, Stmt};
use crate::span::{Span, Spanned};
use crate::syntax::lexer::Token;
use logos::Logos;
use std::sync::Arc;

/// A parse error with the offending source range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// A lexed token with its source text and span
#[derive(Debug, Clone, Copy)]
struct Tok<'a> {
    kind: Token,
    text: &'a str,
    span: Span,
}

/// Parse a whole gitmem program
pub fn parse(src: &str) -> Result<Block, ParseError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(src);
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start as u32, range.end as u32);
        match result {
            Ok(kind) => tokens.push(Tok {
                kind,
                text: lexer.slice(),
                span,
            }),
            Err(()) => return Err(ParseError::new("Unexpected character", span)),
        }
    }

    let eof = Span::new(src.len() as u32, src.len() as u32);
    let mut parser = Parser {
        tokens,
        pos: 0,
        eof,
    };
    let block = parser.parse_block(None)?;
    Ok(block)
}

struct Parser<'a> {
    tokens: Vec<Tok<'a>>,
    pos: usize,
    eof: Span,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Tok<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<Token> {
        self.peek().map(|t| t.kind)
    }

    fn bump(&mut self) -> Tok<'a> {
        let tok = self.tokens[self.pos];
        self.pos += 1;
        tok
    }

    /// Span of the current token, or of end-of-file
    fn here(&self) -> Span {
        self.peek().map(|t| t.span).unwrap_or(self.eof)
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError::new(message, self.here())
    }

    fn expect(&mut self, kind: Token, message: &str) -> Result<Tok<'a>, ParseError> {
        match self.peek() {
            Some(tok) if tok.kind == kind => Ok(self.bump()),
            _ => Err(self.error(message)),
        }
    }

    /// Parse statements until `end` (a closing brace) or end of input.
    /// Every statement must be terminated by a semicolon, including the last.
    fn parse_block(&mut self, end: Option<Token>) -> Result<Block, ParseError> {
        let mut stmts = Vec::new();
        loop {
            match (self.peek_kind(), end) {
                (None, None) => break,
                (None, Some(_)) => return Err(ParseError::new("Expected '}'", self.eof)),
                (Some(kind), Some(end_kind)) if kind == end_kind => break,
                _ => {}
            }

            let stmt = self.parse_stmt()?;
            match self.peek_kind() {
                Some(Token::Semi) => {
                    self.bump();
                }
                None if end.is_none() => {
                    return Err(ParseError::new("Expected ';' at end of file", self.eof))
                }
                _ => return Err(self.error("Expected semicolon")),
            }
            stmts.push(stmt);
        }

        if stmts.is_empty() {
            return Err(self.error("Expected statement"));
        }
        Ok(Block::new(stmts))
    }

    fn parse_stmt(&mut self) -> Result<Spanned<Stmt>, ParseError> {
        let tok = match self.peek() {
            Some(tok) => tok,
            None => return Err(self.error("Expected statement")),
        };

        match tok.kind {
            Token::Nop => {
                self.bump();
                Ok(Spanned::new(Stmt::Nop, tok.span))
            }
            Token::Join => {
                self.bump();
                if matches!(self.peek_kind(), None | Some(Token::Semi)) {
                    return Err(self.error("Expected thread identifier"));
                }
                let expr = self.parse_expr()?;
                if expr.node.is_comparison() {
                    return Err(ParseError::new("Invalid thread identifier", expr.span));
                }
                let span = tok.span.merge(expr.span);
                Ok(Spanned::new(Stmt::Join(expr), span))
            }
            Token::Lock | Token::Unlock => {
                self.bump();
                if matches!(self.peek_kind(), None | Some(Token::Semi)) {
                    return Err(self.error("Expected lock identifier"));
                }
                let name_tok = match self.peek() {
                    Some(t) if t.kind == Token::Ident => self.bump(),
                    _ => return Err(self.error("Invalid lock identifier")),
                };
                let name = Arc::from(name_tok.text);
                let span = tok.span.merge(name_tok.span);
                let stmt = if tok.kind == Token::Lock {
                    Stmt::Lock(name)
                } else {
                    Stmt::Unlock(name)
                };
                Ok(Spanned::new(stmt, span))
            }
            Token::Assert => {
                self.bump();
                if matches!(self.peek_kind(), None | Some(Token::Semi)) {
                    return Err(self.error("Expected condition"));
                }
                let expr = self.parse_expr()?;
                if !expr.node.is_comparison() {
                    return Err(ParseError::new("Invalid assertion", expr.span));
                }
                let span = tok.span.merge(expr.span);
                Ok(Spanned::new(Stmt::Assert(expr), span))
            }
            Token::If => self.parse_if(),
            Token::Reg | Token::Ident => self.parse_assign(),
            _ => Err(self.error("Expected statement")),
        }
    }

    fn parse_assign(&mut self) -> Result<Spanned<Stmt>, ParseError> {
        let lval_tok = self.bump();
        let lval = match lval_tok.kind {
            Token::Reg => LVal::Reg(Arc::from(&lval_tok.text[1..])),
            Token::Ident => LVal::Var(Arc::from(lval_tok.text)),
            _ => return Err(ParseError::new("Invalid left-hand side to assignment", lval_tok.span)),
        };
        self.expect(Token::Assign, "Expected '='")?;
        if matches!(self.peek_kind(), None | Some(Token::Semi)) {
            return Err(self.error("Expected right-hand side to assignment"));
        }
        let expr = self.parse_expr()?;
        if expr.node.is_comparison() {
            return Err(ParseError::new(
                "Invalid right-hand side to assignment",
                expr.span,
            ));
        }
        let span = lval_tok.span.merge(expr.span);
        Ok(Spanned::new(Stmt::Assign { lval, expr }, span))
    }

    fn parse_if(&mut self) -> Result<Spanned<Stmt>, ParseError> {
        let if_tok = self.bump();
        self.expect(Token::LParen, "Expected '(' after 'if'")?;
        let cond = self.parse_expr()?;
        if !cond.node.is_comparison() {
            return Err(ParseError::new("Invalid condition", cond.span));
        }
        self.expect(Token::RParen, "Expected ')'")?;

        self.expect(Token::LBrace, "Expected block")?;
        let then_block = self.parse_block(Some(Token::RBrace))?;
        self.expect(Token::RBrace, "Expected '}'")?;

        let (else_block, end_span) = if self.peek_kind() == Some(Token::Else) {
            self.bump();
            self.expect(Token::LBrace, "Expected block")?;
            let block = self.parse_block(Some(Token::RBrace))?;
            let close = self.expect(Token::RBrace, "Expected '}'")?;
            (block, close.span)
        } else {
            // An if without an else still needs both branch targets
            let nop = Block::new(vec![Spanned::dummy(Stmt::Nop)]);
            (nop, self.tokens[self.pos - 1].span)
        };

        let span = if_tok.span.merge(end_span);
        Ok(Spanned::new(
            Stmt::If {
                cond,
                then_block,
                else_block,
            },
            span,
        ))
    }

    /// Full expression, comparisons allowed at the top level
    fn parse_expr(&mut self) -> Result<Spanned<Expr>, ParseError> {
        let lhs = self.parse_add()?;
        let op = match self.peek_kind() {
            Some(Token::EqEq) => Token::EqEq,
            Some(Token::BangEq) => Token::BangEq,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_add()?;
        if matches!(self.peek_kind(), Some(Token::EqEq) | Some(Token::BangEq)) {
            return Err(self.error("Bad equality"));
        }
        let span = lhs.span.merge(rhs.span);
        let expr = match op {
            Token::EqEq => Expr::Eq(Box::new(lhs), Box::new(rhs)),
            _ => Expr::Neq(Box::new(lhs), Box::new(rhs)),
        };
        Ok(Spanned::new(expr, span))
    }

    fn parse_add(&mut self) -> Result<Spanned<Expr>, ParseError> {
        let first = self.parse_primary()?;
        if self.peek_kind() != Some(Token::Plus) {
            return Ok(first);
        }
        let mut summands = vec![first];
        while self.peek_kind() == Some(Token::Plus) {
            self.bump();
            summands.push(self.parse_primary()?);
        }
        let span = summands[0]
            .span
            .merge(summands[summands.len() - 1].span);
        Ok(Spanned::new(Expr::Add(summands), span))
    }

    fn parse_primary(&mut self) -> Result<Spanned<Expr>, ParseError> {
        let tok = match self.peek() {
            Some(tok) => tok,
            None => return Err(self.error("Expected expression")),
        };
        match tok.kind {
            Token::Int => {
                self.bump();
                let value: i64 = tok
                    .text
                    .parse()
                    .map_err(|_| ParseError::new("Constant too large", tok.span))?;
                Ok(Spanned::new(Expr::Const(value), tok.span))
            }
            Token::Reg => {
                self.bump();
                Ok(Spanned::new(Expr::Reg(Arc::from(&tok.text[1..])), tok.span))
            }
            Token::Ident => {
                self.bump();
                Ok(Spanned::new(Expr::Var(Arc::from(tok.text)), tok.span))
            }
            Token::Spawn => {
                self.bump();
                self.expect(Token::LBrace, "Expected body of spawn")?;
                let block = self.parse_block(Some(Token::RBrace))?;
                let close = self.expect(Token::RBrace, "Expected '}'")?;
                let span = tok.span.merge(close.span);
                Ok(Spanned::new(Expr::Spawn(Arc::new(block)), span))
            }
            Token::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "Expected ')'")?;
                Ok(inner)
            }
            _ => Err(self.error("Expected expression")),
        }
    }
}
