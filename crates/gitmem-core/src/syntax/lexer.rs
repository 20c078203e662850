//! gitmem lexer using logos
//!
//! Token categories:
//! 1. Keywords: `nop`, `spawn`, `join`, `lock`, `unlock`, `assert`, `if`, `else`
//! 2. Operators: `+`, `==`, `!=`, `=`
//! 3. Delimiters: `;`, `(`, `)`, `{`, `}`
//! 4. Literals: decimal integers
//! 5. Identifiers: `$`-prefixed registers, bare globals/locks
//! 6. Comments: `// ...` line comments (skipped)

use logos::Logos;

/// gitmem tokens
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // === Keywords ===
    #[token("nop")]
    Nop,

    #[token("spawn")]
    Spawn,

    #[token("join")]
    Join,

    #[token("lock")]
    Lock,

    #[token("unlock")]
    Unlock,

    #[token("assert")]
    Assert,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    // === Operators ===
    #[token("+")]
    Plus,

    #[token("==")]
    EqEq,

    #[token("!=")]
    BangEq,

    #[token("=")]
    Assign,

    // === Delimiters ===
    #[token(";")]
    Semi,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    // === Literals and identifiers ===
    /// Decimal integer literal
    #[regex(r"[0-9]+")]
    Int,

    /// Register name, `$`-prefixed
    #[regex(r"\$[_a-zA-Z][_a-zA-Z0-9]*")]
    Reg,

    /// Global variable or lock name
    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*")]
    Ident,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Token::lexer(src).map(|t| t.expect("lex error")).collect()
    }

    #[test]
    fn lexes_assignment() {
        assert_eq!(
            lex("$r = 1;"),
            vec![Token::Reg, Token::Assign, Token::Int, Token::Semi]
        );
    }

    #[test]
    fn lexes_keywords_vs_identifiers() {
        // A keyword prefix does not make an identifier a keyword
        assert_eq!(lex("locker"), vec![Token::Ident]);
        assert_eq!(lex("lock locker"), vec![Token::Lock, Token::Ident]);
        assert_eq!(lex("iffy"), vec![Token::Ident]);
    }

    #[test]
    fn lexes_comparisons() {
        assert_eq!(
            lex("x == 1 != 2"),
            vec![
                Token::Ident,
                Token::EqEq,
                Token::Int,
                Token::BangEq,
                Token::Int
            ]
        );
    }

    #[test]
    fn skips_comments_and_whitespace() {
        assert_eq!(
            lex("nop; // trailing comment\nnop;"),
            vec![Token::Nop, Token::Semi, Token::Nop, Token::Semi]
        );
    }

    #[test]
    fn rejects_bad_characters() {
        let mut lexer = Token::lexer("x @ y");
        assert_eq!(lexer.next(), Some(Ok(Token::Ident)));
        assert!(lexer.next().expect("token expected").is_err());
    }
}
