//! Error rendering using ariadne
//!
//! Converts parse and lowering errors into rich reports pointing at the
//! offending source range.

use crate::lower::LowerError;
use crate::span::Span;
use crate::syntax::parser::ParseError;
use ariadne::{Color, Label, Report, ReportKind, Source};
use std::io::Write;

/// A renderable diagnostic: a message anchored to a source range
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The main error message
    pub message: String,
    /// The offending source range
    pub span: Span,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// Render this diagnostic to a writer
    pub fn render(
        &self,
        file_path: &str,
        source: &str,
        writer: &mut impl Write,
    ) -> std::io::Result<()> {
        let start = self.span.start as usize;
        let end = (self.span.end as usize).max(start);
        Report::build(ReportKind::Error, file_path, start)
            .with_message(&self.message)
            .with_label(
                Label::new((file_path, start..end))
                    .with_message("here")
                    .with_color(Color::Red),
            )
            .finish()
            .write((file_path, Source::from(source)), writer)
    }

    /// Render this diagnostic to stderr
    pub fn eprint(&self, file_path: &str, source: &str) {
        let mut buf = Vec::new();
        let _ = self.render(file_path, source, &mut buf);
        let _ = std::io::stderr().write_all(&buf);
    }
}

impl From<ParseError> for Diagnostic {
    fn from(err: ParseError) -> Self {
        Diagnostic::new(format!("syntax error: {}", err.message), err.span)
    }
}

impl From<LowerError> for Diagnostic {
    fn from(err: LowerError) -> Self {
        Diagnostic::new(format!("semantic error: {}", err.message), err.span)
    }
}
