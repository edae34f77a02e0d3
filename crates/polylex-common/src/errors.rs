use serde::Serialize;

use crate::span::Position;
use crate::token::Token;

/// The analysis stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Lexical,
    Syntactic,
    Semantic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Lexical => "lexical",
            ErrorKind::Syntactic => "syntactic",
            ErrorKind::Semantic => "semantic",
        };
        f.write_str(name)
    }
}

/// Severity level of a diagnostic.
///
/// Only syntactic errors of severity `Error` block a successful analysis;
/// warnings are advisory everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A lexical, syntactic or semantic finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisError {
    pub message: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub position: Position,
    /// Width of the offending source text, used when rendering labels.
    pub length: usize,
}

impl AnalysisError {
    pub fn new(kind: ErrorKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            severity,
            position: Position::default(),
            length: 0,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    pub fn warning(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Anchor the diagnostic on a token's position and lexeme width.
    pub fn at_token(mut self, token: &Token) -> Self {
        self.position = token.position;
        self.length = token.value.chars().count();
        self
    }

    pub fn line(&self) -> usize {
        self.position.line
    }

    pub fn column(&self) -> usize {
        self.position.column
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// True for syntactic errors that make an analysis unsuccessful.
    pub fn is_blocking(&self) -> bool {
        self.kind == ErrorKind::Syntactic && self.is_error()
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} {}: {}", self.kind, prefix, self.message)?;
        if !self.position.is_unknown() {
            write!(f, " (line {}, column {})", self.position.line, self.position.column)?;
        }
        Ok(())
    }
}

/// Per-stage diagnostic collector.
///
/// Every analyzer owns one bag for the duration of a run and hands the
/// collected diagnostics back to its caller.
#[derive(Debug)]
pub struct DiagnosticBag {
    kind: ErrorKind,
    diagnostics: Vec<AnalysisError>,
}

impl DiagnosticBag {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            diagnostics: Vec::new(),
        }
    }

    pub fn report(&mut self, diagnostic: AnalysisError) {
        self.diagnostics.push(diagnostic);
    }

    /// Report an error anchored on `token`.
    pub fn error(&mut self, message: impl Into<String>, token: &Token) {
        self.report(AnalysisError::error(self.kind, message).at_token(token));
    }

    /// Report a warning anchored on `token`.
    pub fn warning(&mut self, message: impl Into<String>, token: &Token) {
        self.report(AnalysisError::warning(self.kind, message).at_token(token));
    }

    /// Report an error that belongs to the whole document.
    pub fn document_error(&mut self, message: impl Into<String>) {
        self.report(AnalysisError::error(self.kind, message));
    }

    /// Report a warning that belongs to the whole document.
    pub fn document_warning(&mut self, message: impl Into<String>) {
        self.report(AnalysisError::warning(self.kind, message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[AnalysisError] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<AnalysisError> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positionless_diagnostic_reports_zero() {
        let diag = AnalysisError::error(ErrorKind::Semantic, "missing title");
        assert_eq!(diag.line(), 0);
        assert_eq!(diag.column(), 0);
        assert_eq!(diag.to_string(), "semantic error: missing title");
    }

    #[test]
    fn token_anchor_copies_position_and_width() {
        let token = Token::new("print", "IDENTIFIER", Position::new(3, 5, 20));
        let diag = AnalysisError::warning(ErrorKind::Semantic, "x").at_token(&token);
        assert_eq!(diag.position, Position::new(3, 5, 20));
        assert_eq!(diag.length, 5);
        assert!(!diag.is_error());
    }

    #[test]
    fn only_syntactic_errors_block() {
        let syn = AnalysisError::error(ErrorKind::Syntactic, "unclosed");
        let syn_warn = AnalysisError::warning(ErrorKind::Syntactic, "indent");
        let sem = AnalysisError::error(ErrorKind::Semantic, "undeclared");
        assert!(syn.is_blocking());
        assert!(!syn_warn.is_blocking());
        assert!(!sem.is_blocking());
    }

    #[test]
    fn bag_stamps_its_kind() {
        let token = Token::new("<div>", "RESERVED_TAG", Position::start());
        let mut bag = DiagnosticBag::new(ErrorKind::Syntactic);
        bag.error("unclosed tag", &token);
        bag.document_warning("advice");
        assert_eq!(bag.len(), 2);
        assert!(bag.has_errors());
        let diags = bag.into_diagnostics();
        assert!(diags.iter().all(|d| d.kind == ErrorKind::Syntactic));
        assert_eq!(diags[0].line(), 1);
    }
}
