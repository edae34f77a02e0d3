pub mod html;
pub mod python;
pub mod rules;
pub mod sql;

use polylex_common::{AnalysisError, DiagnosticBag, ErrorKind, SymbolTable, Token};

use crate::language::Language;

pub use html::HtmlScanner;
pub use python::PythonScanner;
pub use rules::{RuleSet, ScanMode};
pub use sql::SqlScanner;

/// Configuration faults that abort lexing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("lexical rule '{kind}' has an invalid pattern: {message}")]
    InvalidPattern { kind: &'static str, message: String },
    #[error("lexical rule '{kind}' matched an empty lexeme at line {line}, column {column}")]
    EmptyMatch {
        kind: &'static str,
        line: usize,
        column: usize,
    },
}

/// A scan that stopped on a [`ScanError`], with the tokens produced before
/// the fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct ScanAbort {
    pub tokens: Vec<Token>,
    pub error: ScanError,
}

/// Everything the lexical stage produces for one input.
#[derive(Debug, Clone, Default)]
pub struct LexicalOutput {
    pub tokens: Vec<Token>,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<AnalysisError>,
}

/// An ordered-pattern tokenizer for one language.
///
/// Implementors provide the rule table and the language-specific hooks;
/// `tokenize` and `analyze_lexical` are shared.
pub trait Scanner: Send + Sync {
    fn language(&self) -> Language;

    fn rules(&self) -> &RuleSet;

    /// Human-readable message for an error-kind token.
    fn error_message(&self, token: &Token) -> String;

    /// Record symbols for structurally significant tokens.
    fn record_symbols(&self, tokens: &[Token], symbols: &mut SymbolTable);

    /// Decorate freshly scanned tokens (subkinds, attributes).
    fn refine(&self, _source: &str, tokens: Vec<Token>) -> Vec<Token> {
        tokens
    }

    /// On a fault the tokens scanned so far are refined and returned in the
    /// [`ScanAbort`].
    fn tokenize(&self, source: &str) -> Result<Vec<Token>, ScanAbort> {
        match self.rules().scan(source) {
            Ok(tokens) => Ok(self.refine(source, tokens)),
            Err(abort) => Err(ScanAbort {
                tokens: self.refine(source, abort.tokens),
                error: abort.error,
            }),
        }
    }

    /// Tokenize, translate error-kind tokens into lexical diagnostics and
    /// build the initial symbol table.
    fn analyze_lexical(&self, source: &str) -> Result<LexicalOutput, ScanAbort> {
        let tokens = self.tokenize(source)?;

        let mut diagnostics = DiagnosticBag::new(ErrorKind::Lexical);
        for token in tokens.iter().filter(|t| t.is_error()) {
            diagnostics.error(self.error_message(token), token);
        }

        let mut symbols = SymbolTable::new();
        self.record_symbols(&tokens, &mut symbols);

        log::debug!(
            "{} scanner: {} tokens, {} lexical errors, {} symbols",
            self.language(),
            tokens.len(),
            diagnostics.len(),
            symbols.len()
        );

        Ok(LexicalOutput {
            tokens,
            symbols,
            diagnostics: diagnostics.into_diagnostics(),
        })
    }
}

/// Shorten long lexemes for messages.
pub(crate) fn excerpt(value: &str) -> String {
    const MAX: usize = 24;
    let first_line = value.lines().next().unwrap_or("");
    if first_line.chars().count() > MAX || first_line.len() < value.len() {
        let head: String = first_line.chars().take(MAX).collect();
        format!("{}...", head)
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates() {
        assert_eq!(excerpt("abc"), "abc");
        assert_eq!(excerpt("\"abc\ndef"), "\"abc...");
        let long = "x".repeat(40);
        assert_eq!(excerpt(&long), format!("{}...", "x".repeat(24)));
    }
}
