//! Symbol-table driven rule checks.
//!
//! A semantic analyzer receives the table built during lexing by value and
//! hands back the updated table together with its own diagnostics. Symbols
//! are added or updated, never removed. Every finding here is advisory: it
//! never affects whether an analysis counts as successful.

pub mod html;
pub mod python;
pub mod sql;

use polylex_common::{AnalysisError, SymbolTable, Token};

pub use html::HtmlSemantics;
pub use python::PythonSemantics;
pub use sql::SqlSemantics;

/// What a semantic pass produces.
#[derive(Debug, Clone, Default)]
pub struct SemanticOutput {
    pub symbols: SymbolTable,
    pub diagnostics: Vec<AnalysisError>,
}

pub trait SemanticAnalyzer: Send + Sync {
    fn analyze(&self, tokens: &[Token], symbols: SymbolTable) -> SemanticOutput;
}
