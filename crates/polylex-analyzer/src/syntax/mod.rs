//! Structural checks over a token stream.
//!
//! Each language front end has one analyzer. An analyzer never re-scans
//! source text and never stops early: unrecognized constructs are reported
//! and the cursor moves on.

pub mod html;
pub mod python;
pub mod sql;

use polylex_common::{AnalysisError, Token};

pub use html::HtmlStructure;
pub use python::PythonStructure;
pub use sql::SqlStructure;

pub trait StructuralAnalyzer: Send + Sync {
    /// Check `tokens` and return the syntactic diagnostics found.
    fn analyze(&self, tokens: &[Token]) -> Vec<AnalysisError>;
}
