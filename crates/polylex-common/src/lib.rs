pub mod config;
pub mod errors;
pub mod span;
pub mod symbol;
pub mod token;

pub use config::{AnalysisOptions, ConfigError, PolylexConfig};
pub use errors::{AnalysisError, DiagnosticBag, ErrorKind, Severity};
pub use span::Position;
pub use symbol::{Symbol, SymbolKind, SymbolTable};
pub use token::Token;
