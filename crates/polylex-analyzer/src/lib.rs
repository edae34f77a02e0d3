pub mod detect;
pub mod language;
pub mod lexer;
pub mod pipeline;
pub mod semantic;
pub mod syntax;
pub mod trace;

pub use detect::{detect, DetectionScores};
pub use language::Language;
pub use pipeline::{run_analysis, AnalysisResult, Pipeline, PipelineError};
