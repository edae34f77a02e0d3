//! Front-end registry and the analysis pipeline.
//!
//! A [`Pipeline`] owns one immutable front end per enabled language. Every
//! call to [`Pipeline::run`] builds its own tokens, symbol table and
//! diagnostic lists, so a single pipeline can serve concurrent callers.

use std::collections::BTreeMap;
use std::fmt;

use polylex_common::{AnalysisError, AnalysisOptions, ErrorKind, SymbolTable, Token};
use serde::Serialize;

use crate::detect::detect;
use crate::language::Language;
use crate::lexer::{HtmlScanner, PythonScanner, ScanError, Scanner, SqlScanner};
use crate::semantic::{HtmlSemantics, PythonSemantics, SemanticAnalyzer, SqlSemantics};
use crate::syntax::{HtmlStructure, PythonStructure, SqlStructure, StructuralAnalyzer};
use crate::trace::execution_trace;

/// Errors raised while building a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to build the {language} scanner: {source}")]
    Scanner {
        language: Language,
        source: ScanError,
    },
}

/// The three analyzers that make up one language front end.
pub struct FrontEnd {
    pub scanner: Box<dyn Scanner>,
    pub structure: Box<dyn StructuralAnalyzer>,
    pub semantic: Box<dyn SemanticAnalyzer>,
}

impl FrontEnd {
    /// The built-in front end for `language`, configured by `options`.
    pub fn builtin(
        language: Language,
        options: &AnalysisOptions,
    ) -> Result<Option<Self>, ScanError> {
        let front_end = match language {
            Language::Html => FrontEnd {
                scanner: Box::new(HtmlScanner::new()?),
                structure: Box::new(HtmlStructure::new()),
                semantic: Box::new(HtmlSemantics::new()),
            },
            Language::Python => FrontEnd {
                scanner: Box::new(PythonScanner::new()?),
                structure: Box::new(PythonStructure::new(options.indent_width)),
                semantic: Box::new(PythonSemantics::new()),
            },
            Language::Sql => FrontEnd {
                scanner: Box::new(SqlScanner::new()?),
                structure: Box::new(SqlStructure::new()),
                semantic: Box::new(SqlSemantics::new()),
            },
            Language::Unknown => return Ok(None),
        };
        Ok(Some(front_end))
    }
}

impl fmt::Debug for FrontEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontEnd")
            .field("language", &self.scanner.language())
            .finish_non_exhaustive()
    }
}

/// Language → front end dispatch table.
#[derive(Debug, Default)]
pub struct FrontEndRegistry {
    front_ends: BTreeMap<Language, FrontEnd>,
}

impl FrontEndRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in front end of every language not disabled in
    /// `options`.
    pub fn with_builtins(options: &AnalysisOptions) -> Result<Self, PipelineError> {
        let mut registry = Self::new();
        for language in Language::ALL {
            if options.is_disabled(language.name()) {
                log::debug!("front end for {} disabled by configuration", language);
                continue;
            }
            let front_end = FrontEnd::builtin(language, options)
                .map_err(|source| PipelineError::Scanner { language, source })?;
            if let Some(front_end) = front_end {
                registry.register(language, front_end);
            }
        }
        Ok(registry)
    }

    /// Add or replace the front end for `language`.
    pub fn register(&mut self, language: Language, front_end: FrontEnd) {
        self.front_ends.insert(language, front_end);
    }

    pub fn get(&self, language: Language) -> Option<&FrontEnd> {
        self.front_ends.get(&language)
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.front_ends.keys().copied()
    }
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub language: Language,
    pub tokens: Vec<Token>,
    pub lexical_errors: Vec<AnalysisError>,
    pub syntactic_errors: Vec<AnalysisError>,
    pub semantic_errors: Vec<AnalysisError>,
    pub symbols: SymbolTable,
    pub trace: Vec<String>,
    pub success: bool,
}

impl AnalysisResult {
    fn new(language: Language) -> Self {
        Self {
            language,
            tokens: Vec::new(),
            lexical_errors: Vec::new(),
            syntactic_errors: Vec::new(),
            semantic_errors: Vec::new(),
            symbols: SymbolTable::new(),
            trace: Vec::new(),
            success: false,
        }
    }

    /// A result that stopped before lexing finished. Callers attach any
    /// partial tokens themselves.
    fn fatal(language: Language, message: impl Into<String>) -> Self {
        let mut result = Self::new(language);
        result
            .lexical_errors
            .push(AnalysisError::error(ErrorKind::Lexical, message));
        result
    }

    /// No lexical diagnostics and no blocking syntactic diagnostic.
    /// Semantic findings are advisory.
    pub fn is_successful(&self) -> bool {
        self.lexical_errors.is_empty() && !self.syntactic_errors.iter().any(|d| d.is_blocking())
    }

    /// All diagnostics, lexical first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &AnalysisError> {
        self.lexical_errors
            .iter()
            .chain(&self.syntactic_errors)
            .chain(&self.semantic_errors)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics().filter(|d| !d.is_error()).count()
    }
}

/// Detection, lexing, structural and semantic analysis, and tracing.
#[derive(Debug)]
pub struct Pipeline {
    options: AnalysisOptions,
    registry: FrontEndRegistry,
}

impl Pipeline {
    /// Build a pipeline with the built-in front ends. Every scanner's rule
    /// table is compiled here, once.
    pub fn new(options: AnalysisOptions) -> Result<Self, PipelineError> {
        let registry = FrontEndRegistry::with_builtins(&options)?;
        Ok(Self::with_registry(options, registry))
    }

    pub fn with_registry(options: AnalysisOptions, registry: FrontEndRegistry) -> Self {
        Self { options, registry }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn registry(&self) -> &FrontEndRegistry {
        &self.registry
    }

    /// Detect the language of `source` and analyze it.
    pub fn run(&self, source: &str) -> AnalysisResult {
        let language = detect(source);
        log::debug!("detected language: {}", language);
        self.run_as(source, language)
    }

    /// Analyze `source` as `language`, skipping detection.
    pub fn run_as(&self, source: &str, language: Language) -> AnalysisResult {
        let Some(front_end) = self.registry.get(language) else {
            log::warn!("no analyzer registered for language '{}'", language);
            return AnalysisResult::fatal(
                language,
                format!("No analyzer is available for language '{}'", language),
            );
        };

        let lexical = match front_end.scanner.analyze_lexical(source) {
            Ok(output) => output,
            Err(abort) => {
                log::warn!("{} scanner aborted: {}", language, abort.error);
                let mut result = AnalysisResult::fatal(language, abort.error.to_string());
                result.tokens = abort.tokens;
                return result;
            }
        };

        let mut result = AnalysisResult::new(language);
        result.tokens = lexical.tokens;
        result.lexical_errors = lexical.diagnostics;

        result.syntactic_errors = front_end.structure.analyze(&result.tokens);
        log::debug!(
            "{} structure: {} diagnostics",
            language,
            result.syntactic_errors.len()
        );

        result.symbols = if self.options.semantic {
            let output = front_end.semantic.analyze(&result.tokens, lexical.symbols);
            log::debug!(
                "{} semantics: {} diagnostics, {} symbols",
                language,
                output.diagnostics.len(),
                output.symbols.len()
            );
            result.semantic_errors = output.diagnostics;
            output.symbols
        } else {
            lexical.symbols
        };

        result.trace = execution_trace(&result.tokens, language, &result.symbols);
        if let Some(limit) = self.options.trace_limit {
            result.trace.truncate(limit);
        }

        if !self.options.warnings {
            result.lexical_errors.retain(|d| d.is_error());
            result.syntactic_errors.retain(|d| d.is_error());
            result.semantic_errors.retain(|d| d.is_error());
        }
        result.success = result.is_successful();

        log::info!(
            "{} analysis finished: {} tokens, {} lexical, {} syntactic, {} semantic diagnostics (success: {})",
            language,
            result.tokens.len(),
            result.lexical_errors.len(),
            result.syntactic_errors.len(),
            result.semantic_errors.len(),
            result.success
        );
        result
    }
}

/// Analyze `source` with default options.
pub fn run_analysis(source: &str) -> AnalysisResult {
    match Pipeline::new(AnalysisOptions::default()) {
        Ok(pipeline) => pipeline.run(source),
        Err(e) => {
            log::warn!("{}", e);
            AnalysisResult::fatal(detect(source), e.to_string())
        }
    }
}
