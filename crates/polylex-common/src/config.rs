use std::path::{Path, PathBuf};

use serde::Deserialize;

/// File name searched for next to (and above) the analyzed input.
pub const CONFIG_FILE_NAME: &str = "Polylex.toml";

/// Languages that may appear in `[languages] disabled`.
pub const KNOWN_LANGUAGES: &[&str] = &["html", "python", "sql"];

/// The parsed Polylex.toml configuration.
#[derive(Debug, Clone, Default)]
pub struct PolylexConfig {
    pub analysis: AnalysisOptions,
    /// The directory containing the Polylex.toml file, if one was loaded.
    pub root_dir: Option<PathBuf>,
}

/// Options consumed by the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Width of one Python indentation level.
    pub indent_width: usize,
    /// Run the semantic stage.
    pub semantic: bool,
    /// Keep warning-severity diagnostics in the result.
    pub warnings: bool,
    /// Maximum number of execution-trace lines.
    pub trace_limit: Option<usize>,
    /// Languages whose front end is not registered.
    pub disabled_languages: Vec<String>,
}

fn default_indent_width() -> usize {
    4
}
fn default_true() -> bool {
    true
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            indent_width: default_indent_width(),
            semantic: true,
            warnings: true,
            trace_limit: None,
            disabled_languages: Vec::new(),
        }
    }
}

impl AnalysisOptions {
    pub fn is_disabled(&self, language: &str) -> bool {
        self.disabled_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawAnalysisSection {
    #[serde(default = "default_indent_width")]
    indent_width: usize,
    #[serde(default = "default_true")]
    semantic: bool,
    #[serde(default = "default_true")]
    warnings: bool,
    #[serde(default)]
    trace_limit: Option<usize>,
}

impl Default for RawAnalysisSection {
    fn default() -> Self {
        Self {
            indent_width: default_indent_width(),
            semantic: true,
            warnings: true,
            trace_limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawLanguagesSection {
    #[serde(default)]
    disabled: Vec<String>,
}

/// Raw TOML structure for deserialization.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    analysis: RawAnalysisSection,
    #[serde(default)]
    languages: RawLanguagesSection,
}

/// Errors that can occur when loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no Polylex.toml found (searched from {0})")]
    NotFound(String),
    #[error("failed to read Polylex.toml: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid Polylex.toml: {0}")]
    ParseError(String),
    #[error("invalid Polylex.toml: [analysis] indent_width must be greater than zero")]
    ZeroIndentWidth,
    #[error("invalid Polylex.toml: unknown language '{0}' in [languages] disabled (expected html, python or sql)")]
    UnknownLanguage(String),
}

/// Walk up from `start_dir` looking for `Polylex.toml`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<PolylexConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let root_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    parse_config(&content, Some(root_dir))
}

/// Parse and validate a configuration from a string.
pub fn parse_config(content: &str, root_dir: Option<PathBuf>) -> Result<PolylexConfig, ConfigError> {
    let raw: RawConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    if raw.analysis.indent_width == 0 {
        return Err(ConfigError::ZeroIndentWidth);
    }
    for name in &raw.languages.disabled {
        let lower = name.to_ascii_lowercase();
        if !KNOWN_LANGUAGES.contains(&lower.as_str()) {
            return Err(ConfigError::UnknownLanguage(name.clone()));
        }
    }

    Ok(PolylexConfig {
        analysis: AnalysisOptions {
            indent_width: raw.analysis.indent_width,
            semantic: raw.analysis.semantic,
            warnings: raw.analysis.warnings,
            trace_limit: raw.analysis.trace_limit,
            disabled_languages: raw.languages.disabled,
        },
        root_dir,
    })
}

/// Find and load the configuration starting from an input file's directory.
pub fn find_and_load_config(input_file: &Path) -> Result<PolylexConfig, ConfigError> {
    let start_dir = input_file.parent().unwrap_or_else(|| Path::new("."));
    let config_path = find_config(start_dir)
        .ok_or_else(|| ConfigError::NotFound(start_dir.display().to_string()))?;
    load_config(&config_path)
}
