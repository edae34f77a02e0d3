use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// A source language understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Html,
    Python,
    Sql,
    Unknown,
}

impl Language {
    /// Languages with a front end.
    pub const ALL: [Language; 3] = [Language::Html, Language::Python, Language::Sql];

    pub fn name(&self) -> &'static str {
        match self {
            Language::Html => "html",
            Language::Python => "python",
            Language::Sql => "sql",
            Language::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a language name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language '{0}' (expected html, python or sql)")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" => Ok(Language::Html),
            "python" | "py" => Ok(Language::Python),
            "sql" => Ok(Language::Sql),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}
