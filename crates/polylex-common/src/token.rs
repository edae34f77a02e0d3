use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::span::Position;

/// Kind used by every scanner for characters no other rule accepts.
pub const INVALID: &str = "INVALID";

/// Prefix marking token kinds that describe malformed input.
pub const ERROR_PREFIX: &str = "ERROR_";

/// A classified lexeme with its source position.
///
/// `kind` uses the vocabulary of the scanner that produced the token
/// (`"KEYWORD"`, `"RESERVED_TAG"`, `"ERROR_UNTERMINATED_STRING"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub value: String,
    pub kind: &'static str,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subkind: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Token {
    pub fn new(value: impl Into<String>, kind: &'static str, position: Position) -> Self {
        Self {
            value: value.into(),
            kind,
            position,
            subkind: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_subkind(mut self, subkind: impl Into<String>) -> Self {
        self.subkind = Some(subkind.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn line(&self) -> usize {
        self.position.line
    }

    pub fn column(&self) -> usize {
        self.position.column
    }

    /// True for tokens produced by an error-shaped rule or the catch-all.
    pub fn is_error(&self) -> bool {
        self.kind == INVALID || self.kind.starts_with(ERROR_PREFIX)
    }

    pub fn is(&self, kind: &str, value: &str) -> bool {
        self.kind == kind && self.value == value
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_by_naming_convention() {
        let pos = Position::start();
        assert!(Token::new("$", INVALID, pos).is_error());
        assert!(Token::new("\"ab", "ERROR_UNTERMINATED_STRING", pos).is_error());
        assert!(!Token::new("abc", "IDENTIFIER", pos).is_error());
    }

    #[test]
    fn builder_sets_subkind_and_attributes() {
        let token = Token::new("<a href=\"x\">", "RESERVED_TAG", Position::start())
            .with_subkind("a")
            .with_attribute("href", "x");
        assert_eq!(token.subkind.as_deref(), Some("a"));
        assert_eq!(token.attribute("href"), Some("x"));
        assert_eq!(token.attribute("id"), None);
        assert_eq!(token.to_string(), "RESERVED_TAG(<a href=\"x\">)");
    }
}
