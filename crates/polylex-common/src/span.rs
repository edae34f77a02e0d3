use serde::{Deserialize, Serialize};

/// Source position (1-based line/column, 0-based byte offset).
///
/// A default position (`0:0`) marks a diagnostic that has no location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
    /// 0-based byte offset from start of input.
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// The position of the first character of an input.
    pub fn start() -> Self {
        Self::new(1, 1, 0)
    }

    /// True when this position does not point into the source.
    pub fn is_unknown(&self) -> bool {
        self.line == 0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_positionless() {
        let pos = Position::default();
        assert!(pos.is_unknown());
        assert_eq!(pos.to_string(), "0:0");
    }

    #[test]
    fn start_position() {
        let pos = Position::start();
        assert_eq!((pos.line, pos.column, pos.offset), (1, 1, 0));
        assert!(!pos.is_unknown());
    }
}
