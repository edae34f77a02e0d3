use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::language::Language;

const PYTHON_SIGNATURES: &[&str] = &[
    r"\b(?:def|class|import|from|return|elif|else|lambda|yield|pass|print|self|while|for|in|not|and|or|try|except|finally|with|as|if|is|raise|global)\b",
    r"(?m)^[ \t]*#",
    r"\b(?:True|False|None)\b",
];

const SQL_SIGNATURES: &[&str] = &[
    r"(?i)\b(?:SELECT|FROM|WHERE|INSERT|INTO|VALUES|UPDATE|SET|DELETE|CREATE|TABLE|DROP|ALTER|JOIN|INNER|LEFT|RIGHT|GROUP|ORDER|BY|HAVING|PRIMARY|FOREIGN|KEY|REFERENCES|DISTINCT|LIMIT|UNION)\b",
    r"(?i)\b(?:INT|INTEGER|VARCHAR|CHAR|TEXT|DATE|DATETIME|TIMESTAMP|DECIMAL|NUMERIC|FLOAT|BOOLEAN)\b",
    r"(?m)^[ \t]*--",
    r"/\*",
];

const HTML_SIGNATURES: &[&str] = &[
    r"<[^<>]+>",
    r"(?i)</?\s*(?:html|head|body|title|div|p|span|meta|link|script|style|!doctype)\b",
];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static PYTHON: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(PYTHON_SIGNATURES));
static SQL: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(SQL_SIGNATURES));
static HTML: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_all(HTML_SIGNATURES));

fn count_matches(signatures: &[Regex], text: &str) -> usize {
    signatures.iter().map(|re| re.find_iter(text).count()).sum()
}

/// Number of signature-pattern matches per language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionScores {
    pub html: usize,
    pub python: usize,
    pub sql: usize,
}

impl DetectionScores {
    /// The language whose score is strictly greater than both others.
    pub fn winner(&self) -> Language {
        let DetectionScores { html, python, sql } = *self;
        if html > python && html > sql {
            Language::Html
        } else if python > html && python > sql {
            Language::Python
        } else if sql > html && sql > python {
            Language::Sql
        } else {
            Language::Unknown
        }
    }
}

/// Score `text` against every language's signatures.
pub fn score(text: &str) -> DetectionScores {
    if text.trim().is_empty() {
        return DetectionScores::default();
    }
    DetectionScores {
        html: count_matches(&HTML, text),
        python: count_matches(&PYTHON, text),
        sql: count_matches(&SQL, text),
    }
}

/// Detect the language of `text`. Ties and blank input give `Unknown`.
pub fn detect(text: &str) -> Language {
    let scores = score(text);
    let language = scores.winner();
    log::debug!(
        "language scores html={} python={} sql={} -> {}",
        scores.html,
        scores.python,
        scores.sql,
        language
    );
    language
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_signatures_compile() {
        assert_eq!(PYTHON.len(), PYTHON_SIGNATURES.len());
        assert_eq!(SQL.len(), SQL_SIGNATURES.len());
        assert_eq!(HTML.len(), HTML_SIGNATURES.len());
    }

    #[test]
    fn detects_sql() {
        let scores = score("SELECT * FROM t;");
        assert_eq!(scores.python, 0);
        assert_eq!(scores.html, 0);
        assert_eq!(detect("SELECT * FROM t;"), Language::Sql);
    }

    #[test]
    fn detects_html() {
        assert_eq!(detect("<html><body></body></html>"), Language::Html);
    }

    #[test]
    fn detects_python() {
        assert_eq!(detect("def f():\n    return 1\n"), Language::Python);
    }

    #[test]
    fn blank_input_is_unknown() {
        assert_eq!(detect(""), Language::Unknown);
        assert_eq!(detect("   \n\t "), Language::Unknown);
    }

    #[test]
    fn ties_are_unknown() {
        // One python keyword, one SQL keyword.
        let scores = score("def SELECT");
        assert_eq!(scores.python, 1);
        assert_eq!(scores.sql, 1);
        assert_eq!(detect("def SELECT"), Language::Unknown);
        assert_eq!(detect("hello world"), Language::Unknown);
    }

    #[test]
    fn lowercase_sql_beats_python_from() {
        assert_eq!(detect("select name from users where id = 1"), Language::Sql);
    }
}
