use polylex_common::token::INVALID;
use polylex_common::{Symbol, SymbolKind, SymbolTable, Token};

use super::rules::{RuleSet, ScanMode, NEWLINE, WHITESPACE};
use super::{excerpt, ScanError, Scanner};
use crate::language::Language;

pub const COMMENT: &str = "COMMENT";
pub const STRING: &str = "STRING";
pub const KEYWORD: &str = "KEYWORD";
pub const DATATYPE: &str = "DATATYPE";
pub const NUMBER: &str = "NUMBER";
pub const IDENTIFIER: &str = "IDENTIFIER";
pub const OPERATOR: &str = "OPERATOR";
pub const PUNCTUATION: &str = "PUNCTUATION";
pub const ERROR_UNTERMINATED_STRING: &str = "ERROR_UNTERMINATED_STRING";
pub const ERROR_INVALID_IDENTIFIER: &str = "ERROR_INVALID_IDENTIFIER";

/// Scope used for identifier symbols recorded while lexing.
pub const LEXICAL_SCOPE: &str = "lexical";

const RULES: &[(&str, &str)] = &[
    (COMMENT, r"--[^\n]*|/\*[\s\S]*?\*/"),
    (STRING, r"'(?:[^']|'')*'"),
    (ERROR_UNTERMINATED_STRING, r"'[^']*"),
    (
        KEYWORD,
        r"\b(?:SELECT|FROM|WHERE|INSERT|INTO|VALUES|UPDATE|SET|DELETE|CREATE|TABLE|DROP|ALTER|ADD|PRIMARY|KEY|FOREIGN|REFERENCES|NOT|NULL|AND|OR|IN|IS|LIKE|BETWEEN|JOIN|INNER|LEFT|RIGHT|OUTER|FULL|ON|AS|GROUP|BY|ORDER|HAVING|LIMIT|OFFSET|DISTINCT|UNIQUE|DEFAULT|INDEX|VIEW|DATABASE|UNION|ALL|ASC|DESC|EXISTS|CHECK|CONSTRAINT|AUTO_INCREMENT|TRUE|FALSE|IF|CASCADE)\b",
    ),
    (
        DATATYPE,
        r"\b(?:INT|INTEGER|SMALLINT|BIGINT|TINYINT|DECIMAL|NUMERIC|FLOAT|REAL|DOUBLE|VARCHAR|CHAR|TEXT|DATE|DATETIME|TIMESTAMP|TIME|BOOLEAN|BOOL|BLOB)\b",
    ),
    (ERROR_INVALID_IDENTIFIER, r"\d+[a-z_][a-z0-9_]*"),
    (NUMBER, r"\d+(?:\.\d+)?"),
    (IDENTIFIER, r#"[a-z_][a-z0-9_$]*|`[^`]*`|"[^"]*""#),
    (OPERATOR, r"<>|!=|<=|>=|\|\||[=<>+\-*/%]"),
    (PUNCTUATION, r"[(),;.]"),
    (WHITESPACE, r"[ \t\r]+"),
    (NEWLINE, r"\n"),
    (INVALID, r"(?s)."),
];

/// Keywords that begin a statement.
pub const STATEMENT_KEYWORDS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP"];

pub fn is_keyword(token: &Token, keyword: &str) -> bool {
    token.kind == KEYWORD && token.value.eq_ignore_ascii_case(keyword)
}

pub fn is_punct(token: &Token, value: &str) -> bool {
    token.is(PUNCTUATION, value)
}

pub fn is_statement_keyword(token: &Token) -> bool {
    token.kind == KEYWORD
        && STATEMENT_KEYWORDS
            .iter()
            .any(|k| token.value.eq_ignore_ascii_case(k))
}

/// Identifier text with quoting removed.
pub fn identifier_name(token: &Token) -> &str {
    let value = token.value.as_str();
    let quoted = value.len() >= 2
        && ((value.starts_with('`') && value.ends_with('`'))
            || (value.starts_with('"') && value.ends_with('"')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Drop comments, which no later stage looks at.
pub fn significant(tokens: &[Token]) -> Vec<&Token> {
    tokens.iter().filter(|t| t.kind != COMMENT).collect()
}

/// Split a script into statements at `;` and at top-level statement
/// keywords, so a missing semicolon does not hide the next statement.
pub fn statements(tokens: &[Token]) -> Vec<Vec<&Token>> {
    let mut out = Vec::new();
    let mut current: Vec<&Token> = Vec::new();
    let mut depth = 0i32;
    for token in significant(tokens) {
        if is_punct(token, ";") {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            depth = 0;
            continue;
        }
        if depth <= 0
            && is_statement_keyword(token)
            && !current.is_empty()
            && !continues_statement(&current, token)
        {
            out.push(std::mem::take(&mut current));
            depth = 0;
        }
        if is_punct(token, "(") {
            depth += 1;
        } else if is_punct(token, ")") {
            depth -= 1;
        }
        current.push(token);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// `INSERT ... SELECT`, `CREATE VIEW ... AS SELECT` and `UNION SELECT`
/// keep a nested SELECT inside the current statement.
fn continues_statement(current: &[&Token], token: &Token) -> bool {
    if !is_keyword(token, "SELECT") {
        return false;
    }
    let leader = current[0];
    let previous = current[current.len() - 1];
    is_keyword(leader, "INSERT")
        || is_keyword(leader, "CREATE")
        || is_keyword(previous, "UNION")
        || is_keyword(previous, "ALL")
}

pub fn is_any_keyword(token: &Token, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| is_keyword(token, k))
}

/// Index of the first top-level token satisfying `pred` at or after `from`.
pub fn find_top_level(
    stmt: &[&Token],
    from: usize,
    pred: impl Fn(&Token) -> bool,
) -> Option<usize> {
    let mut depth = 0i32;
    for (i, token) in stmt.iter().enumerate().skip(from) {
        if depth <= 0 && pred(*token) {
            return Some(i);
        }
        if is_punct(token, "(") {
            depth += 1;
        } else if is_punct(token, ")") {
            depth -= 1;
        }
    }
    None
}

/// Scanner for SQL scripts.
///
/// Uses a single leftmost-first alternation searched forward through the
/// input; column numbers keep counting across newlines.
#[derive(Debug)]
pub struct SqlScanner {
    rules: RuleSet,
}

impl SqlScanner {
    pub fn new() -> Result<Self, ScanError> {
        Ok(Self {
            rules: RuleSet::new(RULES, ScanMode::Unanchored, true)?,
        })
    }
}

impl Scanner for SqlScanner {
    fn language(&self) -> Language {
        Language::Sql
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn error_message(&self, token: &Token) -> String {
        match token.kind {
            ERROR_UNTERMINATED_STRING => {
                format!("Unterminated string literal {}", excerpt(&token.value))
            }
            ERROR_INVALID_IDENTIFIER => format!(
                "Invalid identifier '{}': identifiers cannot start with a digit",
                token.value
            ),
            _ => format!("Invalid character '{}'", token.value),
        }
    }

    fn record_symbols(&self, tokens: &[Token], symbols: &mut SymbolTable) {
        for token in tokens.iter().filter(|t| t.kind == IDENTIFIER) {
            let name = identifier_name(token);
            let key = SymbolTable::qualified_key(LEXICAL_SCOPE, name);
            if symbols.contains(&key) {
                continue;
            }
            symbols.insert_with_key(
                key,
                Symbol::new(name, SymbolKind::Unknown, token.position).with_scope(LEXICAL_SCOPE),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        SqlScanner::new().unwrap().tokenize(source).unwrap()
    }

    fn lex_kinds(source: &str) -> Vec<&'static str> {
        lex(source).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn select_statement() {
        assert_eq!(
            lex_kinds("SELECT name, age FROM users WHERE age >= 18;"),
            vec![
                KEYWORD,
                IDENTIFIER,
                PUNCTUATION,
                IDENTIFIER,
                KEYWORD,
                IDENTIFIER,
                KEYWORD,
                IDENTIFIER,
                OPERATOR,
                NUMBER,
                PUNCTUATION
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = lex("select Selected from t");
        assert_eq!(tokens[0].kind, KEYWORD);
        assert_eq!(tokens[1].kind, IDENTIFIER);
        assert!(is_keyword(&tokens[2], "FROM"));
    }

    #[test]
    fn strings_types_and_comments() {
        assert_eq!(
            lex_kinds("-- note\nCREATE TABLE t (d DATE DEFAULT 'it''s');"),
            vec![
                COMMENT,
                KEYWORD,
                KEYWORD,
                IDENTIFIER,
                PUNCTUATION,
                IDENTIFIER,
                DATATYPE,
                KEYWORD,
                STRING,
                PUNCTUATION,
                PUNCTUATION
            ]
        );
    }

    #[test]
    fn lexical_errors() {
        let output = SqlScanner::new()
            .unwrap()
            .analyze_lexical("SELECT 1abc, # FROM t WHERE x = 'open")
            .unwrap();
        let messages: Vec<_> = output.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].starts_with("Invalid identifier '1abc'"));
        assert_eq!(messages[1], "Invalid character '#'");
        assert!(messages[2].starts_with("Unterminated string literal"));
    }

    #[test]
    fn columns_keep_counting_across_lines() {
        let tokens = lex("SELECT a\nFROM t;");
        let from = &tokens[2];
        assert_eq!(from.line(), 2);
        assert_eq!(from.column(), 10);
    }

    #[test]
    fn quoted_identifiers() {
        let tokens = lex("SELECT `order`, \"group\" FROM t");
        assert_eq!(identifier_name(&tokens[1]), "order");
        assert_eq!(identifier_name(&tokens[3]), "group");
    }

    #[test]
    fn identifiers_recorded_once() {
        let output = SqlScanner::new()
            .unwrap()
            .analyze_lexical("SELECT a FROM t WHERE a > 1")
            .unwrap();
        assert_eq!(output.symbols.len(), 2);
        let a = output.symbols.get("lexical.a").unwrap();
        assert_eq!(a.kind, SymbolKind::Unknown);
        assert_eq!(a.declaration_column(), 8);
    }
}
