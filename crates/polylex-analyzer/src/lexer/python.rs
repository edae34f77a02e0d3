use polylex_common::token::INVALID;
use polylex_common::{Symbol, SymbolKind, SymbolTable, Token};

use super::rules::{RuleSet, ScanMode, NEWLINE, WHITESPACE};
use super::{excerpt, ScanError, Scanner};
use crate::language::Language;

pub const COMMENT: &str = "COMMENT";
pub const STRING: &str = "STRING";
pub const INTEGER: &str = "INTEGER";
pub const FLOAT: &str = "FLOAT";
pub const BOOLEAN: &str = "BOOLEAN";
pub const NONE: &str = "NONE";
pub const KEYWORD: &str = "KEYWORD";
pub const IDENTIFIER: &str = "IDENTIFIER";
pub const OPERATOR: &str = "OPERATOR";
pub const BRACKET: &str = "BRACKET";
pub const PUNCTUATION: &str = "PUNCTUATION";
pub const ERROR_MALFORMED_COMMENT: &str = "ERROR_MALFORMED_COMMENT";
pub const ERROR_UNTERMINATED_TRIPLE_STRING: &str = "ERROR_UNTERMINATED_TRIPLE_STRING";
pub const ERROR_UNTERMINATED_STRING: &str = "ERROR_UNTERMINATED_STRING";
pub const ERROR_MALFORMED_BINARY: &str = "ERROR_MALFORMED_BINARY";
pub const ERROR_MULTIPLE_DECIMAL: &str = "ERROR_MULTIPLE_DECIMAL";
pub const ERROR_MALFORMED_EXPONENT: &str = "ERROR_MALFORMED_EXPONENT";
pub const ERROR_IDENTIFIER_STARTS_WITH_DIGIT: &str = "ERROR_IDENTIFIER_STARTS_WITH_DIGIT";
pub const ERROR_OPERATOR_SEQUENCE: &str = "ERROR_OPERATOR_SEQUENCE";

/// Attribute holding the raw leading whitespace of a token's line; set on
/// the first token of every physical line.
pub const INDENT_ATTRIBUTE: &str = "indent";

const RULES: &[(&str, &str)] = &[
    (NEWLINE, r"\r?\n"),
    (WHITESPACE, r"[ \t\f]+|\\\r?\n"),
    (ERROR_MALFORMED_COMMENT, r"##[^\n]*"),
    (COMMENT, r"#[^\n]*"),
    (STRING, r#"(?:[rRbBuUfF]{1,2})?(?:"""[\s\S]*?"""|'''[\s\S]*?''')"#),
    (ERROR_UNTERMINATED_TRIPLE_STRING, r#"(?:[rRbBuUfF]{1,2})?(?:"""|''')[\s\S]*"#),
    (
        ERROR_UNTERMINATED_STRING,
        r#"(?m)(?:[rRbBuUfF]{1,2})?(?:"(?:[^"\\\n]|\\.)*$|'(?:[^'\\\n]|\\.)*$)"#,
    ),
    (STRING, r#"(?:[rRbBuUfF]{1,2})?(?:"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*')"#),
    (INTEGER, r"0[xX][0-9a-fA-F_]+\b|0[oO][0-7_]+\b|0[bB][01_]+\b"),
    (FLOAT, r"(?:\d[\d_]*\.(?:\d[\d_]*)?|\.\d[\d_]*|\d[\d_]*)(?:[eE][+-]?\d+[jJ]?|[jJ])\b"),
    (
        ERROR_MALFORMED_EXPONENT,
        r"(?:\d[\d_]*\.(?:\d[\d_]*)?|\.\d[\d_]*|\d[\d_]*)[eE](?:[+-]|\b)",
    ),
    (ERROR_MALFORMED_BINARY, r"0[bB][01]*[2-9a-zA-Z_]\w*"),
    (ERROR_MULTIPLE_DECIMAL, r"\d[\d_]*\.\d*\.[\d.]*"),
    (ERROR_IDENTIFIER_STARTS_WITH_DIGIT, r"\d[\d_]*[a-zA-Z]\w*"),
    (FLOAT, r"\d[\d_]*\.(?:\d[\d_]*)?|\.\d[\d_]*"),
    (INTEGER, r"\d[\d_]*"),
    (BOOLEAN, r"(?:True|False)\b"),
    (NONE, r"None\b"),
    (
        KEYWORD,
        r"(?:and|as|assert|async|await|break|class|continue|def|del|elif|else|except|finally|for|from|global|if|import|in|is|lambda|nonlocal|not|or|pass|raise|return|try|while|with|yield)\b",
    ),
    (IDENTIFIER, r"[\p{L}_][\p{L}\p{N}_]*"),
    (
        ERROR_OPERATOR_SEQUENCE,
        r"\+{3,}|-{3,}|\*{3,}|/{3,}|={3,}|<{3,}|>{3,}|!{3,}|&{3,}|\|{3,}|%{3,}|\^{3,}",
    ),
    (
        OPERATOR,
        r"\*\*=|//=|>>=|<<=|\*\*|//|==|!=|<=|>=|\+=|-=|\*=|/=|%=|&=|\|=|\^=|@=|->|:=|<<|>>|[+\-*/%=<>&|^~@]",
    ),
    (BRACKET, r"[()\[\]{}]"),
    (PUNCTUATION, r"[:,.;]"),
    (INVALID, r"(?s)."),
];

/// Control keywords that open an indented block.
pub const BLOCK_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "try", "except", "with", "def", "class",
];

pub fn is_keyword(token: &Token, value: &str) -> bool {
    token.is(KEYWORD, value)
}

pub fn is_operator(token: &Token, value: &str) -> bool {
    token.is(OPERATOR, value)
}

pub fn is_punct(token: &Token, value: &str) -> bool {
    token.is(PUNCTUATION, value)
}

pub fn is_bracket(token: &Token, value: &str) -> bool {
    token.is(BRACKET, value)
}

pub fn is_literal(token: &Token) -> bool {
    matches!(token.kind, STRING | INTEGER | FLOAT | BOOLEAN | NONE)
}

/// Python type name of a literal token.
pub fn literal_type(token: &Token) -> Option<&'static str> {
    match token.kind {
        STRING => Some("str"),
        INTEGER => Some("int"),
        FLOAT => Some("float"),
        BOOLEAN => Some("bool"),
        NONE => Some("NoneType"),
        _ => None,
    }
}

/// Index of the bracket closing the one at `open`, if any.
pub fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.kind != BRACKET {
            continue;
        }
        match token.value.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// A parameter declared in a `def` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// `positional`, `varargs` or `kwargs`.
    pub style: &'static str,
    pub default: Option<String>,
    pub index: usize,
}

/// Parameters of the `def` whose `(` is at `open`.
pub fn parse_parameters(tokens: &[Token], open: usize) -> Vec<Parameter> {
    let Some(close) = matching_close(tokens, open) else {
        return Vec::new();
    };
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut segment: Vec<&Token> = Vec::new();
    let mut segments: Vec<Vec<&Token>> = Vec::new();
    for token in &tokens[open + 1..close] {
        if token.kind == BRACKET {
            match token.value.as_str() {
                "(" | "[" | "{" => depth += 1,
                _ => depth = depth.saturating_sub(1),
            }
        }
        if depth == 0 && is_punct(token, ",") {
            segments.push(std::mem::take(&mut segment));
        } else {
            segment.push(token);
        }
    }
    if !segment.is_empty() {
        segments.push(segment);
    }

    for seg in segments {
        let mut iter = seg.iter().copied().peekable();
        let style = match iter.peek() {
            Some(t) if is_operator(t, "*") => {
                iter.next();
                "varargs"
            }
            Some(t) if is_operator(t, "**") => {
                iter.next();
                "kwargs"
            }
            _ => "positional",
        };
        let Some(name) = iter.next().filter(|t| t.kind == IDENTIFIER) else {
            continue;
        };
        let rest: Vec<&Token> = iter.collect();
        let default = rest
            .iter()
            .position(|t| is_operator(t, "="))
            .map(|eq| {
                rest[eq + 1..]
                    .iter()
                    .map(|t| t.value.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            });
        params.push(Parameter {
            name: name.value.clone(),
            style,
            default,
            index: params.len(),
        });
    }
    params
}

/// One logical line: a physical line plus any lines it continues through
/// open brackets. Comments are not included.
#[derive(Debug, Clone)]
pub struct LogicalLine<'a> {
    pub tokens: Vec<&'a Token>,
    /// Raw leading whitespace of the first physical line.
    pub indent: Option<&'a str>,
}

impl<'a> LogicalLine<'a> {
    /// Tokens with a leading `async` removed.
    pub fn statement(&self) -> &[&'a Token] {
        match self.tokens.split_first() {
            Some((first, rest)) if is_keyword(first, "async") => rest,
            _ => &self.tokens,
        }
    }

    pub fn head(&self) -> Option<&'a Token> {
        self.statement().first().copied()
    }

    pub fn head_keyword(&self) -> Option<&'a str> {
        self.head()
            .filter(|t| t.kind == KEYWORD)
            .map(|t| t.value.as_str())
    }

    /// Zero-based column of the first token.
    pub fn level(&self) -> usize {
        self.tokens.first().map_or(0, |t| t.column().saturating_sub(1))
    }

    /// True for `if ...:`-style lines that open an indented block.
    pub fn opens_block(&self) -> bool {
        self.head_keyword()
            .is_some_and(|k| BLOCK_KEYWORDS.contains(&k) || k == "finally")
            && has_block_colon(self.statement())
    }
}

/// Group tokens into logical lines, dropping comments.
pub fn logical_lines(tokens: &[Token]) -> Vec<LogicalLine<'_>> {
    let mut lines: Vec<LogicalLine<'_>> = Vec::new();
    let mut depth = 0usize;
    for token in tokens.iter().filter(|t| t.kind != COMMENT) {
        let indent = token.attribute(INDENT_ATTRIBUTE);
        if lines.is_empty() || (indent.is_some() && depth == 0) {
            lines.push(LogicalLine {
                tokens: Vec::new(),
                indent,
            });
        }
        if token.kind == BRACKET {
            match token.value.as_str() {
                "(" | "[" | "{" => depth += 1,
                _ => depth = depth.saturating_sub(1),
            }
        }
        if let Some(line) = lines.last_mut() {
            line.tokens.push(token);
        }
    }
    lines
}

/// True when a `:` appears outside any brackets.
pub fn has_block_colon(tokens: &[&Token]) -> bool {
    let mut depth = 0usize;
    for token in tokens {
        if token.kind == BRACKET {
            match token.value.as_str() {
                "(" | "[" | "{" => depth += 1,
                _ => depth = depth.saturating_sub(1),
            }
        } else if depth == 0 && is_punct(token, ":") {
            return true;
        }
    }
    false
}

/// Scanner for Python source.
#[derive(Debug)]
pub struct PythonScanner {
    rules: RuleSet,
}

impl PythonScanner {
    pub fn new() -> Result<Self, ScanError> {
        Ok(Self {
            rules: RuleSet::new(RULES, ScanMode::Anchored, false)?,
        })
    }

    fn record_function(tokens: &[Token], def_idx: usize, symbols: &mut SymbolTable) {
        let Some(name) = tokens.get(def_idx + 1).filter(|t| t.kind == IDENTIFIER) else {
            return;
        };
        let params = match tokens.get(def_idx + 2) {
            Some(t) if is_bracket(t, "(") => parse_parameters(tokens, def_idx + 2),
            _ => Vec::new(),
        };
        symbols.insert(
            Symbol::new(name.value.as_str(), SymbolKind::Function, name.position)
                .with_type("function")
                .with_value(params.len().to_string())
                .initialized(),
        );
        for param in params {
            let mut symbol = Symbol::new(param.name.as_str(), SymbolKind::Parameter, name.position)
                .with_type(param.style)
                .with_scope(name.value.as_str())
                .initialized();
            symbol.value = param.default;
            symbols.insert_qualified(symbol);
        }
    }

    fn record_assignment(tokens: &[Token], idx: usize, symbols: &mut SymbolTable) {
        let target = &tokens[idx];
        if symbols.contains(&target.value) {
            return;
        }
        let rhs = tokens.get(idx + 2);
        let rhs_is_single = tokens
            .get(idx + 3)
            .map_or(true, |next| next.line() != target.line() || is_punct(next, ";"));
        let mut symbol = Symbol::new(target.value.as_str(), SymbolKind::Variable, target.position)
            .initialized();
        match rhs {
            Some(t) if rhs_is_single && is_literal(t) => {
                symbol = symbol
                    .with_type(literal_type(t).unwrap_or("unknown"))
                    .with_value(t.value.as_str());
            }
            Some(t) if is_bracket(t, "[") => symbol = symbol.with_type("list"),
            Some(t) if is_bracket(t, "{") => symbol = symbol.with_type("dict"),
            _ => {}
        }
        symbols.insert(symbol);
    }
}

fn starts_statement(tokens: &[Token], idx: usize) -> bool {
    idx == 0 || tokens[idx - 1].line() != tokens[idx].line() || is_punct(&tokens[idx - 1], ";")
}

impl Scanner for PythonScanner {
    fn language(&self) -> Language {
        Language::Python
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn error_message(&self, token: &Token) -> String {
        let value = excerpt(&token.value);
        match token.kind {
            ERROR_MALFORMED_COMMENT => {
                format!("Malformed comment '{}': use a single '#'", value)
            }
            ERROR_UNTERMINATED_TRIPLE_STRING => {
                format!("Unterminated triple-quoted string starting with {}", value)
            }
            ERROR_UNTERMINATED_STRING => {
                format!("Unterminated string literal {}", value)
            }
            ERROR_MALFORMED_BINARY => format!("Invalid binary literal '{}'", value),
            ERROR_MULTIPLE_DECIMAL => {
                format!("Invalid number '{}': multiple decimal points", value)
            }
            ERROR_MALFORMED_EXPONENT => {
                format!("Malformed float '{}': exponent has no digits", value)
            }
            ERROR_IDENTIFIER_STARTS_WITH_DIGIT => format!(
                "Invalid identifier '{}': identifiers cannot start with a digit",
                value
            ),
            ERROR_OPERATOR_SEQUENCE => format!("Invalid operator sequence '{}'", value),
            _ => format!("Invalid character '{}'", value),
        }
    }

    fn record_symbols(&self, tokens: &[Token], symbols: &mut SymbolTable) {
        for (i, token) in tokens.iter().enumerate() {
            if is_keyword(token, "def") {
                Self::record_function(tokens, i, symbols);
            } else if is_keyword(token, "class") {
                if let Some(name) = tokens.get(i + 1).filter(|t| t.kind == IDENTIFIER) {
                    symbols.insert(
                        Symbol::new(name.value.as_str(), SymbolKind::Class, name.position)
                            .with_type("class")
                            .initialized(),
                    );
                }
            } else if token.kind == IDENTIFIER
                && starts_statement(tokens, i)
                && tokens.get(i + 1).is_some_and(|t| is_operator(t, "="))
            {
                Self::record_assignment(tokens, i, symbols);
            }
        }
    }

    fn refine(&self, source: &str, tokens: Vec<Token>) -> Vec<Token> {
        let lines: Vec<&str> = source.split('\n').collect();
        let mut last_line = 0;
        tokens
            .into_iter()
            .map(|token| {
                if token.line() == last_line {
                    return token;
                }
                last_line = token.line();
                let text = lines.get(token.line() - 1).copied().unwrap_or("");
                let indent: String = text
                    .chars()
                    .take_while(|c| *c == ' ' || *c == '\t')
                    .collect();
                token.with_attribute(INDENT_ATTRIBUTE, indent)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        PythonScanner::new().unwrap().tokenize(source).unwrap()
    }

    fn lex_kinds(source: &str) -> Vec<&'static str> {
        lex(source).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_assignment() {
        assert_eq!(
            lex_kinds("x = 1 + 2.5"),
            vec![IDENTIFIER, OPERATOR, INTEGER, OPERATOR, FLOAT]
        );
    }

    #[test]
    fn keywords_beat_identifiers() {
        let tokens = lex("if iffy and None or True");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![KEYWORD, IDENTIFIER, KEYWORD, NONE, KEYWORD, BOOLEAN]
        );
    }

    #[test]
    fn strings_and_prefixes() {
        assert_eq!(
            lex_kinds("s = f\"a{b}\" + 'c' + \"\"\"doc\nmore\"\"\""),
            vec![IDENTIFIER, OPERATOR, STRING, OPERATOR, STRING, OPERATOR, STRING]
        );
    }

    #[test]
    fn unterminated_string_stops_at_line_end() {
        let tokens = lex("s = \"abc\nx = 1");
        assert_eq!(tokens[2].kind, ERROR_UNTERMINATED_STRING);
        assert_eq!(tokens[2].value, "\"abc");
        assert_eq!(tokens[3].kind, IDENTIFIER);
        assert_eq!(tokens[3].line(), 2);
    }

    #[test]
    fn numeric_forms() {
        assert_eq!(
            lex_kinds("0xFF 0b101 1e5 3j 1_000 .5"),
            vec![INTEGER, INTEGER, FLOAT, FLOAT, INTEGER, FLOAT]
        );
    }

    #[test]
    fn numeric_errors() {
        assert_eq!(
            lex_kinds("0b102 1.2.3 2abc"),
            vec![
                ERROR_MALFORMED_BINARY,
                ERROR_MULTIPLE_DECIMAL,
                ERROR_IDENTIFIER_STARTS_WITH_DIGIT
            ]
        );
    }

    #[test]
    fn operator_sequences() {
        assert_eq!(
            lex_kinds("a +++ b ** c **= d"),
            vec![
                IDENTIFIER,
                ERROR_OPERATOR_SEQUENCE,
                IDENTIFIER,
                OPERATOR,
                IDENTIFIER,
                OPERATOR,
                IDENTIFIER
            ]
        );
    }

    #[test]
    fn comments() {
        assert_eq!(
            lex_kinds("x # ok\n## bad"),
            vec![IDENTIFIER, COMMENT, ERROR_MALFORMED_COMMENT]
        );
    }

    #[test]
    fn invalid_character() {
        let output = PythonScanner::new().unwrap().analyze_lexical("x = $").unwrap();
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].message, "Invalid character '$'");
        assert_eq!(output.diagnostics[0].column(), 5);
    }

    #[test]
    fn indent_attribute_on_line_starts() {
        let tokens = lex("def f():\n    return 1\n");
        assert_eq!(tokens[0].attribute(INDENT_ATTRIBUTE), Some(""));
        let ret = tokens.iter().find(|t| is_keyword(t, "return")).unwrap();
        assert_eq!(ret.attribute(INDENT_ATTRIBUTE), Some("    "));
        assert_eq!(tokens[1].attribute(INDENT_ATTRIBUTE), None);
    }

    #[test]
    fn symbols_from_definitions() {
        let output = PythonScanner::new()
            .unwrap()
            .analyze_lexical("def add(a, b=2, *rest):\n    return a + b\nx = 10\nname = 'n'\n")
            .unwrap();
        let symbols = &output.symbols;
        let add = symbols.get("add").unwrap();
        assert_eq!(add.kind, SymbolKind::Function);
        assert_eq!(add.value.as_deref(), Some("3"));
        let b = symbols.get("add.b").unwrap();
        assert_eq!(b.kind, SymbolKind::Parameter);
        assert_eq!(b.value.as_deref(), Some("2"));
        assert_eq!(symbols.get("add.rest").unwrap().data_type, "varargs");
        assert_eq!(symbols.get("x").unwrap().data_type, "int");
        assert_eq!(symbols.get("name").unwrap().data_type, "str");
    }

    #[test]
    fn exponent_without_digits() {
        assert_eq!(
            lex_kinds("1.5e 2E+ 1else 1e5"),
            vec![
                ERROR_MALFORMED_EXPONENT,
                ERROR_MALFORMED_EXPONENT,
                ERROR_IDENTIFIER_STARTS_WITH_DIGIT,
                FLOAT
            ]
        );
        let output = PythonScanner::new().unwrap().analyze_lexical("x = 1.5e\n").unwrap();
        assert_eq!(
            output.diagnostics[0].message,
            "Malformed float '1.5e': exponent has no digits"
        );
    }

    #[test]
    fn unterminated_triple_string_runs_to_end() {
        let source = "x = 1\ndoc = \"\"\"abc\ny = 2\n";
        let tokens = lex(source);
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, ERROR_UNTERMINATED_TRIPLE_STRING);
        assert_eq!(last.value, "\"\"\"abc\ny = 2\n");
        assert_eq!((last.line(), last.column()), (2, 7));

        let output = PythonScanner::new().unwrap().analyze_lexical(source).unwrap();
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(
            output.diagnostics[0].message,
            "Unterminated triple-quoted string starting with \"\"\"abc..."
        );
    }
}
