use polylex_common::{AnalysisError, DiagnosticBag, ErrorKind, Token};

use super::StructuralAnalyzer;
use crate::lexer::python::{
    has_block_colon, is_bracket, is_keyword, logical_lines, LogicalLine, BLOCK_KEYWORDS, BRACKET,
    COMMENT, IDENTIFIER, OPERATOR,
};

/// Operators that may directly follow another operator (unary forms and
/// star-unpacking).
const SECOND_OPERATORS: &[&str] = &["+", "-", "~", "*", "**"];

fn closer_for(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

/// Keywords a continuation clause may follow at the same indentation.
fn openers_for(keyword: &str) -> Option<&'static [&'static str]> {
    const ELIF: &[&str] = &["if", "elif"];
    const ELSE: &[&str] = &["if", "elif", "for", "while", "try", "except"];
    const EXCEPT: &[&str] = &["try", "except"];
    const FINALLY: &[&str] = &["try", "except", "else"];
    match keyword {
        "elif" => Some(ELIF),
        "else" => Some(ELSE),
        "except" => Some(EXCEPT),
        "finally" => Some(FINALLY),
        _ => None,
    }
}

/// Brackets, block headers, operator runs and indentation.
///
/// Block structure is inferred from indentation columns alone; there is no
/// statement grammar behind it.
#[derive(Debug)]
pub struct PythonStructure {
    indent_width: usize,
}

impl Default for PythonStructure {
    fn default() -> Self {
        Self::new(4)
    }
}

impl PythonStructure {
    pub fn new(indent_width: usize) -> Self {
        Self {
            indent_width: indent_width.max(1),
        }
    }
}

impl StructuralAnalyzer for PythonStructure {
    fn analyze(&self, tokens: &[Token]) -> Vec<AnalysisError> {
        let code: Vec<&Token> = tokens.iter().filter(|t| t.kind != COMMENT).collect();
        let mut checker = Checker {
            indent_width: self.indent_width,
            diagnostics: DiagnosticBag::new(ErrorKind::Syntactic),
        };
        checker.check_brackets(&code);
        checker.check_operators(&code);

        let lines = logical_lines(tokens);
        for (i, line) in lines.iter().enumerate() {
            checker.check_header(line);
            checker.check_indentation(line);
            checker.check_alignment(&lines, i);
        }
        checker.diagnostics.into_diagnostics()
    }
}

struct Checker {
    indent_width: usize,
    diagnostics: DiagnosticBag,
}

impl Checker {
    fn check_brackets(&mut self, code: &[&Token]) {
        let mut stack: Vec<&Token> = Vec::new();
        for &token in code.iter().filter(|t| t.kind == BRACKET) {
            match token.value.as_str() {
                "(" | "[" | "{" => stack.push(token),
                close => match stack.pop() {
                    None => self.diagnostics.error(
                        format!("Closing bracket '{}' has no matching opening bracket", close),
                        token,
                    ),
                    Some(open) if closer_for(&open.value) != close => self.diagnostics.error(
                        format!(
                            "Mismatched bracket: '{}' opened at line {}, column {} is closed by '{}'",
                            open.value,
                            open.line(),
                            open.column(),
                            close
                        ),
                        token,
                    ),
                    Some(_) => {}
                },
            }
        }
        for open in stack {
            self.diagnostics
                .error(format!("Unclosed bracket '{}'", open.value), open);
        }
    }

    fn check_operators(&mut self, code: &[&Token]) {
        for pair in code.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            if first.kind == OPERATOR
                && second.kind == OPERATOR
                && first.line() == second.line()
                && !SECOND_OPERATORS.contains(&second.value.as_str())
            {
                self.diagnostics.error(
                    format!(
                        "Unexpected operator '{}' after '{}'",
                        second.value, first.value
                    ),
                    second,
                );
            }
        }
    }

    fn check_header(&mut self, line: &LogicalLine<'_>) {
        let statement = line.statement();
        let Some(head) = line.head() else {
            return;
        };
        let Some(keyword) = line.head_keyword() else {
            return;
        };
        if !BLOCK_KEYWORDS.contains(&keyword) && keyword != "finally" {
            return;
        }

        if !has_block_colon(statement) {
            self.diagnostics
                .error(format!("Missing ':' after '{}' statement", keyword), head);
        }

        match keyword {
            "def" | "class" => {
                let named = statement.get(1).is_some_and(|t| t.kind == IDENTIFIER);
                if !named {
                    self.diagnostics
                        .error(format!("Expected a name after '{}'", keyword), head);
                }
                let has_paren = statement
                    .iter()
                    .any(|t| t.line() == head.line() && is_bracket(t, "("));
                if keyword == "def" && !has_paren {
                    self.diagnostics
                        .error("Missing '(' in function definition", head);
                }
            }
            "for" => {
                if !statement.iter().any(|t| is_keyword(t, "in")) {
                    self.diagnostics.error("Missing 'in' in 'for' loop", head);
                }
            }
            _ => {}
        }
    }

    fn check_indentation(&mut self, line: &LogicalLine<'_>) {
        let (Some(indent), Some(first)) = (line.indent, line.tokens.first()) else {
            return;
        };
        if indent.contains('\t') {
            if indent.contains(' ') {
                self.diagnostics
                    .warning("Indentation mixes tabs and spaces", first);
            }
            return;
        }
        if indent.len() % self.indent_width != 0 {
            self.diagnostics.error(
                format!(
                    "Indentation of {} spaces is not a multiple of {}",
                    indent.len(),
                    self.indent_width
                ),
                first,
            );
        }
    }

    /// `else`, `elif`, `except` and `finally` must sit at the same column as
    /// an opener they can continue. Deeper lines (the block body) are
    /// skipped; the first shallower or same-level non-opener ends the search.
    fn check_alignment(&mut self, lines: &[LogicalLine<'_>], index: usize) {
        let line = &lines[index];
        let (Some(head), Some(keyword)) = (line.head(), line.head_keyword()) else {
            return;
        };
        let Some(openers) = openers_for(keyword) else {
            return;
        };
        let level = line.level();
        for previous in lines[..index].iter().rev() {
            let previous_level = previous.level();
            if previous_level > level {
                continue;
            }
            if previous_level == level
                && previous
                    .head_keyword()
                    .is_some_and(|k| openers.contains(&k))
            {
                return;
            }
            break;
        }
        self.diagnostics.error(
            format!(
                "'{}' has no matching '{}' block at the same indentation",
                keyword,
                openers.join("' / '")
            ),
            head,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{PythonScanner, Scanner};
    use polylex_common::Severity;

    fn analyze(source: &str) -> Vec<AnalysisError> {
        let tokens = PythonScanner::new().unwrap().tokenize(source).unwrap();
        PythonStructure::default().analyze(&tokens)
    }

    fn messages(source: &str) -> Vec<String> {
        analyze(source).into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn well_formed_program_is_clean() {
        let source = "\
import os

class Point:
    def __init__(self, x, y):
        self.x = x
        self.y = y

def total(values, *rest):
    result = 0
    for v in values:
        if v > 0:
            result += v
        elif v == 0:
            continue
        else:
            result -= -v
    try:
        print(result)
    except ValueError:
        pass
    finally:
        pass
    data = {
      'a': [1, 2],
    }
    return result  # done
";
        let found = messages(source);
        assert!(found.is_empty(), "{:?}", found);
    }

    #[test]
    fn missing_colon() {
        assert_eq!(
            messages("if x > 1\n    pass\n"),
            vec!["Missing ':' after 'if' statement"]
        );
    }

    #[test]
    fn colon_inside_brackets_does_not_count() {
        let found = messages("while f(lambda a: a)\n    pass\n");
        assert_eq!(found, vec!["Missing ':' after 'while' statement"]);
    }

    #[test]
    fn bracket_diagnostics() {
        let mismatched = messages("print((1, 2]\n");
        assert!(mismatched[0].starts_with("Mismatched bracket: '(' opened at line 1, column 7"));
        assert!(mismatched.contains(&"Unclosed bracket '('".to_string()));
        assert_eq!(
            messages("x = 1)\n"),
            vec!["Closing bracket ')' has no matching opening bracket"]
        );
    }

    #[test]
    fn consecutive_operators() {
        assert_eq!(
            messages("x = 1 * / 2\n"),
            vec!["Unexpected operator '/' after '*'"]
        );
        assert!(messages("x = 1 + -2\ny = f(*a, **k)\n").is_empty());
    }

    #[test]
    fn definition_headers() {
        assert_eq!(
            messages("def (a):\n    pass\n"),
            vec!["Expected a name after 'def'"]
        );
        assert_eq!(
            messages("def f:\n    pass\n"),
            vec!["Missing '(' in function definition"]
        );
        assert_eq!(
            messages("for x range(3):\n    pass\n"),
            vec!["Missing 'in' in 'for' loop"]
        );
    }

    #[test]
    fn odd_indentation_is_an_error() {
        let found = analyze("if x:\n   y = 1\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "Indentation of 3 spaces is not a multiple of 4");
        assert_eq!(found[0].severity, Severity::Error);
        assert!(found[0].is_blocking());
    }

    #[test]
    fn mixed_tabs_and_spaces_is_a_warning() {
        let found = analyze("if x:\n\t    y = 1\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "Indentation mixes tabs and spaces");
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn continuation_lines_are_not_indentation_checked() {
        assert!(messages("total = add(\n  1,\n  2)\n").is_empty());
    }

    #[test]
    fn misaligned_else() {
        let found = messages("if x:\n    y = 1\n  else:\n    y = 2\n");
        assert!(found
            .iter()
            .any(|m| m.starts_with("'else' has no matching 'if' / 'elif'")));
    }

    #[test]
    fn else_after_unrelated_statement() {
        let found = messages("if x:\n    y = 1\nz = 2\nelse:\n    y = 3\n");
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("'else' has no matching"));
    }

    #[test]
    fn custom_indent_width() {
        let tokens = PythonScanner::new()
            .unwrap()
            .tokenize("if x:\n  y = 1\n")
            .unwrap();
        assert!(PythonStructure::new(2).analyze(&tokens).is_empty());
        assert_eq!(PythonStructure::new(4).analyze(&tokens).len(), 1);
    }
}
