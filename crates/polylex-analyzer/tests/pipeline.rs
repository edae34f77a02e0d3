//! End-to-end tests: source text → detection → lexing → structure → semantics → trace.

use polylex_analyzer::lexer::{HtmlScanner, PythonScanner, Scanner, SqlScanner};
use polylex_analyzer::{detect, run_analysis, AnalysisResult, Language, Pipeline};
use polylex_common::{AnalysisOptions, ErrorKind, SymbolKind, Token};

fn run_as(source: &str, language: Language) -> AnalysisResult {
    Pipeline::new(AnalysisOptions::default())
        .expect("builtin front ends compile")
        .run_as(source, language)
}

fn messages(result: &AnalysisResult, kind: ErrorKind) -> Vec<&str> {
    result
        .diagnostics()
        .filter(|d| d.kind == kind)
        .map(|d| d.message.as_str())
        .collect()
}

/// Every token's lexeme sits at its offset, and its line/column agree with a
/// manual count over the preceding text. SQL columns keep counting across
/// newlines.
fn assert_positions(source: &str, tokens: &[Token], columns_reset: bool) {
    for token in tokens {
        let offset = token.position.offset;
        assert_eq!(
            &source[offset..offset + token.value.len()],
            token.value,
            "lexeme mismatch for {:?}",
            token
        );
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let column = if columns_reset {
            before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1
        } else {
            before.chars().count() + 1
        };
        assert_eq!((token.line(), token.column()), (line, column), "{:?}", token);
    }
}

#[test]
fn detects_each_language() {
    assert_eq!(detect("SELECT * FROM t;"), Language::Sql);
    assert_eq!(detect("<html><body></body></html>"), Language::Html);
    assert_eq!(detect("def f():\n    return 1\n"), Language::Python);
    assert_eq!(detect(""), Language::Unknown);
    assert_eq!(detect("hello world"), Language::Unknown);
}

#[test]
fn positions_match_manual_count() {
    let python = "def add(a, b):\n    return a + b\n\ntotal = add(1, 2)  # three\nprint(total)\n";
    assert_positions(
        python,
        &PythonScanner::new().unwrap().tokenize(python).unwrap(),
        true,
    );

    let sql = "CREATE TABLE t (\n  id INT PRIMARY KEY,\n  name TEXT\n);\nSELECT name\nFROM t;";
    assert_positions(sql, &SqlScanner::new().unwrap().tokenize(sql).unwrap(), false);

    let html = "<!DOCTYPE html>\n<html>\n  <body>\n    <p class=\"a\">Hi &amp; bye</p>\n  </body>\n</html>";
    assert_positions(html, &HtmlScanner::new().unwrap().tokenize(html).unwrap(), true);
}

#[test]
fn badly_nested_markup() {
    let result = run_analysis("<div><span></div>");
    assert_eq!(result.language, Language::Html);
    let structural = messages(&result, ErrorKind::Syntactic);
    let nested: Vec<_> = structural
        .iter()
        .filter(|m| m.starts_with("Badly nested"))
        .collect();
    assert_eq!(nested.len(), 1);
    assert!(nested[0].contains("span") && nested[0].contains("div"));
    assert!(!result.success);
}

#[test]
fn title_is_required_once() {
    let missing = run_as(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"></head><body></body></html>",
        Language::Html,
    );
    let titles: Vec<_> = messages(&missing, ErrorKind::Semantic)
        .into_iter()
        .filter(|m| m.starts_with("Missing <title>"))
        .collect();
    assert_eq!(titles.len(), 1);

    let duplicated = run_as(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>a</title><title>b</title></head><body></body></html>",
        Language::Html,
    );
    assert!(messages(&duplicated, ErrorKind::Semantic).contains(&"Duplicate <title> element"));
}

#[test]
fn complete_document_succeeds_without_errors() {
    let result = run_analysis(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>T</title></head>\n<body><h1 id=\"top\">Hi</h1><a href=\"#top\">up</a></body>\n</html>\n",
    );
    assert_eq!(result.language, Language::Html);
    assert_eq!(result.error_count(), 0, "{:?}", result.diagnostics().collect::<Vec<_>>());
    assert!(result.success);
    assert!(result.symbols.of_kind(SymbolKind::Tag).next().is_some());
}

#[test]
fn declared_names_are_not_undeclared() {
    let result = run_as("x = 1\nprint(x)\n", Language::Python);
    assert!(!messages(&result, ErrorKind::Semantic)
        .iter()
        .any(|m| m.starts_with("Undeclared")));
    assert!(result.success);
}

#[test]
fn unknown_name_is_undeclared_once() {
    let result = run_as("print(y)\n", Language::Python);
    let undeclared: Vec<_> = messages(&result, ErrorKind::Semantic)
        .into_iter()
        .filter(|m| m.starts_with("Undeclared"))
        .collect();
    assert_eq!(undeclared, vec!["Undeclared variable 'y'"]);
    assert!(result.success);
}

#[test]
fn python_program_end_to_end() {
    let source = "def add(a, b):\n    return a + b\n\ntotal = add(1, 2)\nprint(total)\n";
    let result = run_analysis(source);
    assert_eq!(result.language, Language::Python);
    assert!(result.success);
    assert!(result.symbols.get_kind("add", SymbolKind::Function).is_some());
    assert!(result.symbols.get_kind("total", SymbolKind::Variable).is_some());
    assert_eq!(result.trace.len(), 4);
    assert!(result.trace[0].ends_with("define function 'add' (2 parameters)"));
}

#[test]
fn delete_without_where_is_flagged() {
    let risky = run_analysis("DELETE FROM t;");
    assert_eq!(risky.language, Language::Sql);
    assert!(messages(&risky, ErrorKind::Semantic)
        .contains(&"DELETE without WHERE clause removes every row from 't'"));
    assert!(risky.success);

    let safe = run_analysis("DELETE FROM t WHERE id=1;");
    assert!(safe.semantic_errors.is_empty(), "{:?}", safe.semantic_errors);
}

#[test]
fn sql_schema_end_to_end() {
    let source = "\
CREATE TABLE users (id INT PRIMARY KEY, name TEXT NOT NULL);
INSERT INTO users (id, name) VALUES (1, 'ann');
SELECT email FROM users;
";
    let result = run_analysis(source);
    assert_eq!(result.language, Language::Sql);
    assert_eq!(
        messages(&result, ErrorKind::Semantic),
        vec!["Column 'email' does not exist in table 'users'"]
    );
    assert!(result.symbols.get_kind("users", SymbolKind::Table).is_some());
    assert!(result.symbols.contains("users.name"));
    assert_eq!(result.trace.len(), 3);
}

#[test]
fn missing_clause_blocks_success() {
    let result = run_analysis("SELECT name users;");
    assert_eq!(result.language, Language::Sql);
    assert!(result.syntactic_errors.iter().any(|d| d.is_blocking()));
    assert!(!result.success);
}

#[test]
fn runs_are_deterministic() {
    let sources = [
        "<div><span></div>",
        "def f(a):\n    return a\nprint(f(1, 2))\n",
        "CREATE TABLE t (id INT);\nINSERT INTO t VALUES ('x');\nDELETE FROM t;",
    ];
    for source in sources {
        let first = run_analysis(source);
        let second = run_analysis(source);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
