//! Descriptive execution trace.
//!
//! Walks the token stream in source order and describes what each element,
//! statement or line would do. Nothing is executed and nothing here can
//! fail; malformed input simply produces fewer or vaguer lines.

use polylex_common::{SymbolKind, SymbolTable, Token};

use crate::language::Language;
use crate::lexer::{html, python, sql};

/// Human-readable trace lines for `tokens`, in source order.
pub fn execution_trace(tokens: &[Token], language: Language, symbols: &SymbolTable) -> Vec<String> {
    match language {
        Language::Html => html_trace(tokens),
        Language::Python => python_trace(tokens, symbols),
        Language::Sql => sql_trace(tokens, symbols),
        Language::Unknown => Vec::new(),
    }
}

/// Join token values with single spaces, tightening around punctuation.
fn render(tokens: &[&Token]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        let value = token.value.as_str();
        if i > 0 {
            let previous = tokens[i - 1].value.as_str();
            let closes = matches!(value, "," | ")" | "]" | "}" | "." | ":" | ";");
            let opens_call = matches!(value, "(" | "[")
                && previous
                    .chars()
                    .last()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == ')' || c == ']');
            let after_open = matches!(previous, "(" | "[" | "{" | ".");
            if !closes && !opens_call && !after_open {
                out.push(' ');
            }
        }
        out.push_str(value);
    }
    out
}

fn shorten(text: &str) -> String {
    const MAX: usize = 60;
    if text.chars().count() > MAX {
        let head: String = text.chars().take(MAX).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn html_trace(tokens: &[Token]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut depth = 0usize;
    let mut text: Vec<&str> = Vec::new();
    let mut text_depth = 0usize;

    let flush = |text: &mut Vec<&str>, lines: &mut Vec<String>, depth: usize| {
        if !text.is_empty() {
            lines.push(format!("{}text \"{}\"", "  ".repeat(depth), shorten(&text.join(" "))));
            text.clear();
        }
    };

    for token in tokens {
        match token.kind {
            html::TEXT | html::ENTITY => {
                if text.is_empty() {
                    text_depth = depth;
                }
                text.push(&token.value);
                continue;
            }
            html::COMMENT => continue,
            _ => flush(&mut text, &mut lines, text_depth),
        }
        let indent = "  ".repeat(depth);
        let name = html::tag_name(token).unwrap_or("?");
        match token.kind {
            html::DOCTYPE => lines.push(format!("{}declare document type", indent)),
            html::VOID_TAG => lines.push(format!("{}insert <{}>", indent, name)),
            html::RESERVED_TAG | html::TAG if html::is_self_closing(token) => {
                lines.push(format!("{}insert <{}/>", indent, name))
            }
            html::RESERVED_TAG | html::TAG => {
                let detail = match token.attributes.len() {
                    0 => String::new(),
                    1 => " with 1 attribute".to_string(),
                    n => format!(" with {} attributes", n),
                };
                lines.push(format!("{}open <{}>{}", indent, name, detail));
                depth += 1;
            }
            html::CLOSE_TAG => {
                depth = depth.saturating_sub(1);
                lines.push(format!("{}close </{}>", "  ".repeat(depth), name));
            }
            html::CDATA => lines.push(format!("{}character data", indent)),
            html::PROCESSING_INSTRUCTION => {
                lines.push(format!("{}processing instruction", indent))
            }
            _ if token.is_error() => {
                lines.push(format!("{}skip malformed {}", indent, shorten(&token.value)))
            }
            _ => {}
        }
    }
    flush(&mut text, &mut lines, text_depth);
    lines
}

fn python_trace(tokens: &[Token], symbols: &SymbolTable) -> Vec<String> {
    let mut lines = Vec::new();
    for line in python::logical_lines(tokens) {
        let Some(first) = line.tokens.first() else {
            continue;
        };
        let statement = line.statement();
        let indent = "  ".repeat(line.level() / 4);
        let summary = match line.head_keyword() {
            Some("def") => {
                let name = statement.get(1).map_or("?", |t| t.value.as_str());
                let params = symbols
                    .get_kind(name, SymbolKind::Function)
                    .and_then(|f| f.value.clone())
                    .unwrap_or_else(|| "0".to_string());
                format!("define function '{}' ({} parameters)", name, params)
            }
            Some("class") => {
                let name = statement.get(1).map_or("?", |t| t.value.as_str());
                format!("define class '{}'", name)
            }
            Some(k @ ("if" | "elif" | "while")) => {
                let condition = &statement[1..statement.len().saturating_sub(1).max(1)];
                format!("{}: evaluate {}", k, render(condition))
            }
            Some("else") => "else: take the remaining branch".to_string(),
            Some("for") => {
                let header = &statement[1..statement.len().saturating_sub(1).max(1)];
                format!("for: iterate {}", render(header))
            }
            Some("return") => format!("return {}", render(&statement[1..])),
            Some("import") | Some("from") => format!("import {}", render(&statement[1..])),
            Some(k) => {
                let end = statement.len() - usize::from(line.opens_block());
                format!("{} {}", k, render(&statement[1..end.max(1)]))
                    .trim_end()
                    .to_string()
            }
            None => python_expression(statement, symbols),
        };
        lines.push(format!("{:>4}: {}{}", first.line(), indent, shorten(&summary)));
    }
    lines
}

fn python_expression(statement: &[&Token], symbols: &SymbolTable) -> String {
    let assigns = statement
        .iter()
        .position(|t| python::is_operator(t, "="))
        .filter(|&i| i > 0);
    match assigns {
        Some(eq) => {
            let target = render(&statement[..eq]);
            let known = symbols
                .get_kind(&target, SymbolKind::Variable)
                .filter(|s| s.data_type != "unknown")
                .map(|s| format!(" ({})", s.data_type))
                .unwrap_or_default();
            format!("assign {} = {}{}", target, render(&statement[eq + 1..]), known)
        }
        None => format!("evaluate {}", render(statement)),
    }
}

fn sql_trace(tokens: &[Token], symbols: &SymbolTable) -> Vec<String> {
    sql::statements(tokens)
        .iter()
        .map(|stmt| {
            let leader = stmt[0];
            let keyword = leader.value.to_ascii_uppercase();
            let name_after = |kw: &str| {
                stmt.iter()
                    .position(|t| sql::is_keyword(t, kw))
                    .and_then(|i| stmt.get(i + 1))
                    .filter(|t| t.kind == sql::IDENTIFIER)
                    .map(|t| sql::identifier_name(t).to_string())
            };
            let summary = match keyword.as_str() {
                "SELECT" => match name_after("FROM") {
                    Some(table) => format!("read rows from '{}'", table),
                    None => "compute a row".to_string(),
                },
                "INSERT" => {
                    let rows = stmt
                        .windows(2)
                        .filter(|w| {
                            (sql::is_keyword(w[0], "VALUES") || sql::is_punct(w[0], ","))
                                && sql::is_punct(w[1], "(")
                        })
                        .count();
                    let table = name_after("INTO").unwrap_or_else(|| "?".to_string());
                    format!("insert {} row(s) into '{}'", rows, table)
                }
                "UPDATE" => {
                    let table = stmt
                        .get(1)
                        .map_or("?".to_string(), |t| sql::identifier_name(t).to_string());
                    format!("update rows of '{}'", table)
                }
                "DELETE" => {
                    let table = name_after("FROM").unwrap_or_else(|| "?".to_string());
                    format!("delete rows from '{}'", table)
                }
                "CREATE" => {
                    let object = stmt.get(1).map_or(String::new(), |t| t.value.to_ascii_lowercase());
                    let name = stmt
                        .iter()
                        .skip(2)
                        .find(|t| t.kind == sql::IDENTIFIER)
                        .map_or("?", |t| sql::identifier_name(t));
                    let columns = symbols
                        .get_kind(name, SymbolKind::Table)
                        .and_then(|t| t.value.clone())
                        .map(|n| format!(" with {} column(s)", n))
                        .unwrap_or_default();
                    format!("create {} '{}'{}", object, name, columns)
                }
                "DROP" => {
                    let object = stmt.get(1).map_or(String::new(), |t| t.value.to_ascii_lowercase());
                    let name = stmt
                        .iter()
                        .skip(2)
                        .find(|t| t.kind == sql::IDENTIFIER)
                        .map_or("?", |t| sql::identifier_name(t));
                    format!("drop {} '{}'", object, name)
                }
                _ => format!("skip unrecognized statement '{}'", leader.value),
            };
            format!("{:>4}: {}", leader.line(), summary)
        })
        .collect()
}
