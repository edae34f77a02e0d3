use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use polylex_common::{DiagnosticBag, ErrorKind, Symbol, SymbolKind, SymbolTable, Token};
use regex::Regex;

use super::{SemanticAnalyzer, SemanticOutput};
use crate::lexer::sql::{
    find_top_level, identifier_name, is_any_keyword, is_keyword, is_punct, statements, DATATYPE,
    IDENTIFIER, KEYWORD, NUMBER, OPERATOR, STRING,
};

/// Keywords that end the table list of a SELECT.
const FROM_END: &[&str] = &["WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "UNION"];

/// Keywords that end a WHERE condition.
const WHERE_END: &[&str] = &["GROUP", "HAVING", "ORDER", "LIMIT", "UNION"];

/// Table-level constraint keywords inside a CREATE TABLE column list.
const TABLE_CONSTRAINTS: &[&str] = &[
    "PRIMARY", "FOREIGN", "UNIQUE", "CHECK", "CONSTRAINT", "KEY", "INDEX",
];

/// Keywords that begin the next joined table.
const JOIN_START: &[&str] = &["JOIN", "INNER", "LEFT", "RIGHT", "FULL"];

static DATE_LITERAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^'\d{4}-\d{2}-\d{2}'$").ok());

#[derive(Debug, Clone)]
struct ColumnDef {
    name: String,
    data_type: String,
    primary_key: bool,
    not_null: bool,
}

impl ColumnDef {
    fn constraint(&self) -> Option<&'static str> {
        if self.primary_key {
            Some("PRIMARY KEY")
        } else if self.not_null {
            Some("NOT NULL")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
struct TableDef {
    name: String,
    line: usize,
    columns: Vec<ColumnDef>,
}

impl TableDef {
    fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Literal kinds recognized in VALUES lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Integer,
    Decimal,
    Text,
    Date,
    Boolean,
    Null,
}

impl ValueKind {
    fn describe(self) -> &'static str {
        match self {
            ValueKind::Integer => "integer",
            ValueKind::Decimal => "decimal",
            ValueKind::Text => "text",
            ValueKind::Date => "date",
            ValueKind::Boolean => "boolean",
            ValueKind::Null => "NULL",
        }
    }
}

fn classify_value(item: &[&Token]) -> Option<ValueKind> {
    let literal = match item {
        [t] => *t,
        [sign, t] if sign.is(OPERATOR, "-") && t.kind == NUMBER => *t,
        _ => return None,
    };
    match literal.kind {
        NUMBER if literal.value.contains('.') => Some(ValueKind::Decimal),
        NUMBER => Some(ValueKind::Integer),
        STRING => {
            let is_date = DATE_LITERAL
                .as_ref()
                .is_some_and(|re| re.is_match(&literal.value));
            Some(if is_date { ValueKind::Date } else { ValueKind::Text })
        }
        KEYWORD if is_keyword(literal, "NULL") => Some(ValueKind::Null),
        KEYWORD if is_keyword(literal, "TRUE") || is_keyword(literal, "FALSE") => {
            Some(ValueKind::Boolean)
        }
        _ => None,
    }
}

/// Whether a column declared as `data_type` accepts a literal of `kind`.
/// Unrecognized types accept anything.
fn accepts(data_type: &str, kind: ValueKind) -> bool {
    use ValueKind::*;
    match data_type.to_ascii_uppercase().as_str() {
        "INT" | "INTEGER" | "SMALLINT" | "BIGINT" | "TINYINT" => kind == Integer,
        "DECIMAL" | "NUMERIC" | "FLOAT" | "REAL" | "DOUBLE" => matches!(kind, Integer | Decimal),
        "VARCHAR" | "CHAR" | "TEXT" => matches!(kind, Text | Date),
        "DATE" => kind == Date,
        "DATETIME" | "TIMESTAMP" | "TIME" => matches!(kind, Text | Date),
        "BOOLEAN" | "BOOL" => matches!(kind, Boolean | Integer),
        _ => true,
    }
}

/// Items of a parenthesized list, split at top-level commas.
fn list_items<'t, 'a>(stmt: &'t [&'a Token], open: usize, close: usize) -> Vec<&'t [&'a Token]> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut begin = open + 1;
    for i in open + 1..close {
        let token = stmt[i];
        if is_punct(token, "(") {
            depth += 1;
        } else if is_punct(token, ")") {
            depth -= 1;
        } else if depth == 0 && is_punct(token, ",") {
            items.push(&stmt[begin..i]);
            begin = i + 1;
        }
    }
    if begin < close {
        items.push(&stmt[begin..close]);
    }
    items
}

fn closing_paren(stmt: &[&Token], open: usize) -> Option<usize> {
    find_top_level(stmt, open + 1, |t| is_punct(t, ")"))
}

/// Tables visible to column references in one statement.
#[derive(Debug, Default)]
struct TableScope {
    /// Table name or alias (lower case) to schema key.
    bindings: BTreeMap<String, String>,
    /// Schema keys in the order they were referenced.
    tables: Vec<String>,
    /// Names introduced with `AS` in the select list.
    aliases: BTreeSet<String>,
    /// A derived or unknown table is involved; unqualified columns cannot
    /// be resolved.
    opaque: bool,
}

impl TableScope {
    fn bind(&mut self, key: &str) {
        self.bindings.insert(key.to_string(), key.to_string());
        self.tables.push(key.to_string());
    }
}

/// Schema checks: declared tables and columns, INSERT value types, and
/// risky UPDATE/DELETE forms.
///
/// The first pass collects every `CREATE TABLE` of the script, so
/// references may precede the declaration. Reference checks only run when
/// the script declares at least one table.
#[derive(Debug, Default)]
pub struct SqlSemantics;

impl SqlSemantics {
    pub fn new() -> Self {
        Self
    }
}

impl SemanticAnalyzer for SqlSemantics {
    fn analyze(&self, tokens: &[Token], symbols: SymbolTable) -> SemanticOutput {
        let stmts = statements(tokens);
        let mut checker = Checker {
            schema: BTreeMap::new(),
            symbols,
            diagnostics: DiagnosticBag::new(ErrorKind::Semantic),
        };
        for stmt in &stmts {
            if is_keyword(stmt[0], "CREATE") && stmt.get(1).is_some_and(|t| is_keyword(t, "TABLE")) {
                checker.collect_table(stmt);
            }
        }
        for stmt in &stmts {
            checker.check_statement(stmt);
        }
        SemanticOutput {
            symbols: checker.symbols,
            diagnostics: checker.diagnostics.into_diagnostics(),
        }
    }
}

struct Checker {
    /// Declared tables keyed by lower-case name.
    schema: BTreeMap<String, TableDef>,
    symbols: SymbolTable,
    diagnostics: DiagnosticBag,
}

impl Checker {
    fn table(&self, name: &str) -> Option<&TableDef> {
        self.schema.get(&name.to_ascii_lowercase())
    }

    fn has_schema(&self) -> bool {
        !self.schema.is_empty()
    }

    /// Index of the table name after `CREATE TABLE [IF NOT EXISTS]`.
    fn create_name_index(stmt: &[&Token]) -> usize {
        if stmt.get(2).is_some_and(|t| is_keyword(t, "IF")) {
            5
        } else {
            2
        }
    }

    fn collect_table(&mut self, stmt: &[&Token]) {
        let name_index = Self::create_name_index(stmt);
        let Some(name) = stmt.get(name_index).copied().filter(|t| t.kind == IDENTIFIER) else {
            return;
        };
        let open = name_index + 1;
        if !stmt.get(open).is_some_and(|t| is_punct(t, "(")) {
            return;
        }
        let Some(close) = closing_paren(stmt, open) else {
            return;
        };

        let table_name = identifier_name(name);
        if let Some(existing) = self.table(table_name) {
            if name_index == 2 {
                let message = format!(
                    "Table '{}' is already defined at line {}",
                    table_name, existing.line
                );
                self.diagnostics.error(message, name);
            }
            return;
        }

        let mut columns: Vec<ColumnDef> = Vec::new();
        let mut keyed: Vec<String> = Vec::new();
        for item in list_items(stmt, open, close) {
            let Some(first) = item.first() else {
                continue;
            };
            if is_keyword(first, "PRIMARY") {
                if let Some(key_open) = item.iter().position(|t| is_punct(t, "(")) {
                    keyed.extend(
                        item[key_open..]
                            .iter()
                            .filter(|t| t.kind == IDENTIFIER)
                            .map(|t| identifier_name(t).to_string()),
                    );
                }
                continue;
            }
            if is_any_keyword(first, TABLE_CONSTRAINTS) || first.kind != IDENTIFIER {
                continue;
            }
            let column_name = identifier_name(first);
            if columns.iter().any(|c| c.name.eq_ignore_ascii_case(column_name)) {
                self.diagnostics.error(
                    format!("Duplicate column '{}' in table '{}'", column_name, table_name),
                    first,
                );
                continue;
            }
            let data_type = item
                .get(1)
                .filter(|t| t.kind == DATATYPE || t.kind == IDENTIFIER)
                .map_or_else(|| "unknown".to_string(), |t| t.value.to_ascii_uppercase());
            let primary_key = item.iter().any(|t| is_keyword(t, "PRIMARY"));
            let not_null = item
                .windows(2)
                .any(|w| is_keyword(w[0], "NOT") && is_keyword(w[1], "NULL"));
            columns.push(ColumnDef {
                name: column_name.to_string(),
                data_type,
                primary_key,
                not_null: not_null || primary_key,
            });
        }
        for column in columns.iter_mut() {
            if keyed.iter().any(|k| k.eq_ignore_ascii_case(&column.name)) {
                column.primary_key = true;
                column.not_null = true;
            }
        }

        self.symbols.insert(
            Symbol::new(table_name, SymbolKind::Table, name.position)
                .with_type("table")
                .with_value(columns.len().to_string())
                .initialized(),
        );
        for column in &columns {
            let mut symbol = Symbol::new(column.name.as_str(), SymbolKind::Column, name.position)
                .with_type(column.data_type.as_str())
                .with_scope(table_name)
                .initialized();
            symbol.value = column.constraint().map(str::to_string);
            self.symbols.insert_qualified(symbol);
        }
        log::trace!("declared table '{}' with {} columns", table_name, columns.len());
        self.schema.insert(
            table_name.to_ascii_lowercase(),
            TableDef {
                name: table_name.to_string(),
                line: name.line(),
                columns,
            },
        );
    }

    fn check_statement(&mut self, stmt: &[&Token]) {
        let leader = stmt[0];
        if leader.kind != KEYWORD {
            return;
        }
        match leader.value.to_ascii_uppercase().as_str() {
            "SELECT" => self.check_select(stmt),
            "INSERT" => self.check_insert(stmt),
            "UPDATE" => self.check_update(stmt),
            "DELETE" => self.check_delete(stmt),
            "CREATE" => self.check_foreign_keys(stmt),
            "DROP" => self.check_drop(stmt),
            _ => {}
        }
    }

    /// Resolve a single table reference, reporting it when unknown.
    fn resolve_table(&mut self, token: &Token) -> Option<String> {
        if !self.has_schema() || token.kind != IDENTIFIER {
            return None;
        }
        let name = identifier_name(token);
        if self.table(name).is_some() {
            return Some(name.to_ascii_lowercase());
        }
        self.diagnostics
            .error(format!("Table '{}' does not exist", name), token);
        None
    }

    fn scope_for(&mut self, token: &Token) -> TableScope {
        let mut scope = TableScope::default();
        match self.resolve_table(token) {
            Some(key) => scope.bind(&key),
            None => scope.opaque = true,
        }
        scope
    }

    fn check_select(&mut self, stmt: &[&Token]) {
        if !self.has_schema() {
            return;
        }
        let Some(from) = find_top_level(stmt, 1, |t| is_keyword(t, "FROM")) else {
            return;
        };
        let end = find_top_level(stmt, from + 1, |t| is_any_keyword(t, FROM_END))
            .unwrap_or(stmt.len());

        let mut scope = TableScope::default();
        let mut conditions: Vec<(usize, usize)> = Vec::new();
        let mut expect_table = true;
        let mut i = from + 1;
        while i < end {
            let token = stmt[i];
            if is_punct(token, ",") || is_keyword(token, "JOIN") {
                expect_table = true;
                i += 1;
                continue;
            }
            if is_keyword(token, "ON") {
                let stop = find_top_level(stmt, i + 1, |t| {
                    is_punct(t, ",") || is_any_keyword(t, JOIN_START)
                })
                .map_or(end, |s| s.min(end));
                conditions.push((i + 1, stop));
                expect_table = false;
                i = stop;
                continue;
            }
            if !expect_table {
                i += 1;
                continue;
            }
            expect_table = false;
            let mut next = i + 1;
            if is_punct(token, "(") {
                scope.opaque = true;
                next = closing_paren(stmt, i).map_or(end, |c| c + 1);
            } else if token.kind == IDENTIFIER {
                let key = self.resolve_table(token);
                match &key {
                    Some(k) => scope.bind(k),
                    None => scope.opaque = true,
                }
                if stmt.get(next).is_some_and(|t| is_keyword(t, "AS")) {
                    next += 1;
                }
                if let Some(alias) = stmt.get(next).filter(|t| t.kind == IDENTIFIER && next < end) {
                    if let Some(k) = key {
                        scope
                            .bindings
                            .insert(identifier_name(alias).to_ascii_lowercase(), k);
                    }
                    next += 1;
                }
            }
            i = next;
        }

        let mut first = 1;
        while stmt
            .get(first)
            .is_some_and(|t| is_keyword(t, "DISTINCT") || is_keyword(t, "ALL"))
        {
            first += 1;
        }
        let select_list = &stmt[first.min(from)..from];
        for pair in select_list.windows(2) {
            if is_keyword(pair[0], "AS") && pair[1].kind == IDENTIFIER {
                scope
                    .aliases
                    .insert(identifier_name(pair[1]).to_ascii_lowercase());
            }
        }

        self.check_columns(select_list, &scope);
        for (begin, stop) in conditions {
            self.check_columns(&stmt[begin..stop], &scope);
        }
        if let Some(filter) = find_top_level(stmt, from, |t| is_keyword(t, "WHERE")) {
            self.check_where(stmt, filter, &scope);
        }
    }

    fn check_where(&mut self, stmt: &[&Token], filter: usize, scope: &TableScope) {
        let end = find_top_level(stmt, filter + 1, |t| is_any_keyword(t, WHERE_END))
            .unwrap_or(stmt.len());
        self.check_columns(&stmt[filter + 1..end], scope);
    }

    /// Check every column reference in `region`. Nested SELECTs are skipped.
    fn check_columns(&mut self, region: &[&Token], scope: &TableScope) {
        let mut i = 0;
        while i < region.len() {
            let token = region[i];
            let next = region.get(i + 1).copied();
            if is_punct(token, "(") && next.is_some_and(|t| is_keyword(t, "SELECT")) {
                i = closing_paren(region, i).map_or(region.len(), |c| c + 1);
                continue;
            }
            i += 1;
            if token.kind != IDENTIFIER
                || next.is_some_and(|t| is_punct(t, "("))
                || (i >= 2 && (is_punct(region[i - 2], ".") || is_keyword(region[i - 2], "AS")))
            {
                continue;
            }

            if next.is_some_and(|t| is_punct(t, ".")) {
                let Some(column) = region.get(i + 1).copied().filter(|t| t.kind == IDENTIFIER)
                else {
                    continue;
                };
                let qualifier = identifier_name(token);
                match scope.bindings.get(&qualifier.to_ascii_lowercase()) {
                    Some(key) => self.check_column_in(key, column),
                    None if !scope.opaque => self.diagnostics.error(
                        format!("Unknown table or alias '{}'", qualifier),
                        token,
                    ),
                    None => {}
                }
                continue;
            }

            let name = identifier_name(token);
            if scope.opaque
                || scope.tables.is_empty()
                || scope.aliases.contains(&name.to_ascii_lowercase())
            {
                continue;
            }
            let known = scope
                .tables
                .iter()
                .filter_map(|key| self.schema.get(key))
                .any(|table| table.column(name).is_some());
            if known {
                continue;
            }
            let message = match scope.tables.as_slice() {
                [only] => format!(
                    "Column '{}' does not exist in table '{}'",
                    name,
                    self.display_name(only)
                ),
                many => format!(
                    "Column '{}' does not exist in any of the tables {}",
                    name,
                    many.iter()
                        .map(|k| self.display_name(k))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            };
            self.diagnostics.error(message, token);
        }
    }

    fn display_name(&self, key: &str) -> String {
        self.schema
            .get(key)
            .map_or_else(|| key.to_string(), |t| t.name.clone())
    }

    fn check_column_in(&mut self, key: &str, column: &Token) {
        let Some(table) = self.schema.get(key) else {
            return;
        };
        let name = identifier_name(column);
        if table.column(name).is_none() {
            let message = format!("Column '{}' does not exist in table '{}'", name, table.name);
            self.diagnostics.error(message, column);
        }
    }

    fn check_insert(&mut self, stmt: &[&Token]) {
        let Some(target) = stmt.get(2).copied().filter(|t| t.kind == IDENTIFIER) else {
            return;
        };
        let table_name = identifier_name(target).to_string();
        let key = self.resolve_table(target);

        let mut index = 3;
        let mut listed: Option<Vec<&Token>> = None;
        if stmt.get(index).is_some_and(|t| is_punct(t, "(")) {
            let Some(close) = closing_paren(stmt, index) else {
                return;
            };
            let names: Vec<&Token> = stmt[index + 1..close]
                .iter()
                .copied()
                .filter(|t| t.kind == IDENTIFIER)
                .collect();
            if let Some(k) = &key {
                for &column in &names {
                    self.check_column_in(k, column);
                }
            }
            listed = Some(names);
            index = close + 1;
        }

        let values = match stmt.get(index) {
            Some(t) if is_keyword(t, "VALUES") => index,
            Some(t) if is_keyword(t, "SELECT") => return,
            _ => {
                self.diagnostics.warning(
                    format!("INSERT without VALUES: nothing is inserted into '{}'", table_name),
                    stmt[0],
                );
                return;
            }
        };

        let Some(table) = key.and_then(|k| self.schema.get(&k)).cloned() else {
            return;
        };
        let columns: Vec<Option<ColumnDef>> = match &listed {
            Some(names) => names
                .iter()
                .map(|t| table.column(identifier_name(t)).cloned())
                .collect(),
            None => table.columns.iter().cloned().map(Some).collect(),
        };

        let mut open = values + 1;
        while stmt.get(open).is_some_and(|t| is_punct(t, "(")) {
            let Some(close) = closing_paren(stmt, open) else {
                return;
            };
            let items = list_items(stmt, open, close);
            if items.len() != columns.len() {
                let noun = if items.len() == 1 { "value" } else { "values" };
                self.diagnostics.error(
                    format!(
                        "INSERT into '{}' has {} {} for {} columns",
                        table.name,
                        items.len(),
                        noun,
                        columns.len()
                    ),
                    stmt[open],
                );
            } else {
                for (item, column) in items.iter().zip(&columns) {
                    if let Some(column) = column {
                        self.check_value(item, column);
                    }
                }
            }
            if !stmt.get(close + 1).is_some_and(|t| is_punct(t, ",")) {
                break;
            }
            open = close + 2;
        }
    }

    fn check_value(&mut self, item: &[&Token], column: &ColumnDef) {
        let Some(kind) = classify_value(item) else {
            return;
        };
        let Some(&anchor) = item.last() else {
            return;
        };
        if kind == ValueKind::Null {
            if column.not_null {
                self.diagnostics
                    .error(format!("Column '{}' cannot be NULL", column.name), anchor);
            }
            return;
        }
        if accepts(&column.data_type, kind) {
            return;
        }
        let message = if column.data_type == "DATE" && kind == ValueKind::Text {
            format!(
                "Invalid date {} for column '{}': expected 'YYYY-MM-DD'",
                anchor.value, column.name
            )
        } else {
            format!(
                "Type mismatch for column '{}' ({}): {} value {}",
                column.name,
                column.data_type,
                kind.describe(),
                anchor.value
            )
        };
        self.diagnostics.error(message, anchor);
    }

    fn check_update(&mut self, stmt: &[&Token]) {
        let Some(target) = stmt.get(1).copied().filter(|t| t.kind == IDENTIFIER) else {
            return;
        };
        let scope = self.scope_for(target);
        let key = scope.tables.first().cloned();
        let Some(set) = find_top_level(stmt, 1, |t| is_keyword(t, "SET")) else {
            return;
        };
        let filter = find_top_level(stmt, set, |t| is_keyword(t, "WHERE"));
        let end = filter.unwrap_or(stmt.len());

        // Reuse list splitting by treating SET as the opening bracket.
        for item in list_items(stmt, set, end) {
            let [column, eq, value @ ..] = item else {
                continue;
            };
            if column.kind != IDENTIFIER || !eq.is(OPERATOR, "=") {
                continue;
            }
            let name = identifier_name(column);
            let declared = key
                .as_ref()
                .and_then(|k| self.schema.get(k))
                .map(|t| t.column(name).cloned());
            if let (Some(k), Some(None)) = (&key, &declared) {
                self.check_column_in(k, column);
                continue;
            }
            if classify_value(value) != Some(ValueKind::Null) {
                continue;
            }
            let column_def = declared.flatten();
            let primary = column_def
                .as_ref()
                .map_or(name.eq_ignore_ascii_case("id"), |c| {
                    c.primary_key || c.name.eq_ignore_ascii_case("id")
                });
            if primary {
                self.diagnostics.error(
                    format!("Cannot set primary key column '{}' to NULL", name),
                    column,
                );
            } else if column_def.is_some_and(|c| c.not_null) {
                self.diagnostics
                    .error(format!("Column '{}' cannot be NULL", name), column);
            }
        }

        if let Some(filter) = filter {
            self.check_where(stmt, filter, &scope);
        }
    }

    fn check_delete(&mut self, stmt: &[&Token]) {
        let Some(target) = stmt.get(2).copied().filter(|t| t.kind == IDENTIFIER) else {
            return;
        };
        let scope = self.scope_for(target);
        match find_top_level(stmt, 2, |t| is_keyword(t, "WHERE")) {
            Some(filter) => self.check_where(stmt, filter, &scope),
            None => self.diagnostics.warning(
                format!(
                    "DELETE without WHERE clause removes every row from '{}'",
                    identifier_name(target)
                ),
                stmt[0],
            ),
        }
    }

    fn check_drop(&mut self, stmt: &[&Token]) {
        if !self.has_schema() || !stmt.get(1).is_some_and(|t| is_keyword(t, "TABLE")) {
            return;
        }
        if stmt.get(2).is_some_and(|t| is_keyword(t, "IF")) {
            return;
        }
        let Some(target) = stmt.get(2).copied().filter(|t| t.kind == IDENTIFIER) else {
            return;
        };
        let name = identifier_name(target);
        if self.table(name).is_none() {
            self.diagnostics
                .error(format!("Cannot drop unknown table '{}'", name), target);
        }
    }

    /// `REFERENCES table(column)` targets, inline or in a FOREIGN KEY clause.
    fn check_foreign_keys(&mut self, stmt: &[&Token]) {
        for (i, token) in stmt.iter().enumerate() {
            if !is_keyword(token, "REFERENCES") {
                continue;
            }
            let Some(target) = stmt.get(i + 1).copied().filter(|t| t.kind == IDENTIFIER) else {
                continue;
            };
            let table_name = identifier_name(target);
            let Some(table) = self.table(table_name) else {
                self.diagnostics.error(
                    format!("Foreign key references unknown table '{}'", table_name),
                    target,
                );
                continue;
            };
            let parenthesized = stmt.get(i + 2).is_some_and(|p| is_punct(p, "("));
            let Some(column) = stmt
                .get(i + 3)
                .copied()
                .filter(|t| parenthesized && t.kind == IDENTIFIER)
            else {
                continue;
            };
            if table.column(identifier_name(column)).is_none() {
                let message = format!(
                    "Foreign key references unknown column '{}.{}'",
                    table.name,
                    identifier_name(column)
                );
                self.diagnostics.error(message, column);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Scanner, SqlScanner};
    use polylex_common::Severity;

    const SCHEMA: &str = "\
CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(50) NOT NULL, born DATE, score DECIMAL(5,2));
CREATE TABLE orders (id INT, user_id INT, FOREIGN KEY (user_id) REFERENCES users(id));
";

    fn run(source: &str) -> SemanticOutput {
        let lexical = SqlScanner::new().unwrap().analyze_lexical(source).unwrap();
        SqlSemantics::new().analyze(&lexical.tokens, lexical.symbols)
    }

    fn messages(source: &str) -> Vec<String> {
        run(source).diagnostics.into_iter().map(|d| d.message).collect()
    }

    fn with_schema(statement: &str) -> Vec<String> {
        messages(&format!("{}{}", SCHEMA, statement))
    }

    #[test]
    fn delete_without_where() {
        let output = run("DELETE FROM t;");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(
            output.diagnostics[0].message,
            "DELETE without WHERE clause removes every row from 't'"
        );
        assert_eq!(output.diagnostics[0].severity, Severity::Warning);
        assert!(messages("DELETE FROM t WHERE id=1;").is_empty());
    }

    #[test]
    fn schema_becomes_symbols() {
        let output = run(SCHEMA);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        let symbols = &output.symbols;
        assert_eq!(symbols.get("users").unwrap().kind, SymbolKind::Table);
        let id = symbols.get("users.id").unwrap();
        assert_eq!(id.kind, SymbolKind::Column);
        assert_eq!(id.data_type, "INT");
        assert_eq!(id.value.as_deref(), Some("PRIMARY KEY"));
        assert_eq!(symbols.get("users.name").unwrap().value.as_deref(), Some("NOT NULL"));
        assert_eq!(symbols.get("users.score").unwrap().data_type, "DECIMAL");
        assert_eq!(symbols.get("orders.user_id").unwrap().scope, "orders");
    }

    #[test]
    fn duplicate_table() {
        let found = with_schema("CREATE TABLE users (id INT);");
        assert_eq!(found, vec!["Table 'users' is already defined at line 1"]);
        assert!(with_schema("CREATE TABLE IF NOT EXISTS users (id INT);").is_empty());
    }

    #[test]
    fn select_references() {
        assert!(with_schema("SELECT name, score FROM users WHERE id = 1;").is_empty());
        assert_eq!(
            with_schema("SELECT id FROM customers;"),
            vec!["Table 'customers' does not exist"]
        );
        assert_eq!(
            with_schema("SELECT nickname FROM users;"),
            vec!["Column 'nickname' does not exist in table 'users'"]
        );
        assert_eq!(
            with_schema("SELECT name FROM users WHERE nick = 'a';"),
            vec!["Column 'nick' does not exist in table 'users'"]
        );
    }

    #[test]
    fn aliases_and_qualified_columns() {
        let join = "SELECT u.name, o.id FROM users u JOIN orders AS o ON o.user_id = u.id WHERE u.score > 1;";
        assert!(with_schema(join).is_empty());
        assert_eq!(
            with_schema("SELECT x.name FROM users u;"),
            vec!["Unknown table or alias 'x'"]
        );
        assert_eq!(
            with_schema("SELECT u.email FROM users u;"),
            vec!["Column 'email' does not exist in table 'users'"]
        );
        assert!(with_schema("SELECT COUNT(id) AS total FROM users ORDER BY total;").is_empty());
    }

    #[test]
    fn nested_select_is_not_checked_against_outer_tables() {
        let query = "SELECT name FROM users WHERE id IN (SELECT user_id FROM orders);";
        assert!(with_schema(query).is_empty());
    }

    #[test]
    fn foreign_key_targets() {
        assert_eq!(
            messages("CREATE TABLE t (a INT, FOREIGN KEY (a) REFERENCES missing(id));"),
            vec!["Foreign key references unknown table 'missing'"]
        );
        assert_eq!(
            with_schema("CREATE TABLE notes (uid INT REFERENCES users(uid));"),
            vec!["Foreign key references unknown column 'users.uid'"]
        );
    }

    #[test]
    fn insert_checks() {
        assert!(with_schema("INSERT INTO users (id, name) VALUES (1, 'Ann'), (2, 'Bo');").is_empty());
        assert_eq!(
            with_schema("INSERT INTO users (id, name) VALUES (1);"),
            vec!["INSERT into 'users' has 1 value for 2 columns"]
        );
        assert_eq!(
            with_schema("INSERT INTO users (id, nick) VALUES (1, 'x');"),
            vec!["Column 'nick' does not exist in table 'users'"]
        );
        assert_eq!(
            with_schema("INSERT INTO users (id, name) VALUES ('one', 'Ann');"),
            vec!["Type mismatch for column 'id' (INT): text value 'one'"]
        );
        assert_eq!(
            with_schema("INSERT INTO users (id, name, born) VALUES (2, 'Bo', '2020-13');"),
            vec!["Invalid date '2020-13' for column 'born': expected 'YYYY-MM-DD'"]
        );
        assert!(with_schema("INSERT INTO users VALUES (2, 'Bo', '2020-01-31', 4.5);").is_empty());
        assert_eq!(
            with_schema("INSERT INTO users (id, name) VALUES (3, NULL);"),
            vec!["Column 'name' cannot be NULL"]
        );
    }

    #[test]
    fn insert_without_values() {
        let found = with_schema("INSERT INTO users (id, name);");
        assert_eq!(found, vec!["INSERT without VALUES: nothing is inserted into 'users'"]);
    }

    #[test]
    fn update_checks() {
        assert_eq!(
            with_schema("UPDATE users SET id = NULL WHERE name = 'a';"),
            vec!["Cannot set primary key column 'id' to NULL"]
        );
        assert_eq!(
            messages("UPDATE t SET id = NULL;"),
            vec!["Cannot set primary key column 'id' to NULL"]
        );
        assert_eq!(
            with_schema("UPDATE users SET name = NULL;"),
            vec!["Column 'name' cannot be NULL"]
        );
        assert_eq!(
            with_schema("UPDATE users SET nick = 'x';"),
            vec!["Column 'nick' does not exist in table 'users'"]
        );
    }

    #[test]
    fn unknown_tables_in_dml_and_drop() {
        assert_eq!(
            with_schema("DELETE FROM ghosts WHERE id = 1;"),
            vec!["Table 'ghosts' does not exist"]
        );
        assert_eq!(
            with_schema("DROP TABLE ghosts;"),
            vec!["Cannot drop unknown table 'ghosts'"]
        );
        assert!(with_schema("DROP TABLE IF EXISTS ghosts;").is_empty());
    }

    #[test]
    fn date_pattern_compiles() {
        assert!(DATE_LITERAL.as_ref().is_some_and(|re| re.is_match("'2024-01-31'")));
    }
}
