use polylex_common::{AnalysisError, DiagnosticBag, ErrorKind, Token};

use super::StructuralAnalyzer;
use crate::lexer::sql::{
    find_top_level, is_any_keyword, is_keyword, is_punct, statements, IDENTIFIER, KEYWORD,
    OPERATOR,
};

/// Clauses of a SELECT in the order they may appear.
const SELECT_CLAUSES: &[&str] = &["FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT"];

/// Keywords that end a WHERE condition.
const CONDITION_END: &[&str] = &["GROUP", "HAVING", "ORDER", "LIMIT", "UNION"];

/// Clause checks for SELECT, INSERT, UPDATE, DELETE, CREATE and DROP.
#[derive(Debug, Default)]
pub struct SqlStructure;

impl SqlStructure {
    pub fn new() -> Self {
        Self
    }
}

impl StructuralAnalyzer for SqlStructure {
    fn analyze(&self, tokens: &[Token]) -> Vec<AnalysisError> {
        let mut checker = Checker {
            diagnostics: DiagnosticBag::new(ErrorKind::Syntactic),
        };
        for stmt in statements(tokens) {
            checker.check_statement(&stmt);
        }
        checker.diagnostics.into_diagnostics()
    }
}

struct Checker {
    diagnostics: DiagnosticBag,
}

impl Checker {
    fn check_statement(&mut self, stmt: &[&Token]) {
        let leader = stmt[0];
        if leader.kind != KEYWORD {
            self.unrecognized(leader);
            return;
        }
        match leader.value.to_ascii_uppercase().as_str() {
            "SELECT" => self.check_select(stmt),
            "INSERT" => self.check_insert(stmt),
            "UPDATE" => self.check_update(stmt),
            "DELETE" => self.check_delete(stmt),
            "CREATE" => self.check_create(stmt),
            "DROP" => self.check_drop(stmt),
            _ => self.unrecognized(leader),
        }
    }

    fn unrecognized(&mut self, leader: &Token) {
        self.diagnostics.error(
            format!("Unrecognized statement starting with '{}'", leader.value),
            leader,
        );
    }

    /// Require an identifier at `index`, reporting `message` otherwise.
    fn expect_name(&mut self, stmt: &[&Token], index: usize, message: &str) -> bool {
        match stmt.get(index) {
            Some(t) if t.kind == IDENTIFIER => true,
            Some(t) => {
                self.diagnostics
                    .error(format!("{}, found '{}'", message, t.value), t);
                false
            }
            None => {
                self.diagnostics.error(message, stmt[stmt.len() - 1]);
                false
            }
        }
    }

    fn check_select(&mut self, stmt: &[&Token]) {
        let leader = stmt[0];
        let mut first = 1;
        while stmt
            .get(first)
            .is_some_and(|t| is_keyword(t, "DISTINCT") || is_keyword(t, "ALL"))
        {
            first += 1;
        }
        match stmt.get(first) {
            None => {
                self.diagnostics
                    .error("SELECT requires a column list", leader);
                return;
            }
            Some(t) if is_keyword(t, "FROM") => {
                self.diagnostics.error("SELECT requires a column list", t);
            }
            Some(_) => {}
        }

        let Some(from) = find_top_level(stmt, first, |t| is_keyword(t, "FROM")) else {
            self.diagnostics
                .error("Missing FROM clause in SELECT statement", leader);
            return;
        };
        self.expect_name(stmt, from + 1, "Expected table name after FROM");

        let mut last_rank = 0;
        let mut last_clause = "FROM";
        let mut index = from + 1;
        while let Some(found) = find_top_level(stmt, index, |t| {
            is_any_keyword(t, &SELECT_CLAUSES[1..]) || is_keyword(t, "UNION")
        }) {
            let token = stmt[found];
            if is_keyword(token, "UNION") {
                break;
            }
            let clause = token.value.to_ascii_uppercase();
            let rank = SELECT_CLAUSES
                .iter()
                .position(|c| *c == clause)
                .unwrap_or_default();
            if rank < last_rank {
                self.diagnostics.error(
                    format!("'{}' clause cannot follow '{}'", clause, last_clause),
                    token,
                );
            }
            if matches!(clause.as_str(), "GROUP" | "ORDER")
                && !stmt.get(found + 1).is_some_and(|t| is_keyword(t, "BY"))
            {
                self.diagnostics
                    .error(format!("Expected BY after {}", clause), token);
            }
            if clause == "WHERE" {
                self.check_condition(stmt, found);
            }
            last_rank = rank.max(last_rank);
            last_clause = SELECT_CLAUSES[last_rank];
            index = found + 1;
        }
    }

    fn check_insert(&mut self, stmt: &[&Token]) {
        let leader = stmt[0];
        if !stmt.get(1).is_some_and(|t| is_keyword(t, "INTO")) {
            self.diagnostics.error("Expected INTO after INSERT", leader);
            return;
        }
        if !self.expect_name(stmt, 2, "Expected table name after INSERT INTO") {
            return;
        }

        let mut index = 3;
        if stmt.get(index).is_some_and(|t| is_punct(t, "(")) {
            match find_top_level(stmt, index + 1, |t| is_punct(t, ")")) {
                Some(close) => index = close + 1,
                None => {
                    self.diagnostics
                        .error("Unclosed column list in INSERT statement", stmt[index]);
                    return;
                }
            }
        }

        match stmt.get(index) {
            Some(t) if is_keyword(t, "SELECT") => {}
            Some(t) if is_keyword(t, "VALUES") => self.check_value_lists(stmt, index),
            Some(t) => self
                .diagnostics
                .error("Missing VALUES clause in INSERT statement", t),
            None => self
                .diagnostics
                .error("Missing VALUES clause in INSERT statement", leader),
        }
    }

    fn check_value_lists(&mut self, stmt: &[&Token], values: usize) {
        let mut index = values + 1;
        loop {
            match stmt.get(index) {
                Some(t) if is_punct(t, "(") => {}
                Some(t) => {
                    self.diagnostics.error("Expected '(' after VALUES", t);
                    return;
                }
                None => {
                    self.diagnostics.error("Expected '(' after VALUES", stmt[values]);
                    return;
                }
            }
            let Some(close) = find_top_level(stmt, index + 1, |t| is_punct(t, ")")) else {
                self.diagnostics
                    .error("Unclosed value list in INSERT statement", stmt[index]);
                return;
            };
            if close == index + 1 {
                self.diagnostics.error("Empty value list", stmt[index]);
            }
            if stmt.get(close + 1).is_some_and(|t| is_punct(t, ",")) {
                index = close + 2;
            } else {
                return;
            }
        }
    }

    fn check_update(&mut self, stmt: &[&Token]) {
        let leader = stmt[0];
        self.expect_name(stmt, 1, "Expected table name after UPDATE");
        let Some(set) = find_top_level(stmt, 1, |t| is_keyword(t, "SET")) else {
            self.diagnostics
                .error("Missing SET clause in UPDATE statement", leader);
            return;
        };
        let assigns = stmt.get(set + 1).is_some_and(|t| t.kind == IDENTIFIER)
            && stmt.get(set + 2).is_some_and(|t| t.is(OPERATOR, "="));
        if !assigns {
            self.diagnostics
                .error("Expected 'column = value' after SET", stmt[set]);
        }
        if let Some(filter) = find_top_level(stmt, set, |t| is_keyword(t, "WHERE")) {
            self.check_condition(stmt, filter);
        }
    }

    fn check_delete(&mut self, stmt: &[&Token]) {
        if !stmt.get(1).is_some_and(|t| is_keyword(t, "FROM")) {
            self.diagnostics
                .error("Missing FROM in DELETE statement", stmt[0]);
            return;
        }
        self.expect_name(stmt, 2, "Expected table name after DELETE FROM");
        if let Some(filter) = find_top_level(stmt, 2, |t| is_keyword(t, "WHERE")) {
            self.check_condition(stmt, filter);
        }
    }

    fn check_create(&mut self, stmt: &[&Token]) {
        let leader = stmt[0];
        let Some(object) = stmt.get(1) else {
            self.diagnostics
                .error("Expected TABLE, VIEW, INDEX or DATABASE after CREATE", leader);
            return;
        };
        let mut name = 2;
        if stmt.get(2).is_some_and(|t| is_keyword(t, "IF")) {
            name = 5;
        }
        if is_keyword(object, "TABLE") {
            if !self.expect_name(stmt, name, "Expected table name after CREATE TABLE") {
                return;
            }
            let open = name + 1;
            if !stmt.get(open).is_some_and(|t| is_punct(t, "(")) {
                self.diagnostics.error(
                    "Expected '(' after table name in CREATE TABLE",
                    stmt.get(open).copied().unwrap_or(stmt[name]),
                );
                return;
            }
            match find_top_level(stmt, open + 1, |t| is_punct(t, ")")) {
                None => self
                    .diagnostics
                    .error("Unclosed column list in CREATE TABLE", stmt[open]),
                Some(close) if close == open + 1 => self
                    .diagnostics
                    .error("CREATE TABLE requires at least one column", stmt[open]),
                Some(_) => {}
            }
        } else if is_any_keyword(object, &["VIEW", "INDEX", "DATABASE", "UNIQUE"]) {
            if is_keyword(object, "UNIQUE") {
                name += 1;
            }
            self.expect_name(stmt, name, "Expected a name after CREATE");
        } else {
            self.diagnostics
                .error("Expected TABLE, VIEW, INDEX or DATABASE after CREATE", object);
        }
    }

    fn check_drop(&mut self, stmt: &[&Token]) {
        let leader = stmt[0];
        match stmt.get(1) {
            Some(t) if is_any_keyword(t, &["TABLE", "VIEW", "INDEX", "DATABASE"]) => {
                let name = if stmt.get(2).is_some_and(|t| is_keyword(t, "IF")) {
                    4
                } else {
                    2
                };
                self.expect_name(
                    stmt,
                    name,
                    &format!("Expected name after DROP {}", t.value.to_ascii_uppercase()),
                );
            }
            Some(t) => self
                .diagnostics
                .error("Expected TABLE, VIEW, INDEX or DATABASE after DROP", t),
            None => self
                .diagnostics
                .error("Expected TABLE, VIEW, INDEX or DATABASE after DROP", leader),
        }
    }

    /// Parenthesis balance of the condition following `WHERE` at `filter`.
    /// A close without an open is reported where it occurs.
    fn check_condition(&mut self, stmt: &[&Token], filter: usize) {
        let start = filter + 1;
        let ends_early = match stmt.get(start) {
            None => true,
            Some(t) => is_any_keyword(t, CONDITION_END),
        };
        if ends_early {
            self.diagnostics
                .error("Missing condition after WHERE", stmt[filter]);
            return;
        }

        let mut balance = 0i32;
        let mut last_open = None;
        for &token in &stmt[start..] {
            if balance == 0 && is_any_keyword(token, CONDITION_END) {
                break;
            }
            if is_punct(token, "(") {
                balance += 1;
                last_open = Some(token);
            } else if is_punct(token, ")") {
                balance -= 1;
                if balance < 0 {
                    self.diagnostics
                        .error("Unbalanced ')' in WHERE condition", token);
                    balance = 0;
                }
            }
        }
        if balance > 0 {
            if let Some(open) = last_open {
                self.diagnostics
                    .error("Unclosed '(' in WHERE condition", open);
            }
        }
    }
}
