use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use polylex_common::{DiagnosticBag, ErrorKind, Symbol, SymbolKind, SymbolTable, Token};
use regex::Regex;

use super::{SemanticAnalyzer, SemanticOutput};
use crate::lexer::python::{
    is_bracket, is_keyword, is_operator, is_punct, literal_type, logical_lines, BOOLEAN, BRACKET,
    FLOAT, IDENTIFIER, INTEGER, KEYWORD, OPERATOR, STRING,
};

/// Names that are always defined.
const BUILTINS: &[&str] = &[
    "print", "len", "range", "int", "str", "float", "bool", "list", "dict", "set", "tuple",
    "frozenset", "bytes", "bytearray", "complex", "type", "object", "isinstance", "issubclass",
    "input", "open", "abs", "min", "max", "sum", "sorted", "reversed", "enumerate", "zip", "map",
    "filter", "any", "all", "round", "pow", "divmod", "hex", "oct", "bin", "ord", "chr", "id",
    "hash", "repr", "format", "iter", "next", "super", "property", "staticmethod",
    "classmethod", "getattr", "setattr", "hasattr", "delattr", "callable", "vars", "dir",
    "globals", "locals", "exit", "quit", "slice", "memoryview", "eval", "exec", "compile",
    "help", "breakpoint", "NotImplemented", "Ellipsis", "Exception", "BaseException",
    "ValueError", "TypeError", "KeyError", "IndexError", "AttributeError", "RuntimeError",
    "ZeroDivisionError", "NameError", "ImportError", "ModuleNotFoundError", "StopIteration",
    "NotImplementedError", "OSError", "IOError", "FileNotFoundError", "ArithmeticError",
    "LookupError", "AssertionError", "KeyboardInterrupt", "__name__", "__file__", "__doc__",
    "self", "cls",
];

/// Built-ins whose reassignment is reported.
const SHADOWABLE: &[&str] = &[
    "list", "dict", "str", "int", "float", "bool", "set", "tuple", "len", "sum", "max", "min",
    "type", "id", "input", "print", "range", "open", "map", "filter", "sorted", "object",
    "next", "iter", "format", "hash", "all", "any", "abs", "round", "zip", "enumerate",
];

const AUGMENTED: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "**=", "&=", "|=", "^=", ">>=", "<<=", "@=",
];

/// Name fragment, expected operator and the operation it names.
const ARITHMETIC_NAMES: &[(&str, &str, &str)] = &[
    ("add", "+", "addition"),
    ("sum", "+", "addition"),
    ("subtract", "-", "subtraction"),
    ("multiply", "*", "multiplication"),
    ("divide", "/", "division"),
];

static FSTRING_FIELD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\s*([A-Za-z_][A-Za-z0-9_]*)").ok());

/// A logical line placed in its block context.
struct Line<'a> {
    tokens: Vec<&'a Token>,
    /// Number of enclosing indented blocks.
    depth: usize,
    /// `:` tokens seen in the file before this line.
    colons_before: usize,
    /// Innermost enclosing function, if any.
    function: Option<&'a str>,
    /// Directly inside a `class` body.
    class_body: bool,
    /// Leading keyword, ignoring `async`.
    head: Option<&'a str>,
    /// Index of the statement's first token (1 after `async`).
    start: usize,
}

impl<'a> Line<'a> {
    fn defined_name(&self) -> Option<&'a Token> {
        match self.head {
            Some("def") | Some("class") => self
                .tokens
                .get(self.start + 1)
                .copied()
                .filter(|t| t.kind == IDENTIFIER),
            _ => None,
        }
    }

    /// Scope depth at `token`: every `:` seen so far in the file.
    fn scope_of(&self, token: &Token) -> usize {
        self.colons_before
            + self
                .tokens
                .iter()
                .filter(|t| t.position.offset < token.position.offset && is_punct(t, ":"))
                .count()
    }
}

fn place_lines(tokens: &[Token]) -> Vec<Line<'_>> {
    struct Block<'a> {
        level: usize,
        function: Option<&'a str>,
        class: bool,
    }

    let mut stack: Vec<Block<'_>> = Vec::new();
    let mut lines = Vec::new();
    let mut colons = 0;
    for logical in logical_lines(tokens) {
        let level = logical.level();
        while stack.last().is_some_and(|b| b.level >= level) {
            stack.pop();
        }
        let mut line = Line {
            depth: stack.len(),
            colons_before: colons,
            function: stack.iter().rev().find_map(|b| b.function),
            class_body: stack.last().is_some_and(|b| b.class),
            head: logical.head_keyword(),
            start: logical.tokens.len() - logical.statement().len(),
            tokens: Vec::new(),
        };
        let opens_block = logical.opens_block();
        colons += logical.tokens.iter().filter(|t| is_punct(t, ":")).count();
        line.tokens = logical.tokens;
        if opens_block {
            let name = line.defined_name().map(|t| t.value.as_str());
            stack.push(Block {
                level,
                function: name.filter(|_| line.head == Some("def")),
                class: line.head == Some("class"),
            });
        }
        lines.push(line);
    }
    lines
}

/// Bracket nesting before each token.
fn bracket_depths(tokens: &[&Token]) -> Vec<usize> {
    let mut depth = 0usize;
    tokens
        .iter()
        .map(|t| {
            let before = depth;
            if t.kind == BRACKET {
                match t.value.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    _ => depth = depth.saturating_sub(1),
                }
            }
            before
        })
        .collect()
}

/// Index of the bracket closing the one at `open`.
fn closing_index(tokens: &[&Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.kind != BRACKET {
            continue;
        }
        match token.value.as_str() {
            "(" | "[" | "{" => depth += 1,
            _ => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
        }
    }
    None
}

/// Comma-separated top-level segments between `open` and `close`.
fn arguments<'t, 'a>(tokens: &'t [&'a Token], open: usize, close: usize) -> Vec<&'t [&'a Token]> {
    let inner = &tokens[open + 1..close];
    if inner.is_empty() {
        return Vec::new();
    }
    let depths = bracket_depths(inner);
    let mut segments = Vec::new();
    let mut begin = 0;
    for (i, token) in inner.iter().enumerate() {
        if depths[i] == 0 && is_punct(token, ",") {
            segments.push(&inner[begin..i]);
            begin = i + 1;
        }
    }
    if begin < inner.len() {
        segments.push(&inner[begin..]);
    }
    segments
}

fn numeric_value(token: &Token) -> Option<f64> {
    if token.kind != INTEGER && token.kind != FLOAT {
        return None;
    }
    token.value.replace('_', "").parse::<f64>().ok()
}

/// Integer literal, optionally negated.
fn integer_argument(segment: &[&Token]) -> Option<i64> {
    match segment {
        [t] if t.kind == INTEGER => t.value.replace('_', "").parse().ok(),
        [sign, t] if is_operator(sign, "-") && t.kind == INTEGER => {
            t.value.replace('_', "").parse::<i64>().ok().map(|v| -v)
        }
        _ => None,
    }
}

/// How each name in a line is bound or used.
#[derive(Default)]
struct Bindings<'a> {
    /// Bound before the line's uses: loop targets, `as` names, lambda
    /// parameters, walrus targets.
    early: Vec<&'a Token>,
    /// Bound by `import`.
    imports: Vec<&'a Token>,
    /// `global` / `nonlocal` names, bound at module level.
    globals: Vec<&'a Token>,
    /// Parameters of a `def` header; bound inside the new block.
    params: Vec<&'a Token>,
    /// Assignment targets; bound after the right-hand side.
    targets: Vec<&'a Token>,
    /// Augmented-assignment targets; a use and a binding.
    augmented: Vec<&'a Token>,
    /// Comprehension targets.
    comprehension: Vec<&'a Token>,
    /// Identifier positions that are not uses.
    skip: BTreeSet<usize>,
}

fn bindings<'a>(line: &Line<'a>) -> Bindings<'a> {
    let tokens = &line.tokens;
    let start = line.start;
    let depths = bracket_depths(tokens);
    let mut b = Bindings::default();
    let ident = |i: usize| tokens.get(i).copied().filter(|t| t.kind == IDENTIFIER);

    match line.head {
        Some("import") | Some("from") => {
            for (i, token) in tokens.iter().enumerate() {
                if token.kind == IDENTIFIER {
                    b.skip.insert(i);
                }
            }
            let names_from = tokens
                .iter()
                .position(|t| is_keyword(t, "import"))
                .map_or(tokens.len(), |i| i + 1);
            let mut segment: Vec<&'a Token> = Vec::new();
            let flush = |segment: &mut Vec<&'a Token>, b: &mut Bindings<'a>| {
                let bound = match segment.iter().position(|t| is_keyword(t, "as")) {
                    Some(i) => segment.get(i + 1).copied(),
                    None => segment.first().copied(),
                };
                if let Some(t) = bound.filter(|t| t.kind == IDENTIFIER) {
                    b.imports.push(t);
                }
                segment.clear();
            };
            for &token in &tokens[names_from.min(tokens.len())..] {
                if is_punct(token, ",") {
                    flush(&mut segment, &mut b);
                } else if token.kind != BRACKET {
                    segment.push(token);
                }
            }
            flush(&mut segment, &mut b);
            return b;
        }
        Some("global") | Some("nonlocal") => {
            for (i, &token) in tokens.iter().enumerate() {
                if token.kind == IDENTIFIER {
                    b.skip.insert(i);
                    b.globals.push(token);
                }
            }
            return b;
        }
        Some("def") => {
            b.skip.insert(start + 1);
            let open = start + 2;
            if tokens.get(open).is_some_and(|t| is_bracket(t, "(")) {
                let close = closing_index(tokens, open).unwrap_or(tokens.len());
                for i in open + 1..close {
                    let leads = is_bracket(tokens[i - 1], "(")
                        || is_punct(tokens[i - 1], ",")
                        || is_operator(tokens[i - 1], "*")
                        || is_operator(tokens[i - 1], "**");
                    if leads && depths[i] == depths[open] + 1 {
                        if let Some(t) = ident(i) {
                            b.params.push(t);
                            b.skip.insert(i);
                        }
                    }
                }
            }
        }
        Some("class") => {
            b.skip.insert(start + 1);
        }
        Some("for") => {
            let mut i = start + 1;
            while i < tokens.len() && !(is_keyword(tokens[i], "in") && depths[i] == 0) {
                if let Some(t) = ident(i) {
                    b.early.push(t);
                    b.skip.insert(i);
                }
                i += 1;
            }
        }
        _ => {}
    }

    for (i, &token) in tokens.iter().enumerate() {
        if is_punct(token, ".") && ident(i + 1).is_some() {
            b.skip.insert(i + 1);
        } else if token.kind == IDENTIFIER
            && depths[i] > 0
            && tokens.get(i + 1).is_some_and(|t| is_operator(t, "="))
        {
            // keyword argument name
            b.skip.insert(i);
        } else if is_keyword(token, "lambda") {
            let mut j = i + 1;
            while j < tokens.len() && !(is_punct(tokens[j], ":") && depths[j] == depths[i]) {
                if let Some(t) = ident(j) {
                    b.early.push(t);
                    b.skip.insert(j);
                }
                j += 1;
            }
        } else if is_keyword(token, "for") && i != start {
            let mut j = i + 1;
            while j < tokens.len() && !is_keyword(tokens[j], "in") {
                if let Some(t) = ident(j) {
                    b.comprehension.push(t);
                    b.skip.insert(j);
                }
                j += 1;
            }
        } else if is_keyword(token, "as") {
            if let Some(t) = ident(i + 1) {
                b.early.push(t);
                b.skip.insert(i + 1);
            }
        } else if is_operator(token, ":=") && i > 0 {
            if let Some(t) = ident(i - 1) {
                b.early.push(t);
                b.skip.insert(i - 1);
            }
        }
    }

    let starts_assignment = line.head.is_none()
        && tokens.get(start).is_some_and(|t| {
            t.kind == IDENTIFIER
                || is_bracket(t, "(")
                || is_bracket(t, "[")
                || is_operator(t, "*")
        });
    if !starts_assignment {
        return b;
    }

    if let (Some(t), Some(op)) = (ident(start), tokens.get(start + 1)) {
        if op.kind == OPERATOR && AUGMENTED.contains(&op.value.as_str()) {
            b.augmented.push(t);
            return b;
        }
    }

    let equals: Vec<usize> = (start..tokens.len())
        .filter(|&i| depths[i] == 0 && is_operator(tokens[i], "="))
        .collect();
    let annotation = (start..tokens.len()).find(|&i| depths[i] == 0 && is_punct(tokens[i], ":"));
    let lhs_end = match (annotation, equals.first(), equals.last()) {
        (Some(colon), first, _) if first.map_or(true, |&eq| colon < eq) => colon,
        (_, _, Some(&last)) => last,
        _ => return b,
    };

    // Only brackets that open a tuple or list target keep their contents
    // as targets; subscripts and calls do not.
    let mut destructuring: Vec<bool> = Vec::new();
    for i in start..lhs_end {
        let token = tokens[i];
        if token.kind == BRACKET {
            match token.value.as_str() {
                "(" | "[" | "{" => {
                    let opens_target = i == start
                        || is_punct(tokens[i - 1], ",")
                        || is_bracket(tokens[i - 1], "(")
                        || is_bracket(tokens[i - 1], "[")
                        || is_operator(tokens[i - 1], "=");
                    destructuring.push(opens_target);
                }
                _ => {
                    destructuring.pop();
                }
            }
            continue;
        }
        if token.kind != IDENTIFIER || !destructuring.iter().all(|d| *d) {
            continue;
        }
        let after_dot = i > 0 && is_punct(tokens[i - 1], ".");
        let accessed = tokens
            .get(i + 1)
            .is_some_and(|t| is_punct(t, ".") || is_bracket(t, "[") || is_bracket(t, "("));
        if !after_dot && !accessed {
            b.targets.push(token);
            b.skip.insert(i);
        }
    }
    b
}

/// Declared-before-use, call arity and suspicious-construct checks.
///
/// Scope is approximated by a depth counter that grows by one at every `:`
/// token in the file and never shrinks. A use is valid when the name has
/// been bound at a depth no deeper than the use. Functions, classes and
/// comprehension targets are hoisted to the whole file.
#[derive(Debug, Default)]
pub struct PythonSemantics;

impl PythonSemantics {
    pub fn new() -> Self {
        Self
    }
}

impl SemanticAnalyzer for PythonSemantics {
    fn analyze(&self, tokens: &[Token], symbols: SymbolTable) -> SemanticOutput {
        let lines = place_lines(tokens);
        let bound: Vec<Bindings<'_>> = lines.iter().map(bindings).collect();

        let mut analysis = Analysis::new(symbols);
        analysis.hoist(&lines, &bound);
        for (line, b) in lines.iter().zip(&bound) {
            analysis.walk_line(line, b);
        }
        analysis.report_unused();
        for (index, line) in lines.iter().enumerate() {
            analysis.check_arithmetic_name(&lines, index);
            analysis.check_constructor(&lines, &bound, index);
            analysis.check_empty_range(line);
            analysis.check_or_gap(line);
        }

        SemanticOutput {
            symbols: analysis.symbols,
            diagnostics: analysis.diagnostics.into_diagnostics(),
        }
    }
}

struct Analysis<'a> {
    symbols: SymbolTable,
    diagnostics: DiagnosticBag,
    /// Functions, classes and comprehension targets.
    hoisted: BTreeSet<&'a str>,
    /// Every name bound anywhere in the file.
    bound_anywhere: BTreeSet<&'a str>,
    /// Names bound at module level anywhere in the file.
    module_level: BTreeSet<&'a str>,
    /// Scope depths at which each name has been bound so far.
    assigned: BTreeMap<&'a str, BTreeSet<usize>>,
    used: BTreeSet<String>,
    /// First plain assignment of each variable, in source order.
    first_assignments: Vec<&'a Token>,
    first_assigned: BTreeSet<&'a str>,
}

impl<'a> Analysis<'a> {
    fn new(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            diagnostics: DiagnosticBag::new(ErrorKind::Semantic),
            hoisted: BTreeSet::new(),
            bound_anywhere: BTreeSet::new(),
            module_level: BTreeSet::new(),
            assigned: BTreeMap::new(),
            used: BTreeSet::new(),
            first_assignments: Vec::new(),
            first_assigned: BTreeSet::new(),
        }
    }

    fn hoist(&mut self, lines: &[Line<'a>], bound: &[Bindings<'a>]) {
        for (line, b) in lines.iter().zip(bound) {
            if let Some(name) = line.defined_name() {
                self.hoisted.insert(name.value.as_str());
            }
            for t in &b.comprehension {
                self.hoisted.insert(t.value.as_str());
            }
            let plain = b
                .early
                .iter()
                .chain(&b.imports)
                .chain(&b.targets)
                .chain(&b.augmented);
            for t in plain {
                self.bound_anywhere.insert(t.value.as_str());
                if line.depth == 0 {
                    self.module_level.insert(t.value.as_str());
                }
            }
            for t in &b.params {
                self.bound_anywhere.insert(t.value.as_str());
            }
            for t in &b.globals {
                self.bound_anywhere.insert(t.value.as_str());
                self.module_level.insert(t.value.as_str());
            }
        }
    }

    fn bind(&mut self, token: &'a Token, depth: usize) {
        self.assigned
            .entry(token.value.as_str())
            .or_default()
            .insert(depth);
    }

    fn bind_here(&mut self, token: &'a Token, line: &Line<'a>) {
        self.bind(token, line.scope_of(token));
    }

    fn check_shadowing(&mut self, token: &Token) {
        if SHADOWABLE.contains(&token.value.as_str()) {
            self.diagnostics.warning(
                format!("'{}' shadows a built-in name", token.value),
                token,
            );
        }
    }

    fn declare(&mut self, token: &Token, line: &Line<'a>, data_type: &str) {
        if self.symbols.contains(&token.value) {
            return;
        }
        self.symbols.insert(
            Symbol::new(token.value.as_str(), SymbolKind::Variable, token.position)
                .with_type(data_type)
                .with_scope(line.function.unwrap_or("global"))
                .initialized(),
        );
    }

    fn walk_line(&mut self, line: &Line<'a>, b: &Bindings<'a>) {
        for &t in &b.early {
            self.bind_here(t, line);
            self.check_shadowing(t);
            self.declare(t, line, "unknown");
        }
        for &t in &b.imports {
            self.bind_here(t, line);
            self.declare(t, line, "module");
        }
        for &t in &b.globals {
            self.bind(t, 0);
        }
        for &t in &b.params {
            self.bind_here(t, line);
            self.check_shadowing(t);
        }
        if let Some(name) = line.defined_name() {
            self.check_shadowing(name);
        }

        for (i, &token) in line.tokens.iter().enumerate() {
            if token.kind == IDENTIFIER && !b.skip.contains(&i) {
                self.use_name(token, line);
            } else if token.kind == STRING {
                self.use_format_fields(token);
            }
        }

        for &t in &b.augmented {
            self.bind_here(t, line);
        }
        for &t in &b.targets {
            self.bind_here(t, line);
            self.check_shadowing(t);
            self.declare(t, line, "unknown");
            let name = t.value.as_str();
            let reportable = !line.class_body
                && !name.starts_with('_')
                && !name.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit());
            if reportable && self.first_assigned.insert(name) {
                self.first_assignments.push(t);
            }
        }

        self.check_condition_assignment(line);
        self.check_boolean_literals(line);
        self.check_zero_division(line);
        self.check_concatenation(line);
        self.check_calls(line);
    }

    fn use_name(&mut self, token: &'a Token, line: &Line<'a>) {
        let name = token.value.as_str();
        self.used.insert(name.to_string());
        if BUILTINS.contains(&name) || self.hoisted.contains(name) {
            return;
        }
        let inherited = line.function.is_some() && self.module_level.contains(name);
        let depth = line.scope_of(token);
        match self.assigned.get(name) {
            Some(depths) if depths.iter().any(|d| *d <= depth) => {}
            _ if inherited => {}
            Some(_) => self.diagnostics.warning(
                format!(
                    "Variable '{}' may be uninitialized: it is only assigned at a deeper scope",
                    name
                ),
                token,
            ),
            None if self.bound_anywhere.contains(name) => self.diagnostics.warning(
                format!("Variable '{}' is used before it is assigned", name),
                token,
            ),
            None => self
                .diagnostics
                .error(format!("Undeclared variable '{}'", name), token),
        }
    }

    /// Names referenced from f-string fields count as uses.
    fn use_format_fields(&mut self, token: &Token) {
        let is_format = token
            .value
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .any(|c| c == 'f' || c == 'F');
        let Some(field) = FSTRING_FIELD.as_ref().filter(|_| is_format) else {
            return;
        };
        for caps in field.captures_iter(&token.value) {
            if let Some(name) = caps.get(1) {
                self.used.insert(name.as_str().to_string());
            }
        }
    }

    fn report_unused(&mut self) {
        let unused: Vec<&Token> = self
            .first_assignments
            .iter()
            .copied()
            .filter(|t| !self.used.contains(&t.value))
            .collect();
        for token in unused {
            self.diagnostics.warning(
                format!("Variable '{}' is assigned but never used", token.value),
                token,
            );
        }
    }

    fn check_condition_assignment(&mut self, line: &Line<'a>) {
        if !matches!(line.head, Some("if") | Some("elif") | Some("while")) {
            return;
        }
        let depths = bracket_depths(&line.tokens);
        for (i, &token) in line.tokens.iter().enumerate().skip(line.start + 1) {
            if depths[i] == 0 && is_punct(token, ":") {
                break;
            }
            if depths[i] == 0 && is_operator(token, "=") {
                self.diagnostics.error(
                    "Assignment '=' in condition; did you mean '=='?",
                    token,
                );
            }
        }
    }

    fn check_boolean_literals(&mut self, line: &Line<'a>) {
        for pair in line.tokens.windows(2) {
            let (op, literal) = (pair[0], pair[1]);
            if op.kind != KEYWORD || literal.kind != BOOLEAN {
                continue;
            }
            let message = match (op.value.as_str(), literal.value.as_str()) {
                ("or", "True") => "'or True' makes the condition always true".to_string(),
                ("and", "False") => "'and False' makes the condition always false".to_string(),
                (o @ ("or" | "and"), l) => format!("'{} {}' has no effect on the condition", o, l),
                _ => continue,
            };
            self.diagnostics.warning(message, literal);
        }
    }

    fn check_zero_division(&mut self, line: &Line<'a>) {
        for pair in line.tokens.windows(2) {
            let (op, divisor) = (pair[0], pair[1]);
            let is_division = op.kind == OPERATOR
                && matches!(op.value.as_str(), "/" | "//" | "%" | "/=" | "//=" | "%=");
            if is_division && numeric_value(divisor) == Some(0.0) {
                let message = if op.value.starts_with('%') {
                    "Modulo by zero"
                } else {
                    "Division by zero"
                };
                self.diagnostics.error(message, divisor);
            }
        }
    }

    /// Static type of a simple `+` operand: a literal or a typed variable.
    fn operand_type(&self, tokens: &[&Token], index: usize) -> Option<String> {
        let token = tokens[index];
        let attribute = index > 0 && is_punct(tokens[index - 1], ".");
        let accessed = tokens
            .get(index + 1)
            .is_some_and(|t| is_bracket(t, "(") || is_bracket(t, "[") || is_punct(t, "."));
        if attribute || accessed {
            return None;
        }
        if let Some(ty) = literal_type(token) {
            return Some(ty.to_string());
        }
        if token.kind != IDENTIFIER {
            return None;
        }
        self.symbols
            .get_kind(&token.value, SymbolKind::Variable)
            .map(|s| s.data_type.clone())
    }

    fn check_concatenation(&mut self, line: &Line<'a>) {
        let tokens = &line.tokens;
        for i in 1..tokens.len().saturating_sub(1) {
            if !is_operator(tokens[i], "+") {
                continue;
            }
            let (Some(left), Some(right)) =
                (self.operand_type(tokens, i - 1), self.operand_type(tokens, i + 1))
            else {
                continue;
            };
            let numeric = |ty: &str| ty == "int" || ty == "float";
            if (left == "str" && numeric(&right)) || (numeric(&left) && right == "str") {
                self.diagnostics.error(
                    format!(
                        "Cannot add {} and {}: convert the number with str() first",
                        left, right
                    ),
                    tokens[i],
                );
            }
        }
    }

    fn check_calls(&mut self, line: &Line<'a>) {
        let tokens = &line.tokens;
        for i in 0..tokens.len() {
            let callee = tokens[i];
            if callee.kind != IDENTIFIER || !tokens.get(i + 1).is_some_and(|t| is_bracket(t, "(")) {
                continue;
            }
            let method_or_definition = i > 0
                && (is_punct(tokens[i - 1], ".")
                    || is_keyword(tokens[i - 1], "def")
                    || is_keyword(tokens[i - 1], "class"));
            if method_or_definition {
                continue;
            }
            if let Some(close) = closing_index(tokens, i + 1) {
                self.check_call(callee, &arguments(tokens, i + 1, close));
            }
        }
    }

    /// Compare a call's arguments with the parameters recorded for the
    /// function. Methods (a leading `self`/`cls`) and calls that unpack
    /// `*args` or `**kwargs` are not checked.
    fn check_call(&mut self, callee: &Token, args: &[&[&Token]]) {
        let name = callee.value.as_str();
        if self.symbols.get_kind(name, SymbolKind::Function).is_none() {
            return;
        }
        let params: Vec<&Symbol> = self
            .symbols
            .in_scope(name)
            .filter(|s| s.kind == SymbolKind::Parameter)
            .collect();
        if params.iter().any(|p| p.name == "self" || p.name == "cls") {
            return;
        }
        let positional: Vec<&str> = params
            .iter()
            .filter(|p| p.data_type == "positional")
            .map(|p| p.name.as_str())
            .collect();
        let required = params
            .iter()
            .filter(|p| p.data_type == "positional" && p.value.is_none())
            .count();
        let has_varargs = params.iter().any(|p| p.data_type == "varargs");
        let has_kwargs = params.iter().any(|p| p.data_type == "kwargs");
        let max = (!has_varargs).then_some(positional.len());

        let mut given = 0usize;
        let mut unknown_keyword = None;
        for arg in args {
            match arg {
                [star, ..] if is_operator(star, "*") || is_operator(star, "**") => return,
                [key, eq, ..] if key.kind == IDENTIFIER && is_operator(eq, "=") => {
                    if positional.contains(&key.value.as_str()) {
                        given += 1;
                    } else if !has_kwargs && unknown_keyword.is_none() {
                        unknown_keyword = Some(key.value.clone());
                    }
                }
                [] => {}
                _ => given += 1,
            }
        }

        if let Some(keyword) = unknown_keyword {
            self.diagnostics.error(
                format!("Function '{}' has no parameter named '{}'", name, keyword),
                callee,
            );
            return;
        }
        if given < required || max.is_some_and(|m| given > m) {
            let expected = match max {
                Some(m) if m == required => required.to_string(),
                Some(m) => format!("{} to {}", required, m),
                None => format!("at least {}", required),
            };
            let noun = if expected == "1" { "argument" } else { "arguments" };
            let verb = if given == 1 { "was" } else { "were" };
            self.diagnostics.error(
                format!(
                    "Function '{}' expects {} {} but {} {} given",
                    name, expected, noun, given, verb
                ),
                callee,
            );
        }
    }

    /// A function named for one arithmetic operation whose body only uses
    /// another.
    fn check_arithmetic_name(&mut self, lines: &[Line<'a>], index: usize) {
        let line = &lines[index];
        if line.head != Some("def") {
            return;
        }
        let Some(name) = line.defined_name() else {
            return;
        };
        let lower = name.value.to_ascii_lowercase();
        let Some(&(_, expected, operation)) = ARITHMETIC_NAMES
            .iter()
            .find(|(fragment, _, _)| lower.contains(fragment))
        else {
            return;
        };

        let mut operators: Vec<&Token> = Vec::new();
        for body in lines[index + 1..].iter().take_while(|l| l.depth > line.depth) {
            for (i, &token) in body.tokens.iter().enumerate() {
                let arithmetic = token.kind == OPERATOR
                    && matches!(token.value.as_str(), "+" | "-" | "*" | "/" | "//");
                let binary = i > 0 && {
                    let prev = body.tokens[i - 1];
                    prev.kind == IDENTIFIER
                        || numeric_value(prev).is_some()
                        || is_bracket(prev, ")")
                        || is_bracket(prev, "]")
                };
                if arithmetic && binary {
                    operators.push(token);
                }
            }
        }
        let matches_expected = |t: &&Token| {
            t.value == expected || (expected == "/" && t.value == "//")
        };
        if operators.is_empty() || operators.iter().any(matches_expected) {
            return;
        }
        self.diagnostics.warning(
            format!(
                "Function '{}' suggests {} but its body uses '{}'",
                name.value, operation, operators[0].value
            ),
            name,
        );
    }

    /// `self.a = b` in `__init__` where both `a` and `b` are parameters.
    fn check_constructor(&mut self, lines: &[Line<'a>], bound: &[Bindings<'a>], index: usize) {
        let line = &lines[index];
        if line.defined_name().map(|t| t.value.as_str()) != Some("__init__") {
            return;
        }
        let params: BTreeSet<&str> = bound[index]
            .params
            .iter()
            .map(|t| t.value.as_str())
            .collect();
        for body in lines[index + 1..].iter().take_while(|l| l.depth > line.depth) {
            let [receiver, dot, attr, eq, value] = body.tokens.as_slice() else {
                continue;
            };
            let shaped = receiver.value == "self"
                && is_punct(dot, ".")
                && is_operator(eq, "=")
                && value.kind == IDENTIFIER;
            if shaped
                && attr.value != value.value
                && params.contains(attr.value.as_str())
                && params.contains(value.value.as_str())
            {
                self.diagnostics.warning(
                    format!(
                        "Constructor assigns parameter '{}' to 'self.{}'; expected 'self.{} = {}'",
                        value.value, attr.value, attr.value, attr.value
                    ),
                    *eq,
                );
            }
        }
    }

    fn check_empty_range(&mut self, line: &Line<'a>) {
        if line.head != Some("for") {
            return;
        }
        let tokens = &line.tokens;
        for i in 0..tokens.len() {
            if tokens[i].value != "range" || !tokens.get(i + 1).is_some_and(|t| is_bracket(t, "(")) {
                continue;
            }
            let Some(close) = closing_index(tokens, i + 1) else {
                continue;
            };
            let values: Option<Vec<i64>> = arguments(tokens, i + 1, close)
                .into_iter()
                .map(integer_argument)
                .collect();
            let empty = match values.as_deref() {
                Some(&[start, stop]) => start > stop,
                Some(&[start, stop, step]) => {
                    (step > 0 && start > stop) || (step < 0 && start < stop)
                }
                _ => false,
            };
            if empty {
                let shown: Vec<String> = values
                    .unwrap_or_default()
                    .iter()
                    .map(|v| v.to_string())
                    .collect();
                self.diagnostics.warning(
                    format!(
                        "Loop over range({}) never runs: the range is empty",
                        shown.join(", ")
                    ),
                    tokens[i],
                );
            }
        }
    }

    /// `x < a or x > b` with `a < b` leaves `a..=b` unhandled.
    fn check_or_gap(&mut self, line: &Line<'a>) {
        if !matches!(line.head, Some("if") | Some("elif") | Some("while")) {
            return;
        }
        for window in line.tokens.windows(7) {
            let [var1, op1, n1, or, var2, op2, n2] = window else {
                continue;
            };
            if !is_keyword(or, "or")
                || var1.kind != IDENTIFIER
                || var1.value != var2.value
                || op1.kind != OPERATOR
                || op2.kind != OPERATOR
            {
                continue;
            }
            let (Some(v1), Some(v2)) = (numeric_value(n1), numeric_value(n2)) else {
                continue;
            };
            let below = |op: &str| op == "<" || op == "<=";
            let above = |op: &str| op == ">" || op == ">=";
            let (low, low_op, high, high_op, low_text, high_text) =
                if below(&op1.value) && above(&op2.value) {
                    (v1, op1.value.as_str(), v2, op2.value.as_str(), &n1.value, &n2.value)
                } else if above(&op1.value) && below(&op2.value) {
                    (v2, op2.value.as_str(), v1, op1.value.as_str(), &n2.value, &n1.value)
                } else {
                    continue;
                };
            let gap = low < high || (low == high && low_op == "<" && high_op == ">");
            if gap {
                self.diagnostics.warning(
                    format!(
                        "Condition on '{}' leaves a gap: values from {} to {} match neither side of 'or'",
                        var1.value, low_text, high_text
                    ),
                    *or,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{PythonScanner, Scanner};
    use polylex_common::Severity;

    fn run(source: &str) -> SemanticOutput {
        let lexical = PythonScanner::new().unwrap().analyze_lexical(source).unwrap();
        PythonSemantics::new().analyze(&lexical.tokens, lexical.symbols)
    }

    fn messages(source: &str) -> Vec<String> {
        run(source).diagnostics.into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn declared_variable_is_clean() {
        assert!(messages("x = 1\nprint(x)\n").is_empty());
    }

    #[test]
    fn undeclared_variable() {
        let output = run("print(y)\n");
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].message, "Undeclared variable 'y'");
        assert_eq!(output.diagnostics[0].severity, Severity::Error);
        assert_eq!(output.diagnostics[0].column(), 7);
    }

    #[test]
    fn use_before_assignment() {
        assert_eq!(
            messages("print(z)\nz = 1\n"),
            vec!["Variable 'z' is used before it is assigned"]
        );
    }

    #[test]
    fn names_assigned_in_a_block_stay_visible_after_it() {
        assert!(messages("c = True\nif c:\n    w = 1\nprint(w)\n").is_empty());
    }

    #[test]
    fn scope_depth_counts_every_colon() {
        let tokens = PythonScanner::new()
            .unwrap()
            .tokenize("d = {1: 2}\nif d:\n    v = d[0:1]\n")
            .unwrap();
        let lines = place_lines(&tokens);
        assert_eq!(
            lines.iter().map(|l| l.colons_before).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        let slice_end = lines[2].tokens.iter().rev().nth(1).unwrap();
        assert_eq!(slice_end.value, "1");
        assert_eq!(lines[2].scope_of(slice_end), 3);
    }

    #[test]
    fn binding_after_a_colon_is_deeper_than_an_earlier_use() {
        assert_eq!(
            messages("print(k) or {0: (k := 1)}\n"),
            vec!["Variable 'k' may be uninitialized: it is only assigned at a deeper scope"]
        );
    }

    #[test]
    fn functions_see_module_level_names() {
        assert!(messages("def show():\n    print(total)\ntotal = 5\nshow()\n").is_empty());
    }

    #[test]
    fn binding_forms_are_recognized() {
        let source = "\
import os
from math import sqrt as root
def area(radius, scale=2, *extra):
    squares = [r * r for r in range(radius)]
    with open(os.devnull) as handle:
        handle.write(str(root(radius)))
    double = lambda v: v * scale
    name = 'x'
    print(f\"{name}\")
    return double(sum(squares))
area(3)
";
        let found = messages(source);
        assert!(found.is_empty(), "{:?}", found);
    }

    #[test]
    fn argument_counts() {
        let source = "\
def add(a, b):
    return a + b
add(1)
add(1, 2, 3)
add(1, b=2)
add(1, c=2)
";
        assert_eq!(
            messages(source),
            vec![
                "Function 'add' expects 2 arguments but 1 was given",
                "Function 'add' expects 2 arguments but 3 were given",
                "Function 'add' has no parameter named 'c'",
            ]
        );
    }

    #[test]
    fn methods_are_not_arity_checked() {
        let source = "\
class A:
    def m(self, x):
        return x
a = A()
a.m(1)
";
        assert!(messages(source).is_empty());
    }

    #[test]
    fn assignment_in_condition() {
        assert_eq!(
            messages("x = 1\nif x = 2:\n    pass\n"),
            vec!["Assignment '=' in condition; did you mean '=='?"]
        );
    }

    #[test]
    fn boolean_literal_after_logical_operator() {
        assert_eq!(
            messages("a = 1\nif a or True:\n    pass\n"),
            vec!["'or True' makes the condition always true"]
        );
    }

    #[test]
    fn division_by_zero_literal() {
        assert_eq!(
            messages("n = 10 / 0\nm = n % 0.0\nprint(m)\n"),
            vec!["Division by zero", "Modulo by zero"]
        );
    }

    #[test]
    fn string_plus_number() {
        let found = messages("count = 3\nlabel = 'total: ' + count\nprint(label)\nprint('a' + 1)\n");
        assert_eq!(
            found,
            vec![
                "Cannot add str and int: convert the number with str() first",
                "Cannot add str and int: convert the number with str() first",
            ]
        );
    }

    #[test]
    fn builtin_shadowing() {
        assert_eq!(
            messages("list = [1, 2]\nprint(list)\n"),
            vec!["'list' shadows a built-in name"]
        );
    }

    #[test]
    fn unused_variable() {
        assert_eq!(
            messages("temp = 5\nLIMIT = 3\n_ignored = 1\n"),
            vec!["Variable 'temp' is assigned but never used"]
        );
    }

    #[test]
    fn misnamed_arithmetic_function() {
        assert_eq!(
            messages("def add_numbers(a, b):\n    return a - b\n"),
            vec!["Function 'add_numbers' suggests addition but its body uses '-'"]
        );
        assert!(messages("def add_numbers(a, b):\n    return a + -b\n").is_empty());
    }

    #[test]
    fn constructor_parameter_swap() {
        let source = "\
class Person:
    def __init__(self, name, age):
        self.name = age
        self.age = name
";
        let found = messages(source);
        assert_eq!(found.len(), 2);
        assert!(found[0].starts_with("Constructor assigns parameter 'age' to 'self.name'"));
    }

    #[test]
    fn empty_range() {
        assert_eq!(
            messages("for i in range(10, 1):\n    print(i)\n"),
            vec!["Loop over range(10, 1) never runs: the range is empty"]
        );
        assert!(messages("for i in range(10, 1, -1):\n    print(i)\n").is_empty());
    }

    #[test]
    fn or_condition_gap() {
        assert_eq!(
            messages("x = 7\nif x < 5 or x > 10:\n    print(x)\n"),
            vec!["Condition on 'x' leaves a gap: values from 5 to 10 match neither side of 'or'"]
        );
        assert!(messages("x = 7\nif x < 10 or x > 5:\n    print(x)\n").is_empty());
    }

    #[test]
    fn semantic_symbols_are_added() {
        let output = run("import os\nfor item in os.listdir('.'):\n    print(item)\n");
        assert_eq!(output.symbols.get("os").unwrap().data_type, "module");
        assert_eq!(output.symbols.get("item").unwrap().kind, SymbolKind::Variable);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn fstring_pattern_compiles() {
        assert!(FSTRING_FIELD.is_some());
    }
}
