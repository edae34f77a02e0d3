use std::collections::BTreeMap;

use serde::Serialize;

use crate::span::Position;

/// The kind of a declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Table,
    Column,
    Parameter,
    Constant,
    Tag,
    Attribute,
    Unknown,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Table => "table",
            SymbolKind::Column => "column",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Constant => "constant",
            SymbolKind::Tag => "tag",
            SymbolKind::Attribute => "attribute",
            SymbolKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A named entity observed in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub data_type: String,
    pub scope: String,
    pub declared_at: Position,
    pub initialized: bool,
    pub value: Option<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, declared_at: Position) -> Self {
        Self {
            name: name.into(),
            kind,
            data_type: "unknown".to_string(),
            scope: "global".to_string(),
            declared_at,
            initialized: false,
            value: None,
        }
    }

    pub fn with_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn initialized(mut self) -> Self {
        self.initialized = true;
        self
    }

    pub fn declaration_line(&self) -> usize {
        self.declared_at.line
    }

    pub fn declaration_column(&self) -> usize {
        self.declared_at.column
    }
}

/// Symbols of one analysis run, keyed by plain name or `scope.name`.
///
/// Storage never rejects duplicates: the last insert for a key wins.
/// Detecting redeclarations is the job of the semantic analyzers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SymbolTable {
    symbols: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the key used for scope-qualified entries.
    pub fn qualified_key(scope: &str, name: &str) -> String {
        format!("{}.{}", scope, name)
    }

    /// Insert under the symbol's own name. Returns the replaced entry.
    pub fn insert(&mut self, symbol: Symbol) -> Option<Symbol> {
        let key = symbol.name.clone();
        self.symbols.insert(key, symbol)
    }

    /// Insert under `scope.name`. Returns the replaced entry.
    pub fn insert_qualified(&mut self, symbol: Symbol) -> Option<Symbol> {
        let key = Self::qualified_key(&symbol.scope, &symbol.name);
        self.symbols.insert(key, symbol)
    }

    /// Insert under an explicit key. Returns the replaced entry.
    pub fn insert_with_key(&mut self, key: impl Into<String>, symbol: Symbol) -> Option<Symbol> {
        self.symbols.insert(key.into(), symbol)
    }

    pub fn get(&self, key: &str) -> Option<&Symbol> {
        self.symbols.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(key)
    }

    pub fn get_qualified(&self, scope: &str, name: &str) -> Option<&Symbol> {
        self.symbols.get(&Self::qualified_key(scope, name))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.symbols.contains_key(key)
    }

    /// Look up `key` and require a specific kind.
    pub fn get_kind(&self, key: &str, kind: SymbolKind) -> Option<&Symbol> {
        self.symbols.get(key).filter(|s| s.kind == kind)
    }

    pub fn of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> {
        self.symbols.values().filter(move |s| s.kind == kind)
    }

    pub fn in_scope<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a Symbol> {
        self.symbols.values().filter(move |s| s.scope == scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Symbol)> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_defaults() {
        let sym = Symbol::new("x", SymbolKind::Variable, Position::new(2, 1, 6));
        assert_eq!(sym.data_type, "unknown");
        assert_eq!(sym.scope, "global");
        assert!(!sym.initialized);
        assert_eq!(sym.declaration_line(), 2);
        assert_eq!(sym.declaration_column(), 1);
    }

    #[test]
    fn last_insert_wins() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::new("x", SymbolKind::Variable, Position::new(1, 1, 0)));
        let replaced = table.insert(
            Symbol::new("x", SymbolKind::Function, Position::new(4, 1, 30)).with_type("int"),
        );
        assert!(replaced.is_some());
        assert_eq!(table.len(), 1);
        let sym = table.get("x").unwrap();
        assert_eq!(sym.kind, SymbolKind::Function);
        assert_eq!(sym.declaration_line(), 4);
    }

    #[test]
    fn qualified_entries() {
        let mut table = SymbolTable::new();
        table.insert_qualified(
            Symbol::new("id", SymbolKind::Column, Position::start())
                .with_scope("users")
                .with_type("INT"),
        );
        assert!(table.contains("users.id"));
        assert_eq!(table.get_qualified("users", "id").unwrap().data_type, "INT");
        assert!(table.get_kind("users.id", SymbolKind::Table).is_none());
        assert_eq!(table.in_scope("users").count(), 1);
        assert_eq!(table.of_kind(SymbolKind::Column).count(), 1);
    }
}
