use polylex_common::{Position, Token};
use regex::{Regex, RegexBuilder};

use super::{ScanAbort, ScanError};

/// Kind of horizontal whitespace runs. Consumed, never emitted.
pub const WHITESPACE: &str = "WHITESPACE";
/// Kind of line breaks. Consumed, never emitted.
pub const NEWLINE: &str = "NEWLINE";

/// How a rule set walks the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Every rule is tried, in order, anchored at the cursor.
    Anchored,
    /// One leftmost-first alternation of all rules is searched forward;
    /// text between matches is skipped and columns keep counting across
    /// newlines.
    Unanchored,
}

/// A single `(kind, pattern)` lexical rule.
#[derive(Debug)]
pub struct Rule {
    pub kind: &'static str,
    pattern: Regex,
}

/// Ordered list of lexical rules. Order is part of the contract: the
/// first rule that matches wins, so error-shaped patterns precede the
/// generic patterns they overlap with.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
    mode: ScanMode,
    /// Combined alternation used by `ScanMode::Unanchored`.
    combined: Option<Regex>,
}

/// Low-level position tracker over the source text.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    offset: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn new() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.offset)
    }

    /// Consume `text`, updating line and column per character.
    fn advance_over(&mut self, text: &str, reset_column: bool) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                if reset_column {
                    self.column = 1;
                } else {
                    self.column += 1;
                }
            } else {
                self.column += 1;
            }
        }
        self.offset += text.len();
    }
}

fn group_name(index: usize) -> String {
    format!("r{}", index)
}

impl RuleSet {
    pub fn new(
        specs: &[(&'static str, &str)],
        mode: ScanMode,
        case_insensitive: bool,
    ) -> Result<Self, ScanError> {
        let mut rules = Vec::with_capacity(specs.len());
        for &(kind, pattern) in specs {
            let regex = RegexBuilder::new(&format!("^(?:{})", pattern))
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| ScanError::InvalidPattern {
                    kind,
                    message: e.to_string(),
                })?;
            rules.push(Rule {
                kind,
                pattern: regex,
            });
        }

        let combined = match mode {
            ScanMode::Anchored => None,
            ScanMode::Unanchored => {
                let alternation = specs
                    .iter()
                    .enumerate()
                    .map(|(i, (_, pattern))| format!("(?P<{}>{})", group_name(i), pattern))
                    .collect::<Vec<_>>()
                    .join("|");
                let regex = RegexBuilder::new(&alternation)
                    .case_insensitive(case_insensitive)
                    .build()
                    .map_err(|e| ScanError::InvalidPattern {
                        kind: "<combined>",
                        message: e.to_string(),
                    })?;
                Some(regex)
            }
        };

        Ok(Self {
            rules,
            mode,
            combined,
        })
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.kind)
    }

    /// The first rule matching at the start of `rest`, with its length.
    fn match_at(&self, rest: &str) -> Option<(&'static str, usize)> {
        self.rules
            .iter()
            .find_map(|rule| rule.pattern.find(rest).map(|m| (rule.kind, m.end())))
    }

    /// Scan `source` into tokens. Whitespace and newline lexemes are
    /// consumed for position tracking only. An empty match stops the scan;
    /// the tokens collected up to that point travel with the error.
    pub fn scan(&self, source: &str) -> Result<Vec<Token>, ScanAbort> {
        match (&self.mode, &self.combined) {
            (ScanMode::Unanchored, Some(combined)) => self.scan_unanchored(combined, source),
            _ => self.scan_anchored(source),
        }
    }

    fn scan_anchored(&self, source: &str) -> Result<Vec<Token>, ScanAbort> {
        self.scan_anchored_to_end(source).map(|(tokens, _)| tokens)
    }

    /// Anchored scan that also hands back the cursor after the last byte.
    fn scan_anchored_to_end(&self, source: &str) -> Result<(Vec<Token>, Position), ScanAbort> {
        let mut cursor = Cursor::new();
        let mut tokens = Vec::new();

        while cursor.offset < source.len() {
            let rest = &source[cursor.offset..];
            match self.match_at(rest) {
                Some((kind, 0)) => {
                    return Err(ScanAbort {
                        tokens,
                        error: ScanError::EmptyMatch {
                            kind,
                            line: cursor.line,
                            column: cursor.column,
                        },
                    });
                }
                Some((kind, len)) => {
                    let lexeme = &rest[..len];
                    let start = cursor.position();
                    cursor.advance_over(lexeme, true);
                    if !is_skipped(kind) {
                        tokens.push(Token::new(lexeme, kind, start));
                    }
                }
                None => match rest.chars().next() {
                    Some(ch) => cursor.advance_over(&rest[..ch.len_utf8()], true),
                    None => break,
                },
            }
        }

        Ok((tokens, cursor.position()))
    }

    fn scan_unanchored(&self, combined: &Regex, source: &str) -> Result<Vec<Token>, ScanAbort> {
        let names: Vec<String> = (0..self.rules.len()).map(group_name).collect();
        let mut cursor = Cursor::new();
        let mut tokens = Vec::new();

        for caps in combined.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            // Skip over anything between the previous match and this one.
            if whole.start() > cursor.offset {
                cursor.advance_over(&source[cursor.offset..whole.start()], false);
            }
            let kind = names
                .iter()
                .position(|name| caps.name(name).is_some())
                .map(|i| self.rules[i].kind)
                .unwrap_or(polylex_common::token::INVALID);
            if whole.start() == whole.end() {
                return Err(ScanAbort {
                    tokens,
                    error: ScanError::EmptyMatch {
                        kind,
                        line: cursor.line,
                        column: cursor.column,
                    },
                });
            }
            let start = cursor.position();
            cursor.advance_over(whole.as_str(), false);
            if !is_skipped(kind) {
                tokens.push(Token::new(whole.as_str(), kind, start));
            }
        }

        Ok(tokens)
    }
}

fn is_skipped(kind: &str) -> bool {
    kind == WHITESPACE || kind == NEWLINE
}

/// Final line and column after consuming all of `source`, counting the
/// way the anchored scanner does.
pub fn end_position(source: &str) -> Position {
    let mut cursor = Cursor::new();
    cursor.advance_over(source, true);
    cursor.position()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_rules() -> RuleSet {
        RuleSet::new(
            &[
                ("NUMBER", r"\d+"),
                ("WORD", r"[a-z]+"),
                (WHITESPACE, r"[ \t]+"),
                (NEWLINE, r"\n"),
            ],
            ScanMode::Anchored,
            false,
        )
        .unwrap()
    }

    #[test]
    fn first_rule_wins() {
        let rules = RuleSet::new(
            &[("KEYWORD", r"if\b"), ("IDENT", r"[a-z]+")],
            ScanMode::Anchored,
            false,
        )
        .unwrap();
        let tokens = rules.scan("if iffy").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec!["KEYWORD", "IDENT"]);
        assert_eq!(tokens[1].value, "iffy");
    }

    #[test]
    fn whitespace_is_not_emitted_but_tracked() {
        let tokens = simple_rules().scan("ab 12\n  cd").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!((tokens[1].line(), tokens[1].column()), (1, 4));
        assert_eq!((tokens[2].line(), tokens[2].column()), (2, 3));
        assert_eq!(tokens[2].position.offset, 8);
    }

    #[test]
    fn unmatched_character_consumed_silently() {
        let tokens = simple_rules().scan("ab?cd").unwrap();
        let values: Vec<_> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["ab", "cd"]);
        assert_eq!(tokens[1].column(), 4);
    }

    #[test]
    fn multibyte_fallback_keeps_char_boundaries() {
        let tokens = simple_rules().scan("ab\u{e9}cd").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].column(), 4);
    }

    #[test]
    fn empty_match_aborts() {
        let rules = RuleSet::new(&[("BROKEN", r"x*")], ScanMode::Anchored, false).unwrap();
        let err = rules.scan("abc").unwrap_err();
        assert!(err.tokens.is_empty());
        assert_eq!(
            err.error,
            ScanError::EmptyMatch {
                kind: "BROKEN",
                line: 1,
                column: 1
            }
        );
    }

    #[test]
    fn empty_match_keeps_earlier_tokens() {
        let anchored =
            RuleSet::new(&[("A", "a"), ("BROKEN", "x*")], ScanMode::Anchored, false).unwrap();
        let err = anchored.scan("aab").unwrap_err();
        let values: Vec<_> = err.tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["a", "a"]);
        assert_eq!(
            err.to_string(),
            "lexical rule 'BROKEN' matched an empty lexeme at line 1, column 3"
        );

        let unanchored =
            RuleSet::new(&[("A", "a"), ("BROKEN", "x*")], ScanMode::Unanchored, false).unwrap();
        let err = unanchored.scan("aab").unwrap_err();
        assert_eq!(err.tokens.len(), 2);
        assert!(matches!(err.error, ScanError::EmptyMatch { kind: "BROKEN", .. }));
    }

    #[test]
    fn invalid_pattern_rejected() {
        let err = RuleSet::new(&[("BAD", r"(")], ScanMode::Anchored, false).unwrap_err();
        assert!(matches!(err, ScanError::InvalidPattern { kind: "BAD", .. }));
    }

    #[test]
    fn unanchored_columns_do_not_reset() {
        let rules = RuleSet::new(
            &[("WORD", r"[a-z]+"), (WHITESPACE, r"[ \t]+"), (NEWLINE, r"\n")],
            ScanMode::Unanchored,
            false,
        )
        .unwrap();
        let tokens = rules.scan("ab\ncd").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].line(), 2);
        assert_eq!(tokens[1].column(), 4);
    }

    #[test]
    fn unanchored_skips_unmatched_text() {
        let rules =
            RuleSet::new(&[("NUMBER", r"\d+")], ScanMode::Unanchored, false).unwrap();
        let tokens = rules.scan("a1 b22").unwrap();
        let values: Vec<_> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["1", "22"]);
        assert_eq!(tokens[1].column(), 5);
    }

    #[test]
    fn case_insensitive_rules() {
        let rules = RuleSet::new(&[("KW", r"select\b")], ScanMode::Anchored, true).unwrap();
        assert_eq!(rules.scan("SeLeCt").unwrap()[0].kind, "KW");
    }

    #[test]
    fn end_position_counts_lines() {
        let pos = end_position("ab\ncde\n");
        assert_eq!((pos.line, pos.column, pos.offset), (3, 1, 7));
    }

    #[test]
    fn end_position_agrees_with_a_full_scan() {
        let rules = simple_rules();
        for source in ["", "ab 12\n  cd", "x\n\n  9 ?\u{e9}", "trailing  \n"] {
            let (_, end) = rules.scan_anchored_to_end(source).unwrap();
            assert_eq!(end, end_position(source), "{:?}", source);
        }
    }
}
