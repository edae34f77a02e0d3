use polylex_common::{AnalysisError, DiagnosticBag, ErrorKind, Token};

use super::StructuralAnalyzer;
use crate::lexer::html::{is_open_tag, is_self_closing, is_void, tag_name, CLOSE_TAG, DOCTYPE};

/// Elements allowed only inside `<head>`.
const HEAD_ONLY: &[&str] = &["title", "meta", "base", "link"];

/// Elements allowed only inside `<body>`.
const BODY_ONLY: &[&str] = &[
    "div", "p", "span", "a", "img", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li",
    "table", "tr", "td", "th", "form", "button", "input", "label", "select", "textarea",
    "section", "article", "nav", "header", "footer", "main", "aside", "figure", "video",
    "audio", "canvas", "iframe", "br", "hr",
];

/// Elements that must appear exactly once in a document.
const SINGLETONS: &[&str] = &["html", "head", "body"];

/// Tag nesting, document cardinality and element placement.
#[derive(Debug, Default)]
pub struct HtmlStructure;

impl HtmlStructure {
    pub fn new() -> Self {
        Self
    }
}

impl StructuralAnalyzer for HtmlStructure {
    fn analyze(&self, tokens: &[Token]) -> Vec<AnalysisError> {
        let mut checker = Checker::new(tokens);
        checker.check_nesting();
        checker.check_cardinality();
        checker.check_placement();
        checker.diagnostics.into_diagnostics()
    }
}

struct Checker<'a> {
    tokens: &'a [Token],
    diagnostics: DiagnosticBag,
}

impl<'a> Checker<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            diagnostics: DiagnosticBag::new(ErrorKind::Syntactic),
        }
    }

    fn opens(&self, name: &str) -> impl Iterator<Item = &'a Token> + '_ {
        let name = name.to_string();
        self.tokens
            .iter()
            .filter(move |t| is_open_tag(t) && tag_name(t) == Some(name.as_str()))
    }

    fn check_nesting(&mut self) {
        let mut stack: Vec<&Token> = Vec::new();
        for token in self.tokens {
            let Some(name) = tag_name(token) else {
                continue;
            };
            if is_open_tag(token) {
                if !is_void(name) && !is_self_closing(token) {
                    stack.push(token);
                }
            } else if token.kind == CLOSE_TAG {
                match stack.pop() {
                    None => self.diagnostics.error(
                        format!("Orphan closing tag '</{}>' has no matching opening tag", name),
                        token,
                    ),
                    Some(open) => {
                        let open_name = tag_name(open).unwrap_or_default();
                        if open_name != name {
                            self.diagnostics.error(
                                format!(
                                    "Badly nested tags: expected '</{}>' but found '</{}>'",
                                    open_name, name
                                ),
                                token,
                            );
                        }
                    }
                }
            }
        }
        for open in stack {
            self.diagnostics.error(
                format!("Unclosed tag '<{}>'", tag_name(open).unwrap_or_default()),
                open,
            );
        }
    }

    fn check_cardinality(&mut self) {
        let doctypes: Vec<&Token> = self.tokens.iter().filter(|t| t.kind == DOCTYPE).collect();
        match doctypes.as_slice() {
            [] => self
                .diagnostics
                .document_error("Missing <!DOCTYPE html> declaration"),
            [_, extra @ ..] => {
                for token in extra {
                    self.diagnostics.error("Duplicate <!DOCTYPE> declaration", token);
                }
            }
        }

        for &element in SINGLETONS {
            let found: Vec<&Token> = self.opens(element).collect();
            match found.as_slice() {
                [] => self
                    .diagnostics
                    .document_error(format!("Missing <{}> element", element)),
                [_, extra @ ..] => {
                    for token in extra {
                        self.diagnostics
                            .error(format!("Duplicate <{}> element", element), token);
                    }
                }
            }
        }
    }

    /// Placement is only checked against sections the document actually
    /// has; a missing `<head>` or `<body>` is already reported above.
    fn check_placement(&mut self) {
        let has_head = self.opens("head").next().is_some();
        let has_body = self.opens("body").next().is_some();
        let mut in_head = false;
        let mut in_body = false;

        for token in self.tokens {
            let Some(name) = tag_name(token) else {
                continue;
            };
            if token.kind == CLOSE_TAG {
                match name {
                    "head" => in_head = false,
                    "body" => in_body = false,
                    _ => {}
                }
                continue;
            }
            if !is_open_tag(token) {
                continue;
            }
            match name {
                "head" => in_head = true,
                "body" => in_body = true,
                _ if has_head && !in_head && HEAD_ONLY.contains(&name) => {
                    self.diagnostics
                        .error(format!("<{}> must appear inside <head>", name), token);
                }
                _ if has_body && !in_body && BODY_ONLY.contains(&name) => {
                    self.diagnostics
                        .error(format!("<{}> must appear inside <body>", name), token);
                }
                _ => {}
            }
        }
    }
}
