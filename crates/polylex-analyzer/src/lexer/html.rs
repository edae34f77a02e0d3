use std::sync::LazyLock;

use polylex_common::token::INVALID;
use polylex_common::{Symbol, SymbolKind, SymbolTable, Token};
use regex::Regex;

use super::rules::{RuleSet, ScanMode, NEWLINE, WHITESPACE};
use super::{excerpt, ScanError, Scanner};
use crate::language::Language;

pub const COMMENT: &str = "COMMENT";
pub const DOCTYPE: &str = "DOCTYPE";
pub const CDATA: &str = "CDATA";
pub const PROCESSING_INSTRUCTION: &str = "PROCESSING_INSTRUCTION";
pub const VOID_TAG: &str = "VOID_TAG";
pub const CLOSE_TAG: &str = "CLOSE_TAG";
pub const RESERVED_TAG: &str = "RESERVED_TAG";
pub const TAG: &str = "TAG";
pub const ENTITY: &str = "ENTITY";
pub const TEXT: &str = "TEXT";
pub const ERROR_UNCLOSED_COMMENT: &str = "ERROR_UNCLOSED_COMMENT";
pub const ERROR_VOID_CLOSING_TAG: &str = "ERROR_VOID_CLOSING_TAG";
pub const ERROR_UNCLOSED_TAG: &str = "ERROR_UNCLOSED_TAG";
pub const ERROR_MALFORMED_ENTITY: &str = "ERROR_MALFORMED_ENTITY";

/// Elements that never have content or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Tag names the scanner classifies as `RESERVED_TAG`.
pub const RESERVED_TAGS: &[&str] = &[
    "html", "head", "body", "title", "div", "span", "p", "a", "ul", "ol", "li", "table",
    "thead", "tbody", "tfoot", "tr", "td", "th", "form", "label", "button", "select", "option",
    "textarea", "h1", "h2", "h3", "h4", "h5", "h6", "script", "style", "section", "article",
    "header", "footer", "nav", "main", "aside", "strong", "em", "b", "i", "u", "small", "pre",
    "code", "blockquote", "iframe", "video", "audio", "canvas", "figure", "figcaption",
    "noscript", "dl", "dt", "dd", "caption", "fieldset", "legend", "details", "summary",
];

/// Attributes that are meaningful without a value.
pub const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "async", "autofocus", "autoplay", "checked", "controls", "defer", "disabled", "hidden",
    "loop", "multiple", "muted", "novalidate", "open", "readonly", "required", "reversed",
    "selected", "allowfullscreen", "nomodule",
];

const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "cite", "poster", "formaction"];
const ID_ATTRIBUTES: &[&str] = &["id", "for"];
const NUMERIC_ATTRIBUTES: &[&str] = &[
    "width", "height", "tabindex", "colspan", "rowspan", "maxlength", "size", "rows", "cols",
    "min", "max", "step", "start",
];
const ENUMERATED_ATTRIBUTES: &[&str] = &[
    "target", "rel", "type", "method", "dir", "loading", "wrap", "crossorigin", "preload",
    "enctype",
];

/// Matches one attribute inside a tag: bare, quoted, single-quoted or unquoted.
static ATTRIBUTE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
    )
    .ok()
});

static NUMERIC_VALUE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?%?$").ok());

/// Classify an attribute value by the sub-pattern its name calls for.
pub fn classify_attribute(name: &str, value: &str) -> &'static str {
    let name = name.to_ascii_lowercase();
    let name = name.as_str();
    if URL_ATTRIBUTES.contains(&name) {
        "url"
    } else if ID_ATTRIBUTES.contains(&name) {
        "id"
    } else if NUMERIC_ATTRIBUTES.contains(&name)
        && NUMERIC_VALUE.as_ref().is_some_and(|re| re.is_match(value))
    {
        "numeric"
    } else if BOOLEAN_ATTRIBUTES.contains(&name)
        && (value.is_empty() || value.eq_ignore_ascii_case(name))
    {
        "boolean"
    } else if ENUMERATED_ATTRIBUTES.contains(&name) {
        "enumerated"
    } else {
        "text"
    }
}

/// True for tokens that open an element (void elements included).
pub fn is_open_tag(token: &Token) -> bool {
    matches!(token.kind, VOID_TAG | RESERVED_TAG | TAG)
}

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Lower-case tag name of a tag token.
pub fn tag_name(token: &Token) -> Option<&str> {
    token.subkind.as_deref()
}

/// True for `<div/>`-style tags.
pub fn is_self_closing(token: &Token) -> bool {
    token.value.ends_with("/>")
}

fn rule_specs() -> Vec<(&'static str, String)> {
    let void = VOID_ELEMENTS.join("|");
    let reserved = RESERVED_TAGS.join("|");
    let tag_body = r#"(?:[^>"']|"[^"]*"|'[^']*')*"#;
    vec![
        (COMMENT, r"<!--[\s\S]*?-->".to_string()),
        (ERROR_UNCLOSED_COMMENT, r"<!--[\s\S]*".to_string()),
        (DOCTYPE, r"<!doctype\b[^>]*>".to_string()),
        (CDATA, r"<!\[CDATA\[[\s\S]*?\]\]>".to_string()),
        (PROCESSING_INSTRUCTION, r"<\?[\s\S]*?\?>".to_string()),
        (ERROR_VOID_CLOSING_TAG, format!(r"</\s*(?:{})\s*>", void)),
        (VOID_TAG, format!(r"<(?:{})(?:[\s/]{})?>", void, tag_body)),
        (CLOSE_TAG, r"</\s*[a-z][a-z0-9-]*\s*>".to_string()),
        (RESERVED_TAG, format!(r"<(?:{})(?:[\s/]{})?>", reserved, tag_body)),
        (TAG, format!(r"<[a-z][a-z0-9-]*(?:[\s/]{})?>", tag_body)),
        (ERROR_UNCLOSED_TAG, r"<[a-z][a-z0-9-]*[^<>]*".to_string()),
        (ENTITY, r"&(?:[a-z][a-z0-9]*|#[0-9]+|#x[0-9a-f]+);".to_string()),
        (ERROR_MALFORMED_ENTITY, r"&(?:#x[0-9a-f]*|#[0-9]*|[a-z][a-z0-9]*)".to_string()),
        (TEXT, "&".to_string()),
        (WHITESPACE, r"[ \t\r]+".to_string()),
        (NEWLINE, r"\n".to_string()),
        (TEXT, r"[^<&\s]+".to_string()),
        (INVALID, r"(?s).".to_string()),
    ]
}

/// Scanner for HTML documents. Case-insensitive throughout.
#[derive(Debug)]
pub struct HtmlScanner {
    rules: RuleSet,
}

impl HtmlScanner {
    pub fn new() -> Result<Self, ScanError> {
        let specs = rule_specs();
        let borrowed: Vec<(&'static str, &str)> =
            specs.iter().map(|(kind, p)| (*kind, p.as_str())).collect();
        Ok(Self {
            rules: RuleSet::new(&borrowed, ScanMode::Anchored, true)?,
        })
    }

    /// Attach the lower-case tag name and parsed attributes to a tag token.
    fn decorate_tag(token: Token) -> Token {
        let raw = token.value.clone();
        let body = raw
            .trim_start_matches('<')
            .trim_start_matches('/')
            .trim_start();
        let name_len = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .unwrap_or(body.len());
        let name = body[..name_len].to_ascii_lowercase();
        if token.kind == CLOSE_TAG {
            return token.with_subkind(name);
        }

        let rest = body[name_len..].trim_end_matches('>').trim_end_matches('/');
        let mut token = token.with_subkind(name);
        if let Some(attribute) = ATTRIBUTE.as_ref() {
            for caps in attribute.captures_iter(rest) {
                let Some(attr_name) = caps.get(1) else {
                    continue;
                };
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map(|m| m.as_str())
                    .unwrap_or("");
                let key = attr_name.as_str().to_ascii_lowercase();
                // First occurrence wins, as browsers do.
                token.attributes.entry(key).or_insert_with(|| value.to_string());
            }
        }
        token
    }
}

impl Scanner for HtmlScanner {
    fn language(&self) -> Language {
        Language::Html
    }

    fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn error_message(&self, token: &Token) -> String {
        match token.kind {
            ERROR_UNCLOSED_COMMENT => {
                "Unclosed comment: '<!--' is never terminated by '-->'".to_string()
            }
            ERROR_VOID_CLOSING_TAG => format!(
                "Void element cannot have a closing tag: '{}'",
                token.value.trim()
            ),
            ERROR_UNCLOSED_TAG => format!(
                "Unclosed tag '{}': missing '>'",
                excerpt(token.value.trim_end())
            ),
            ERROR_MALFORMED_ENTITY => {
                format!("Malformed entity '{}': missing ';'", token.value)
            }
            _ if token.value == "<" => {
                "Unescaped '<' in text: use '&lt;' instead".to_string()
            }
            _ => format!("Invalid character '{}'", token.value),
        }
    }

    fn record_symbols(&self, tokens: &[Token], symbols: &mut SymbolTable) {
        for token in tokens.iter().filter(|t| is_open_tag(t)) {
            let Some(name) = tag_name(token) else {
                continue;
            };
            if !symbols.contains(name) {
                symbols.insert(
                    Symbol::new(name, SymbolKind::Tag, token.position)
                        .with_type("element")
                        .with_scope("document")
                        .initialized(),
                );
            }
            for (attr, value) in &token.attributes {
                let symbol = Symbol::new(attr.as_str(), SymbolKind::Attribute, token.position)
                    .with_type(classify_attribute(attr, value))
                    .with_scope(name)
                    .with_value(value.as_str())
                    .initialized();
                symbols.insert_qualified(symbol);
            }
        }
    }

    fn refine(&self, _source: &str, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|token| {
                if is_open_tag(&token) || token.kind == CLOSE_TAG {
                    Self::decorate_tag(token)
                } else {
                    token
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> HtmlScanner {
        HtmlScanner::new().unwrap()
    }

    fn kinds(source: &str) -> Vec<&'static str> {
        scanner()
            .tokenize(source)
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn basic_document() {
        assert_eq!(
            kinds("<!DOCTYPE html>\n<html><body><p>Hi &amp; bye</p></body></html>"),
            vec![
                DOCTYPE,
                RESERVED_TAG,
                RESERVED_TAG,
                RESERVED_TAG,
                TEXT,
                ENTITY,
                TEXT,
                CLOSE_TAG,
                CLOSE_TAG,
                CLOSE_TAG,
            ]
        );
    }

    #[test]
    fn void_and_custom_tags() {
        let tokens = scanner().tokenize("<BR/><img src=\"a.png\"><my-widget>").unwrap();
        assert_eq!(tokens[0].kind, VOID_TAG);
        assert_eq!(tag_name(&tokens[0]), Some("br"));
        assert!(is_self_closing(&tokens[0]));
        assert_eq!(tokens[1].kind, VOID_TAG);
        assert_eq!(tokens[1].attribute("src"), Some("a.png"));
        assert_eq!(tokens[2].kind, TAG);
        assert_eq!(tag_name(&tokens[2]), Some("my-widget"));
    }

    #[test]
    fn abbr_is_not_reserved_a() {
        let tokens = scanner().tokenize("<abbr title=\"x\">").unwrap();
        assert_eq!(tokens[0].kind, TAG);
        assert_eq!(tag_name(&tokens[0]), Some("abbr"));
    }

    #[test]
    fn attribute_forms() {
        let tokens = scanner()
            .tokenize("<input type='text' disabled value=42 data-x=\"a b\">")
            .unwrap();
        let tag = &tokens[0];
        assert_eq!(tag.attribute("type"), Some("text"));
        assert_eq!(tag.attribute("disabled"), Some(""));
        assert_eq!(tag.attribute("value"), Some("42"));
        assert_eq!(tag.attribute("data-x"), Some("a b"));
    }

    #[test]
    fn decorated_tag_keeps_its_lexeme() {
        let source = "<Img SRC=\"a.png\" alt=x />";
        let tokens = scanner().tokenize(source).unwrap();
        let tag = &tokens[0];
        assert_eq!(tag.value, source);
        assert_eq!(tag.subkind.as_deref(), Some("img"));
        assert_eq!(tag.attribute("src"), Some("a.png"));
        assert_eq!(tag.attribute("alt"), Some("x"));
        assert!(is_self_closing(tag));
    }

    #[test]
    fn comments_and_cdata() {
        assert_eq!(
            kinds("<!-- note --><![CDATA[x<y]]><?xml version=\"1.0\"?>"),
            vec![COMMENT, CDATA, PROCESSING_INSTRUCTION]
        );
    }

    #[test]
    fn lexical_errors_reported() {
        let output = scanner()
            .analyze_lexical("<p>a &amp b</br> <!-- open")
            .unwrap();
        let messages: Vec<_> = output.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("Malformed entity '&amp'"));
        assert!(messages[1].contains("Void element"));
        assert!(messages[2].contains("Unclosed comment"));
    }

    #[test]
    fn unclosed_tag_and_stray_lt() {
        let output = scanner().analyze_lexical("a < b <div class=\"x\"").unwrap();
        let kinds: Vec<_> = output.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TEXT, INVALID, TEXT, ERROR_UNCLOSED_TAG]);
        assert!(output.diagnostics[0].message.contains("Unescaped '<'"));
        assert!(output.diagnostics[1].message.contains("Unclosed tag"));
    }

    #[test]
    fn symbols_for_tags_and_attributes() {
        let output = scanner()
            .analyze_lexical("<a href=\"https://x.org\" id=\"top\">x</a>")
            .unwrap();
        let tag = output.symbols.get("a").unwrap();
        assert_eq!(tag.kind, SymbolKind::Tag);
        let href = output.symbols.get("a.href").unwrap();
        assert_eq!(href.kind, SymbolKind::Attribute);
        assert_eq!(href.data_type, "url");
        assert_eq!(href.value.as_deref(), Some("https://x.org"));
        assert_eq!(output.symbols.get("a.id").unwrap().data_type, "id");
    }

    #[test]
    fn attribute_classification() {
        assert_eq!(classify_attribute("HREF", "/x"), "url");
        assert_eq!(classify_attribute("width", "100"), "numeric");
        assert_eq!(classify_attribute("width", "wide"), "text");
        assert_eq!(classify_attribute("checked", ""), "boolean");
        assert_eq!(classify_attribute("target", "_blank"), "enumerated");
        assert_eq!(classify_attribute("alt", "logo"), "text");
    }

    #[test]
    fn positions_reset_per_line() {
        let tokens = scanner().tokenize("<p>\n  <b>x</b>\n</p>").unwrap();
        assert_eq!((tokens[1].line(), tokens[1].column()), (2, 3));
        assert_eq!((tokens[4].line(), tokens[4].column()), (3, 1));
    }

    #[test]
    fn attribute_patterns_compile() {
        assert!(ATTRIBUTE.is_some());
        assert!(NUMERIC_VALUE.is_some());
    }
}
