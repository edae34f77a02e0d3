use std::collections::BTreeMap;
use std::sync::LazyLock;

use polylex_common::{DiagnosticBag, ErrorKind, Symbol, SymbolKind, SymbolTable, Token};
use regex::Regex;

use super::{SemanticAnalyzer, SemanticOutput};
use crate::lexer::html::{classify_attribute, is_open_tag, tag_name};

/// Attributes allowed on every element.
const GLOBAL_ATTRIBUTES: &[&str] = &[
    "id", "class", "style", "title", "lang", "dir", "hidden", "tabindex", "role",
    "accesskey", "contenteditable", "draggable", "spellcheck", "translate",
];

/// Element-specific attributes. Elements missing from this table are not
/// whitelist-checked.
const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("html", &["xmlns", "manifest"]),
    ("head", &[]),
    ("body", &[]),
    ("title", &[]),
    ("base", &["href", "target"]),
    ("meta", &["charset", "name", "content", "http-equiv", "property"]),
    (
        "link",
        &["rel", "href", "type", "media", "sizes", "crossorigin", "integrity", "as", "hreflang", "referrerpolicy"],
    ),
    ("style", &["media", "type"]),
    (
        "script",
        &["src", "type", "async", "defer", "crossorigin", "integrity", "nomodule", "referrerpolicy"],
    ),
    (
        "a",
        &["href", "target", "rel", "download", "hreflang", "type", "referrerpolicy", "ping", "name"],
    ),
    (
        "img",
        &["src", "alt", "width", "height", "srcset", "sizes", "loading", "decoding", "crossorigin", "usemap", "ismap", "referrerpolicy"],
    ),
    ("area", &["alt", "coords", "shape", "href", "target", "rel", "download"]),
    (
        "iframe",
        &["src", "srcdoc", "name", "width", "height", "allow", "allowfullscreen", "loading", "sandbox", "referrerpolicy"],
    ),
    (
        "form",
        &["action", "method", "enctype", "target", "name", "autocomplete", "novalidate", "accept-charset", "rel"],
    ),
    (
        "input",
        &[
            "type", "name", "value", "placeholder", "required", "disabled", "checked", "readonly",
            "maxlength", "minlength", "min", "max", "step", "pattern", "size", "autocomplete",
            "autofocus", "multiple", "accept", "form", "list", "src", "alt", "width", "height",
            "formaction",
        ],
    ),
    ("button", &["type", "name", "value", "disabled", "form", "formaction", "autofocus"]),
    ("label", &["for", "form"]),
    ("select", &["name", "multiple", "size", "required", "disabled", "autofocus", "form"]),
    ("option", &["value", "selected", "disabled", "label"]),
    (
        "textarea",
        &["name", "rows", "cols", "placeholder", "required", "disabled", "readonly", "maxlength", "minlength", "wrap", "autofocus", "form"],
    ),
    ("table", &["border"]),
    ("td", &["colspan", "rowspan", "headers"]),
    ("th", &["colspan", "rowspan", "headers", "scope", "abbr"]),
    ("ol", &["reversed", "start", "type"]),
    ("li", &["value"]),
    ("blockquote", &["cite"]),
    ("canvas", &["width", "height"]),
    (
        "video",
        &["src", "controls", "autoplay", "loop", "muted", "poster", "preload", "width", "height", "playsinline", "crossorigin"],
    ),
    ("audio", &["src", "controls", "autoplay", "loop", "muted", "preload", "crossorigin"]),
    ("source", &["src", "type", "srcset", "sizes", "media"]),
    ("div", &[]),
    ("span", &[]),
    ("p", &[]),
    ("h1", &[]),
    ("h2", &[]),
    ("h3", &[]),
    ("h4", &[]),
    ("h5", &[]),
    ("h6", &[]),
    ("ul", &[]),
    ("section", &[]),
    ("article", &[]),
    ("nav", &[]),
    ("header", &[]),
    ("footer", &[]),
    ("main", &[]),
    ("aside", &[]),
    ("strong", &[]),
    ("em", &[]),
    ("pre", &[]),
    ("code", &[]),
];

const REQUIRED_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("img", &["src", "alt"]),
    ("a", &["href"]),
    ("link", &["rel", "href"]),
    ("form", &["action"]),
    ("iframe", &["src"]),
    ("area", &["alt"]),
];

const TARGET_KEYWORDS: &[&str] = &["_blank", "_self", "_parent", "_top"];

const LINK_TYPES: &[&str] = &[
    "alternate", "author", "bookmark", "canonical", "dns-prefetch", "external", "help", "icon",
    "license", "manifest", "me", "modulepreload", "next", "nofollow", "noopener", "noreferrer",
    "opener", "pingback", "preconnect", "prefetch", "preload", "prev", "search", "shortcut",
    "stylesheet", "tag", "apple-touch-icon",
];

const INPUT_TYPES: &[&str] = &[
    "text", "password", "email", "number", "tel", "url", "search", "date", "time",
    "datetime-local", "month", "week", "color", "range", "checkbox", "radio", "file", "submit",
    "reset", "button", "hidden", "image",
];

static ABSOLUTE_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:https?|ftp):)?//[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)*(?::\d+)?(?:[/?#]\S*)?$",
    )
    .ok()
});

static EMAIL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").ok()
});

static ID_FORMAT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][\w\-:.]*$").ok());

fn pattern_matches(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().map_or(true, |re| re.is_match(value))
}

fn allowed_attributes(tag: &str) -> Option<&'static [&'static str]> {
    TAG_ATTRIBUTES
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, attrs)| *attrs)
}

fn is_global_attribute(name: &str) -> bool {
    GLOBAL_ATTRIBUTES.contains(&name)
        || name.starts_with("data-")
        || name.starts_with("aria-")
        || name.starts_with("on")
}

pub fn url_is_valid(value: &str) -> bool {
    let value = value.trim();
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"'))
    {
        return false;
    }
    let lower = value.to_ascii_lowercase();
    let absolute = ["http://", "https://", "ftp://", "//"]
        .iter()
        .any(|scheme| lower.starts_with(scheme));
    !absolute || pattern_matches(&ABSOLUTE_URL, value)
}

pub fn email_is_valid(value: &str) -> bool {
    pattern_matches(&EMAIL, value.trim())
}

pub fn id_is_valid(value: &str) -> bool {
    pattern_matches(&ID_FORMAT, value)
}

/// Document-level and attribute-level checks for HTML.
#[derive(Debug, Default)]
pub struct HtmlSemantics;

impl HtmlSemantics {
    pub fn new() -> Self {
        Self
    }
}

impl SemanticAnalyzer for HtmlSemantics {
    fn analyze(&self, tokens: &[Token], symbols: SymbolTable) -> SemanticOutput {
        let elements: Vec<(&str, &Token)> = tokens
            .iter()
            .filter(|t| is_open_tag(t))
            .filter_map(|t| tag_name(t).map(|name| (name, t)))
            .collect();

        let mut checker = Checker {
            symbols,
            diagnostics: DiagnosticBag::new(ErrorKind::Semantic),
            ids: BTreeMap::new(),
        };
        checker.check_title(&elements);
        checker.check_document_metadata(&elements);
        for &(name, token) in &elements {
            checker.check_attributes(name, token);
        }
        checker.check_fragment_links(&elements);
        checker.check_headings(&elements);

        SemanticOutput {
            symbols: checker.symbols,
            diagnostics: checker.diagnostics.into_diagnostics(),
        }
    }
}

struct Checker {
    symbols: SymbolTable,
    diagnostics: DiagnosticBag,
    /// Declared ids and the element that declared each first.
    ids: BTreeMap<String, Token>,
}

impl Checker {
    fn check_title(&mut self, elements: &[(&str, &Token)]) {
        let titles: Vec<&Token> = elements
            .iter()
            .filter(|(name, _)| *name == "title")
            .map(|(_, t)| *t)
            .collect();
        match titles.as_slice() {
            [] => self
                .diagnostics
                .document_error("Missing <title> element: every document needs a title"),
            [_] => {}
            [_, extra @ ..] => {
                for token in extra {
                    self.diagnostics.error("Duplicate <title> element", token);
                }
            }
        }
    }

    fn check_document_metadata(&mut self, elements: &[(&str, &Token)]) {
        let Some(&(_, html)) = elements.iter().find(|(name, _)| *name == "html") else {
            return;
        };
        if html.attribute("lang").map_or(true, |v| v.trim().is_empty()) {
            self.diagnostics
                .warning("<html> element should declare a 'lang' attribute", html);
        }

        let declares_charset = elements.iter().any(|(name, t)| {
            *name == "meta"
                && (t.attribute("charset").is_some()
                    || t
                        .attribute("content")
                        .is_some_and(|c| c.to_ascii_lowercase().contains("charset=")))
        });
        if !declares_charset {
            self.diagnostics.document_warning(
                "Missing character set declaration: add <meta charset=\"utf-8\">",
            );
        }
    }

    fn check_attributes(&mut self, tag: &str, token: &Token) {
        if let Some(allowed) = allowed_attributes(tag) {
            for name in token.attributes.keys() {
                if !is_global_attribute(name) && !allowed.contains(&name.as_str()) {
                    self.diagnostics.warning(
                        format!("Attribute '{}' is not allowed on <{}>", name, tag),
                        token,
                    );
                }
            }
        }

        if let Some((_, required)) = REQUIRED_ATTRIBUTES.iter().find(|(name, _)| *name == tag) {
            for attr in required.iter().filter(|a| token.attribute(a).is_none()) {
                self.diagnostics.error(
                    format!("Missing required attribute '{}' on <{}>", attr, tag),
                    token,
                );
            }
        }

        for (name, value) in &token.attributes {
            match classify_attribute(name, value) {
                "url" => self.check_url(name, value, token),
                "id" if name == "id" => self.declare_id(tag, value, token),
                "id" => {
                    if !id_is_valid(value) {
                        self.diagnostics.error(
                            format!("Invalid id reference '{}' in '{}' attribute", value, name),
                            token,
                        );
                    }
                }
                _ => {}
            }
        }

        self.check_enumerated(tag, token);
    }

    fn check_url(&mut self, name: &str, value: &str, token: &Token) {
        if value.trim().is_empty() && name != "href" && name != "action" {
            self.diagnostics
                .warning(format!("Empty URL in '{}' attribute", name), token);
            return;
        }
        if let Some(rest) = value.trim().strip_prefix("mailto:") {
            let addresses = rest.split('?').next().unwrap_or_default();
            for address in addresses.split(',') {
                if !email_is_valid(address) {
                    self.diagnostics.error(
                        format!("Invalid e-mail address '{}' in '{}'", address.trim(), name),
                        token,
                    );
                }
            }
            return;
        }
        if !url_is_valid(value) {
            self.diagnostics.error(
                format!("Invalid URL '{}' in '{}' attribute", value, name),
                token,
            );
        }
    }

    fn declare_id(&mut self, tag: &str, value: &str, token: &Token) {
        if !id_is_valid(value) {
            self.diagnostics.error(
                format!(
                    "Invalid id '{}': ids must start with a letter and contain no spaces",
                    value
                ),
                token,
            );
        }
        if let Some(first) = self.ids.get(value) {
            self.diagnostics.error(
                format!(
                    "Duplicate id '{}' (first declared at line {}, column {})",
                    value,
                    first.line(),
                    first.column()
                ),
                token,
            );
            return;
        }
        self.ids.insert(value.to_string(), token.clone());
        self.symbols.insert_with_key(
            format!("#{}", value),
            Symbol::new(value, SymbolKind::Attribute, token.position)
                .with_type("id")
                .with_scope(tag)
                .with_value(tag)
                .initialized(),
        );
    }

    fn check_enumerated(&mut self, tag: &str, token: &Token) {
        if let Some(target) = token.attribute("target") {
            if target.starts_with('_') && !TARGET_KEYWORDS.contains(&target.to_ascii_lowercase().as_str()) {
                self.diagnostics.error(
                    format!(
                        "Invalid target '{}': expected _blank, _self, _parent, _top or a frame name",
                        target
                    ),
                    token,
                );
            }
        }
        if let Some(rel) = token.attribute("rel") {
            for kind in rel.split_whitespace() {
                if !LINK_TYPES.contains(&kind.to_ascii_lowercase().as_str()) {
                    self.diagnostics
                        .error(format!("Unknown link type '{}' in 'rel'", kind), token);
                }
            }
        }
        if tag == "input" {
            if let Some(kind) = token.attribute("type") {
                if !INPUT_TYPES.contains(&kind.to_ascii_lowercase().as_str()) {
                    self.diagnostics
                        .error(format!("Invalid input type '{}'", kind), token);
                } else if kind.eq_ignore_ascii_case("email") {
                    if let Some(value) = token.attribute("value").filter(|v| !v.is_empty()) {
                        if !email_is_valid(value) {
                            self.diagnostics.error(
                                format!("Invalid e-mail address '{}' in 'value'", value),
                                token,
                            );
                        }
                    }
                }
            }
        }
    }

    fn check_fragment_links(&mut self, elements: &[(&str, &Token)]) {
        for &(_, token) in elements {
            let Some(fragment) = token.attribute("href").and_then(|h| h.strip_prefix('#')) else {
                continue;
            };
            if !fragment.is_empty() && !self.ids.contains_key(fragment) {
                self.diagnostics.error(
                    format!(
                        "Broken fragment link '#{}': no element has id '{}'",
                        fragment, fragment
                    ),
                    token,
                );
            }
        }
    }

    /// Heading levels are compared in document order, ignoring nesting.
    fn check_headings(&mut self, elements: &[(&str, &Token)]) {
        let mut previous: Option<u8> = None;
        for &(name, token) in elements {
            let level = match name.as_bytes() {
                [b'h', digit @ b'1'..=b'6'] => digit - b'0',
                _ => continue,
            };
            match previous {
                None if level != 1 => self.diagnostics.warning(
                    format!("First heading is <h{}>; documents should start with <h1>", level),
                    token,
                ),
                Some(prev) if level > prev + 1 => self.diagnostics.warning(
                    format!("Heading level jumps from <h{}> to <h{}>", prev, level),
                    token,
                ),
                _ => {}
            }
            previous = Some(level);
        }
    }
}
