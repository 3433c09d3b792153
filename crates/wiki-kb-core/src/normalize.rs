//! Wiki markup stripping and whitespace cleanup.
//!
//! [`normalize`] turns raw wikitext (or any text) into a single line of
//! prose: citations, templates, file and category links, URLs, HTML tags,
//! and emphasis quotes are dropped, internal links collapse to their label,
//! and whitespace runs collapse to one space.
//!
//! [`normalize_paragraphs`] performs the same cleanup but keeps line and
//! paragraph breaks, so the chunker still has structural delimiters to cut
//! on.
//!
//! Both functions are total and idempotent. The cleaning pass is applied
//! until the text stops changing, so markup that only appears after an
//! outer layer is removed (e.g. `[[[[x]]]]`) is handled in the same call.
//!
//! # Example
//!
//! ```rust
//! use wiki_kb_core::normalize::normalize;
//!
//! let raw = "'''Oslo''' is the capital{{efn|since 1814}} of [[Norway|Norway]].<ref>Atlas</ref>";
//! assert_eq!(normalize(raw), "Oslo is the capital of Norway.");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static REF_SELF_CLOSING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<ref\b[^>]*/\s*>").unwrap());
static REF_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<ref\b[^>]*>.*?</ref\s*>").unwrap());
static EXTERNAL_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?:https?:)?//[^\s\]]+(?:[ \t]+([^\]\n]*))?\]").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static INTERNAL_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]|]*)(?:\|([^\[\]]*))?\]\]").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").unwrap());
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"'{2,}").unwrap());
static HEADING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*=+[ \t]*(.*?)[ \t]*=+[ \t]*$").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());

/// Link namespaces whose `[[…]]` spans are removed rather than unwrapped.
const DROPPED_NAMESPACES: &[&str] = &["file:", "image:", "category:"];

/// Clean `raw` into single-spaced prose.
pub fn normalize(raw: &str) -> String {
    fixpoint(raw, |text| {
        let cleaned = strip_markup(text);
        WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
    })
}

/// Clean `raw` like [`normalize`] but keep `\n` line breaks and `\n\n`
/// paragraph breaks.
///
/// Spaces and tabs collapse within each line, lines are trimmed, and any
/// run of blank lines becomes a single paragraph break.
pub fn normalize_paragraphs(raw: &str) -> String {
    fixpoint(raw, |text| {
        let cleaned = strip_markup(text);
        layout_paragraphs(&cleaned)
    })
}

fn fixpoint(raw: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = pass(raw);
    loop {
        let next = pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// One cleaning pass, leaving whitespace layout to the caller.
fn strip_markup(text: &str) -> String {
    let text = COMMENT.replace_all(text, " ");
    let text = REF_SELF_CLOSING.replace_all(&text, " ");
    let text = REF_BLOCK.replace_all(&text, " ");
    let text = remove_balanced(&text, "{{", "}}", |_| true);
    let text = remove_balanced(&text, "[[", "]]", |inner| {
        let inner = inner.trim_start().trim_start_matches(':').to_lowercase();
        DROPPED_NAMESPACES.iter().any(|ns| inner.starts_with(ns))
    });
    let text = EXTERNAL_LINK.replace_all(&text, |caps: &regex::Captures| {
        caps.get(1)
            .map(|label| format!(" {} ", label.as_str()))
            .unwrap_or_else(|| " ".to_string())
    });
    let text = URL.replace_all(&text, " ");
    let text = INTERNAL_LINK.replace_all(&text, |caps: &regex::Captures| {
        caps.get(2)
            .or_else(|| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    });
    let text = HTML_TAG.replace_all(&text, " ");
    let text = EMPHASIS.replace_all(&text, "");
    HEADING_LINE.replace_all(&text, "$1").into_owned()
}

fn layout_paragraphs(text: &str) -> String {
    let mut paragraphs: Vec<Vec<String>> = vec![Vec::new()];
    for line in text.lines() {
        let line = INLINE_SPACE.replace_all(line, " ");
        let line = line.trim();
        if line.is_empty() {
            if paragraphs.last().is_some_and(|p| !p.is_empty()) {
                paragraphs.push(Vec::new());
            }
        } else if let Some(current) = paragraphs.last_mut() {
            current.push(line.to_string());
        }
    }
    paragraphs
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Replace every outermost balanced `open … close` span for which `drop`
/// returns true with a single space. Unbalanced openers are left alone.
fn remove_balanced(text: &str, open: &str, close: &str, drop: impl Fn(&str) -> bool) -> String {
    let spans = balanced_spans(text, open, close);
    if spans.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in spans {
        let inner = &text[start + open.len()..end - close.len()];
        if !drop(inner) {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push(' ');
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Byte ranges of the outermost balanced spans. `open` and `close` must be
/// ASCII so every returned index is a char boundary.
fn balanced_spans(text: &str, open: &str, close: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i..].starts_with(open.as_bytes()) {
            if depth == 0 {
                start = i;
            }
            depth += 1;
            i += open.len();
        } else if depth > 0 && bytes[i..].starts_with(close.as_bytes()) {
            depth -= 1;
            i += close.len();
            if depth == 0 {
                spans.push((start, i));
            }
        } else {
            i += 1;
        }
    }

    spans
}
