//! Wikitext section parser.
//!
//! Splits a page into [`Section`]s on `==`-style headings. Each section's
//! labels are the heading path from the page title down, so a level-3
//! heading under "History" yields `[title, "History", "Early years"]`.
//! The text before the first heading is the lead and is labeled with the
//! title alone.
//!
//! Sections named in [`SectionOptions::ignore`] (references, external links
//! and the like) are dropped together with all of their subsections.
//! Bodies are cleaned with [`normalize_paragraphs`] and sections shorter
//! than [`SectionOptions::min_section_chars`] after cleaning are skipped.

use crate::models::Section;
use crate::normalize::{normalize, normalize_paragraphs};

/// Service sections that carry no article prose.
pub const DEFAULT_IGNORED_SECTIONS: &[&str] = &[
    "References",
    "See also",
    "External links",
    "Further reading",
    "Sources",
    "Notes",
    "Footnotes",
    "Bibliography",
];

/// Tuning for [`parse_sections`].
#[derive(Debug, Clone)]
pub struct SectionOptions {
    /// Heading names whose sections (and subsections) are dropped.
    /// Compared case-insensitively.
    pub ignore: Vec<String>,
    /// Minimum cleaned body length, in characters.
    pub min_section_chars: usize,
    /// Deepest heading level that opens a new section. Deeper headings
    /// stay inside their parent's body.
    pub max_level: usize,
}

impl Default for SectionOptions {
    fn default() -> Self {
        Self {
            ignore: DEFAULT_IGNORED_SECTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_section_chars: 16,
            max_level: 4,
        }
    }
}

impl SectionOptions {
    fn is_ignored(&self, heading: &str) -> bool {
        self.ignore.iter().any(|i| i.eq_ignore_ascii_case(heading))
    }
}

struct Heading {
    level: usize,
    text: String,
    ignored: bool,
}

/// Split `wikitext` into labeled, cleaned sections.
///
/// # Example
///
/// ```rust
/// use wiki_kb_core::section::{parse_sections, SectionOptions};
///
/// let page = "Lead paragraph about the games.\n== History ==\nThe games began in 1924.\n== References ==\n* a book";
/// let sections = parse_sections("Winter Olympics", page, &SectionOptions::default());
/// assert_eq!(sections.len(), 2);
/// assert_eq!(sections[1].labels, vec!["Winter Olympics", "History"]);
/// ```
pub fn parse_sections(title: &str, wikitext: &str, opts: &SectionOptions) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<Heading> = Vec::new();
    let mut body = String::new();

    for line in wikitext.lines() {
        let Some((level, text)) = heading_level(line) else {
            body.push_str(line);
            body.push('\n');
            continue;
        };
        if level > opts.max_level {
            body.push_str(line);
            body.push('\n');
            continue;
        }

        flush(title, &stack, &body, opts, &mut sections);
        body.clear();

        while stack.last().is_some_and(|h| h.level >= level) {
            stack.pop();
        }
        let parent_ignored = stack.last().is_some_and(|h| h.ignored);
        let text = normalize(text);
        stack.push(Heading {
            level,
            ignored: parent_ignored || opts.is_ignored(&text),
            text,
        });
    }
    flush(title, &stack, &body, opts, &mut sections);

    sections
}

fn flush(
    title: &str,
    stack: &[Heading],
    raw_body: &str,
    opts: &SectionOptions,
    out: &mut Vec<Section>,
) {
    if stack.last().is_some_and(|h| h.ignored) {
        return;
    }
    let body = normalize_paragraphs(raw_body);
    if body.chars().count() < opts.min_section_chars.max(1) {
        return;
    }
    let mut labels = vec![title.to_string()];
    labels.extend(stack.iter().map(|h| h.text.clone()));
    out.push(Section::new(labels, body));
}

/// Parse a heading line like `=== Results ===` into `(3, "Results")`.
///
/// The level is the smaller of the leading and trailing `=` runs, as
/// MediaWiki renders unbalanced headings.
fn heading_level(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim();
    if !trimmed.starts_with("==") || !trimmed.ends_with('=') {
        return None;
    }
    let leading = trimmed.len() - trimmed.trim_start_matches('=').len();
    let trailing = trimmed.len() - trimmed.trim_end_matches('=').len();
    if leading + trailing > trimmed.len() {
        return None;
    }
    let level = leading.min(trailing);
    let inner = trimmed[level..trimmed.len() - level].trim();
    if level < 2 || inner.is_empty() {
        return None;
    }
    Some((level, inner))
}
