//! Budget-balanced recursive section splitter.
//!
//! Splits a [`Section`] into fragments whose measured size stays within a
//! caller-supplied budget. Every fragment starts with the section's labels
//! so it remains self-describing when retrieved on its own.
//!
//! # Algorithm
//!
//! The *candidate* is the labels and body joined with `\n\n`.
//!
//! 1. If the candidate fits the budget, it is the only fragment.
//! 2. If the recursion budget is spent, the candidate is hard-truncated to
//!    the largest prefix that fits, minus trailing whitespace. The remainder
//!    is dropped.
//! 3. Otherwise the body (never the labels) is bisected on the first of
//!    `\n\n`, `\n`, `". "` that yields two non-blank halves. A single
//!    occurrence is cut directly; otherwise the cut is the delimiter position
//!    whose left side measures closest to half of the body. Each half is
//!    split recursively with one less level of budget.
//! 4. If no delimiter works, fall back to truncation.
//!
//! Cutting at the balance point rather than filling the left half to the
//! budget keeps the recursion shallow and avoids near-empty tail fragments.
//!
//! # Example
//!
//! ```rust
//! use wiki_kb_core::chunk::{split, WordCount, DEFAULT_MAX_RECURSION};
//! use wiki_kb_core::models::Section;
//!
//! let section = Section::new(
//!     vec!["Oslo".into(), "Climate".into()],
//!     "Winters are cold.\n\nSummers are mild.",
//! );
//! let pieces = split(&section, 6, &WordCount, DEFAULT_MAX_RECURSION);
//! assert_eq!(pieces, vec![
//!     "Oslo\n\nClimate\n\nWinters are cold.",
//!     "Oslo\n\nClimate\n\nSummers are mild.",
//! ]);
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Fragment, Section};

/// Recursion ceiling used when callers have no preference.
pub const DEFAULT_MAX_RECURSION: usize = 5;

/// Bisection delimiters, most structural first.
pub const DELIMITERS: [&str; 3] = ["\n\n", "\n", ". "];

/// Approximate characters-per-token ratio used by [`ApproxTokens`].
const CHARS_PER_TOKEN: usize = 4;

/// Measures a candidate string in the unit the chunk budget is given in.
///
/// Implemented for any `Fn(&str) -> usize`, so a closure works as well as
/// the provided measures. The truncation fallback assumes the measure does
/// not shrink as a prefix grows.
pub trait SizeFn {
    fn size(&self, text: &str) -> usize;
}

impl<F> SizeFn for F
where
    F: Fn(&str) -> usize,
{
    fn size(&self, text: &str) -> usize {
        self(text)
    }
}

/// Unicode scalar count.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCount;

impl SizeFn for CharCount {
    fn size(&self, text: &str) -> usize {
        text.chars().count()
    }
}

/// Whitespace-separated word count.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

impl SizeFn for WordCount {
    fn size(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Token estimate of one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokens;

impl SizeFn for ApproxTokens {
    fn size(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

/// BPE token count using the tokenizer of an OpenAI model.
#[cfg(feature = "tiktoken")]
pub struct TiktokenCount {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl TiktokenCount {
    /// Load the tokenizer for `model`, falling back to `cl100k_base` for
    /// models tiktoken does not know.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .or_else(|_| tiktoken_rs::cl100k_base())
            .map_err(|e| TokenizerError {
                model: model.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { bpe })
    }
}

#[cfg(feature = "tiktoken")]
impl SizeFn for TiktokenCount {
    fn size(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// The tokenizer for a size unit could not be constructed.
#[derive(Debug, Error)]
#[error("no tokenizer available for model '{model}': {reason}")]
pub struct TokenizerError {
    pub model: String,
    pub reason: String,
}

/// Configurable unit for chunk budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeUnit {
    Chars,
    Words,
    #[default]
    ApproxTokens,
    Tiktoken,
}

impl SizeUnit {
    /// Build the measure for this unit. `model` selects the tokenizer for
    /// [`SizeUnit::Tiktoken`] and is ignored otherwise.
    pub fn measure(&self, model: &str) -> Result<Box<dyn SizeFn + Send + Sync>, TokenizerError> {
        match self {
            SizeUnit::Chars => Ok(Box::new(CharCount)),
            SizeUnit::Words => Ok(Box::new(WordCount)),
            SizeUnit::ApproxTokens => Ok(Box::new(ApproxTokens)),
            #[cfg(feature = "tiktoken")]
            SizeUnit::Tiktoken => Ok(Box::new(TiktokenCount::for_model(model)?)),
            #[cfg(not(feature = "tiktoken"))]
            SizeUnit::Tiktoken => Err(TokenizerError {
                model: model.to_string(),
                reason: "built without the `tiktoken` feature".to_string(),
            }),
        }
    }
}

/// Split `section` into fragment texts of at most `max_size` units.
///
/// Never fails. Recursion depth is bounded by `max_recursion`, so at most
/// `2^max_recursion` fragments are produced.
pub fn split<S>(section: &Section, max_size: usize, size_fn: &S, max_recursion: usize) -> Vec<String>
where
    S: SizeFn + ?Sized,
{
    let candidate = section.candidate();
    if size_fn.size(&candidate) <= max_size {
        return vec![candidate];
    }
    if max_recursion == 0 {
        return vec![truncate_to_budget(section, &candidate, max_size, size_fn)];
    }

    for delimiter in DELIMITERS {
        let Some((left, right)) = halve_by_delimiter(&section.body, delimiter, size_fn) else {
            continue;
        };
        let mut pieces = Vec::new();
        for half in [left, right] {
            let half = Section {
                labels: section.labels.clone(),
                body: half,
            };
            pieces.extend(split(&half, max_size, size_fn, max_recursion - 1));
        }
        return pieces;
    }

    vec![truncate_to_budget(section, &candidate, max_size, size_fn)]
}

/// Split `section` and wrap the pieces as [`Fragment`]s numbered from 0.
pub fn chunk_section<S>(
    section: &Section,
    max_size: usize,
    size_fn: &S,
    max_recursion: usize,
) -> Vec<Fragment>
where
    S: SizeFn + ?Sized,
{
    split(section, max_size, size_fn, max_recursion)
        .into_iter()
        .enumerate()
        .map(|(position, text)| Fragment {
            labels: section.labels.clone(),
            text,
            position,
        })
        .collect()
}

/// Cut `body` on `delimiter` at the piece boundary whose left side is
/// closest to half of the body's size.
///
/// A body with exactly one delimiter is cut there. Otherwise prefixes are
/// walked left to right and the walk stops at the first one that does not
/// improve on the best distance so far, starting from the empty prefix.
/// Returns `None` when either half would be blank.
pub fn halve_by_delimiter<S>(body: &str, delimiter: &str, size_fn: &S) -> Option<(String, String)>
where
    S: SizeFn + ?Sized,
{
    let pieces: Vec<&str> = body.split(delimiter).collect();
    if pieces.len() < 2 {
        return None;
    }
    if pieces.len() == 2 {
        return non_blank_halves(pieces[0].to_string(), pieces[1].to_string());
    }

    let half = size_fn.size(body) / 2;
    let mut best_diff = half;
    let mut best = 0;
    for k in 1..pieces.len() {
        let left = pieces[..k].join(delimiter);
        let diff = half.abs_diff(size_fn.size(&left));
        if diff >= best_diff {
            break;
        }
        best_diff = diff;
        best = k;
    }
    if best == 0 {
        return None;
    }

    non_blank_halves(
        pieces[..best].join(delimiter),
        pieces[best..].join(delimiter),
    )
}

fn non_blank_halves(left: String, right: String) -> Option<(String, String)> {
    if left.trim().is_empty() || right.trim().is_empty() {
        return None;
    }
    Some((left, right))
}

fn truncate_to_budget<S>(section: &Section, candidate: &str, max_size: usize, size_fn: &S) -> String
where
    S: SizeFn + ?Sized,
{
    let kept = largest_fitting_prefix(candidate, max_size, size_fn).trim_end();
    tracing::warn!(
        labels = ?section.labels,
        kept_chars = kept.chars().count(),
        dropped_chars = candidate[kept.len()..].chars().count(),
        "section truncated to fit chunk budget"
    );
    kept.to_string()
}

/// Largest char-boundary prefix of `text` measuring at most `max_size`.
pub fn largest_fitting_prefix<'a, S>(text: &'a str, max_size: usize, size_fn: &S) -> &'a str
where
    S: SizeFn + ?Sized,
{
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let fits = |chars: usize| size_fn.size(&text[..bounds[chars]]) <= max_size;

    let total = bounds.len() - 1;
    if fits(total) {
        return text;
    }
    if !fits(0) {
        return "";
    }

    // Invariant: `lo` chars fit, `hi` chars do not.
    let (mut lo, mut hi) = (0, total);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    &text[..bounds[lo]]
}
