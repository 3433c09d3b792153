//! Core data models shared by the chunker, the index, and the app crate.
//!
//! These types represent the sections, fragments, and search hits that
//! flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Separator placed between heading labels and between the labels and the
/// body when a fragment's text is assembled.
pub const LABEL_SEPARATOR: &str = "\n\n";

/// A labeled slice of a document.
///
/// `labels` is the heading path from the document title down to this
/// section, e.g. `["Article Title", "Background"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub labels: Vec<String>,
    pub body: String,
}

impl Section {
    pub fn new(labels: Vec<String>, body: impl Into<String>) -> Self {
        Self {
            labels,
            body: body.into(),
        }
    }

    /// The heading labels joined with [`LABEL_SEPARATOR`].
    pub fn header(&self) -> String {
        self.labels.join(LABEL_SEPARATOR)
    }

    /// Labels followed by the body, the string the chunker measures.
    ///
    /// An empty body yields the header alone.
    pub fn candidate(&self) -> String {
        compose(&self.labels, &self.body)
    }
}

/// Join labels and a body the same way for every fragment.
pub(crate) fn compose(labels: &[String], body: &str) -> String {
    let header = labels.join(LABEL_SEPARATOR);
    if body.is_empty() {
        header
    } else if header.is_empty() {
        body.to_string()
    } else {
        format!("{header}{LABEL_SEPARATOR}{body}")
    }
}

/// The unit of retrieval: a bounded piece of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Heading path of the originating section.
    pub labels: Vec<String>,
    /// Full fragment text, starting with the labels.
    pub text: String,
    /// Zero-based position within the originating section.
    pub position: usize,
}

impl Fragment {
    /// Document title (first label), if any.
    pub fn title(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    /// Innermost heading (last label), if any.
    pub fn section(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }

    /// The fragment text with the label header stripped.
    ///
    /// Returns an empty string for a fragment that carries only its labels.
    pub fn body(&self) -> &str {
        let header = self.labels.join(LABEL_SEPARATOR);
        match self.text.strip_prefix(header.as_str()) {
            Some(rest) => rest.strip_prefix(LABEL_SEPARATOR).unwrap_or(rest),
            None => &self.text,
        }
    }

    /// True when the fragment holds no body text beyond its labels.
    pub fn is_blank(&self) -> bool {
        self.body().trim().is_empty()
    }
}

/// One ranked result from [`KnowledgeBase::search`](crate::index::KnowledgeBase::search).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub fragment: Fragment,
    /// Cosine similarity to the query, nominally in `[-1.0, 1.0]`.
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(l: &[&str]) -> Vec<String> {
        l.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_candidate_joins_labels_and_body() {
        let s = Section::new(labels(&["Title", "History"]), "Body text.");
        assert_eq!(s.candidate(), "Title\n\nHistory\n\nBody text.");
    }

    #[test]
    fn test_candidate_empty_body_is_header() {
        let s = Section::new(labels(&["Title"]), "");
        assert_eq!(s.candidate(), "Title");
    }

    #[test]
    fn test_fragment_body_strips_header() {
        let f = Fragment {
            labels: labels(&["Title", "History"]),
            text: "Title\n\nHistory\n\nSome body".to_string(),
            position: 0,
        };
        assert_eq!(f.body(), "Some body");
        assert_eq!(f.title(), Some("Title"));
        assert_eq!(f.section(), Some("History"));
        assert!(!f.is_blank());
    }

    #[test]
    fn test_fragment_labels_only_is_blank() {
        let f = Fragment {
            labels: labels(&["Title"]),
            text: "Title".to_string(),
            position: 0,
        };
        assert!(f.is_blank());
    }
}
