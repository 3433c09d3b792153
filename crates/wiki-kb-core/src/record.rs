//! Persisted fragment rows.
//!
//! A knowledge-base file holds one [`FragmentRecord`] per fragment. Every
//! field is optional on the wire so older or hand-edited files still load;
//! [`FragmentRecord::into_entry`] resolves the defaults in one place and
//! rejects rows that cannot produce a usable fragment.
//!
//! | Field | Default when absent |
//! |-------|---------------------|
//! | `page_title` | `"Untitled"` |
//! | `section` | none (labels are the title alone) |
//! | `labels` | `[page_title]` or `[page_title, section]` |
//! | `chunk_id` | index of the row among the rows decoded before it |
//! | `text` | required |
//! | `embedding` | required, JSON array string |
//! | `hash` | SHA-256 of `text` |

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::embedding::{decode_vector, encode_vector};
use crate::models::Fragment;

/// Title used for rows that carry none.
pub const DEFAULT_PAGE_TITLE: &str = "Untitled";

/// A row that could not be turned into a fragment and vector.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record has no text")]
    MissingText,
    #[error("record has no embedding")]
    MissingEmbedding,
    #[error("malformed embedding: {0}")]
    MalformedEmbedding(#[from] serde_json::Error),
}

/// One persisted fragment with its serialized embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// JSON-array-encoded vector, e.g. `"[0.1,-0.2]"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl FragmentRecord {
    /// Build the persisted form of an embedded fragment.
    pub fn from_fragment(fragment: &Fragment, vector: &[f32]) -> Self {
        Self {
            page_title: fragment.title().map(str::to_string),
            section: (fragment.labels.len() > 1)
                .then(|| fragment.section().map(str::to_string))
                .flatten(),
            labels: Some(fragment.labels.clone()),
            chunk_id: Some(fragment.position),
            text: Some(fragment.text.clone()),
            embedding: Some(encode_vector(vector)),
            hash: Some(content_hash(&fragment.text)),
        }
    }

    /// Heading path with defaults applied.
    pub fn resolved_labels(&self) -> Vec<String> {
        if let Some(labels) = self.labels.as_ref().filter(|l| !l.is_empty()) {
            return labels.clone();
        }
        let title = self
            .page_title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAGE_TITLE.to_string());
        match self.section.as_deref().map(str::trim) {
            Some(section) if !section.is_empty() && section != title => {
                vec![title, section.to_string()]
            }
            _ => vec![title],
        }
    }

    /// Content hash, computed from the text when the row has none.
    pub fn resolved_hash(&self) -> Option<String> {
        self.hash
            .clone()
            .or_else(|| self.text.as_deref().map(content_hash))
    }

    /// Decode the row into a fragment and its raw (unnormalized) vector.
    ///
    /// `fallback_position` is used when the row has no `chunk_id`.
    pub fn into_entry(self, fallback_position: usize) -> Result<(Fragment, Vec<f32>), RecordError> {
        let labels = self.resolved_labels();
        let text = self
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or(RecordError::MissingText)?;
        let raw = self.embedding.ok_or(RecordError::MissingEmbedding)?;
        let vector = decode_vector(&raw)?;

        Ok((
            Fragment {
                labels,
                text,
                position: self.chunk_id.unwrap_or(fallback_position),
            },
            vector,
        ))
    }
}

/// Hex SHA-256 of `text`, used to detect fragments whose embedding can be
/// reused.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment() -> Fragment {
        Fragment {
            labels: vec!["Curling".into(), "Results".into()],
            text: "Curling\n\nResults\n\nSweden won.".into(),
            position: 2,
        }
    }

    #[test]
    fn test_from_fragment_round_trip() {
        let record = FragmentRecord::from_fragment(&fragment(), &[0.25, -1.5]);
        assert_eq!(record.page_title.as_deref(), Some("Curling"));
        assert_eq!(record.section.as_deref(), Some("Results"));
        assert_eq!(record.embedding.as_deref(), Some("[0.25,-1.5]"));

        let line = serde_json::to_string(&record).unwrap();
        let parsed: FragmentRecord = serde_json::from_str(&line).unwrap();
        let (frag, vector) = parsed.into_entry(0).unwrap();
        assert_eq!(frag, fragment());
        assert_eq!(vector, vec![0.25, -1.5]);
    }

    #[test]
    fn test_lead_fragment_has_no_section() {
        let lead = Fragment {
            labels: vec!["Curling".into()],
            text: "Curling\n\nLead.".into(),
            position: 0,
        };
        let record = FragmentRecord::from_fragment(&lead, &[1.0]);
        assert_eq!(record.section, None);
    }

    #[test]
    fn test_defaults_for_sparse_row() {
        let parsed: FragmentRecord =
            serde_json::from_str(r#"{"text":"body","embedding":"[1.0]"}"#).unwrap();
        assert_eq!(parsed.resolved_hash(), Some(content_hash("body")));
        let (frag, vector) = parsed.into_entry(7).unwrap();
        assert_eq!(frag.labels, vec![DEFAULT_PAGE_TITLE.to_string()]);
        assert_eq!(frag.position, 7);
        assert_eq!(vector, vec![1.0]);
    }

    #[test]
    fn test_title_and_section_labels() {
        let record = FragmentRecord {
            page_title: Some("Oslo".into()),
            section: Some("Climate".into()),
            ..FragmentRecord::default()
        };
        assert_eq!(record.resolved_labels(), vec!["Oslo", "Climate"]);

        let same = FragmentRecord {
            page_title: Some("Oslo".into()),
            section: Some("Oslo".into()),
            ..FragmentRecord::default()
        };
        assert_eq!(same.resolved_labels(), vec!["Oslo"]);
    }

    #[test]
    fn test_missing_text_and_embedding() {
        let no_text = FragmentRecord {
            embedding: Some("[1.0]".into()),
            ..FragmentRecord::default()
        };
        assert!(matches!(no_text.into_entry(0), Err(RecordError::MissingText)));

        let no_vec = FragmentRecord {
            text: Some("t".into()),
            ..FragmentRecord::default()
        };
        assert!(matches!(no_vec.into_entry(0), Err(RecordError::MissingEmbedding)));
    }

    #[test]
    fn test_malformed_embedding() {
        let bad = FragmentRecord {
            text: Some("t".into()),
            embedding: Some("[0.1, 0.2".into()),
            ..FragmentRecord::default()
        };
        assert!(matches!(
            bad.into_entry(0),
            Err(RecordError::MalformedEmbedding(_))
        ));
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
