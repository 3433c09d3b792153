//! In-memory knowledge base with brute-force cosine ranking.
//!
//! A [`KnowledgeBase`] holds one batch of fragments and their vectors.
//! Vectors are L2-normalized once at [`load`](KnowledgeBase::load) time,
//! so a query costs one normalization plus a dot product per fragment.
//!
//! # Lifecycle
//!
//! construct → `load` → any number of `search` calls → drop. A second
//! `load` replaces the whole batch. The new batch is built before the
//! write lock is taken and swapped in as one `Arc`, so a concurrent
//! `search` sees either the old batch or the new one, never a mix.
//! Searches only hold the read lock long enough to clone the `Arc`.
//!
//! # Example
//!
//! ```rust
//! use wiki_kb_core::index::KnowledgeBase;
//! use wiki_kb_core::models::Fragment;
//!
//! let frag = |text: &str| Fragment { labels: vec![], text: text.into(), position: 0 };
//! let kb = KnowledgeBase::new("demo");
//! kb.load(vec![(frag("x"), vec![1.0, 0.0]), (frag("y"), vec![0.0, 1.0])]).unwrap();
//!
//! let hits = kb.search(&[0.9, 0.1], 1).unwrap();
//! assert_eq!(hits[0].fragment.text, "x");
//! ```

use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::embedding::{dot, l2_norm, l2_normalize, NORM_EPSILON};
use crate::models::{Fragment, SearchHit};

/// Failure at the index load/search boundary.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    /// A vector's length differs from the batch dimension.
    #[error("vector at position {position} has {found} dimensions, expected {expected}")]
    ShapeMismatch {
        expected: usize,
        found: usize,
        position: usize,
    },
    /// `search` was called before any successful `load`.
    #[error("knowledge base '{0}' has not been loaded")]
    NotLoaded(String),
}

/// One committed batch. Fragments and vectors are index-aligned.
#[derive(Debug, Default)]
struct Batch {
    fragments: Vec<Fragment>,
    vectors: Vec<Vec<f32>>,
    dims: usize,
}

/// Named, loadable, searchable set of fragments.
#[derive(Debug)]
pub struct KnowledgeBase {
    name: String,
    batch: RwLock<Option<Arc<Batch>>>,
}

impl KnowledgeBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batch: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the contents with `entries`, normalizing every vector.
    ///
    /// Fails with [`IndexError::ShapeMismatch`] if the vectors do not all
    /// have the same length; the previous batch (if any) stays in place.
    /// An empty batch is valid and makes every search return nothing.
    pub fn load(&self, entries: Vec<(Fragment, Vec<f32>)>) -> Result<(), IndexError> {
        let dims = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((position, (_, v))) = entries
            .iter()
            .enumerate()
            .find(|(_, (_, v))| v.len() != dims)
        {
            return Err(IndexError::ShapeMismatch {
                expected: dims,
                found: v.len(),
                position,
            });
        }

        let mut fragments = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len());
        for (fragment, vector) in entries {
            fragments.push(fragment);
            vectors.push(l2_normalize(&vector));
        }
        let batch = Arc::new(Batch {
            fragments,
            vectors,
            dims,
        });

        let count = batch.fragments.len();
        *self.batch.write().unwrap_or_else(|e| e.into_inner()) = Some(batch);
        tracing::info!(knowledge_base = %self.name, fragments = count, dims, "knowledge base loaded");
        Ok(())
    }

    /// Rank fragments by cosine similarity to `query`.
    ///
    /// Returns at most `top_n` hits in non-increasing score order; equal
    /// scores keep load order. A zero query vector, an empty batch, or
    /// `top_n == 0` yields an empty result.
    pub fn search(&self, query: &[f32], top_n: usize) -> Result<Vec<SearchHit>, IndexError> {
        let batch = self.current()?;
        if batch.fragments.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        if query.len() != batch.dims {
            return Err(IndexError::ShapeMismatch {
                expected: batch.dims,
                found: query.len(),
                position: 0,
            });
        }
        if l2_norm(query) < NORM_EPSILON {
            return Ok(Vec::new());
        }

        let query = l2_normalize(query);
        let mut scored: Vec<(usize, f32)> = batch
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(v, &query)))
            .collect();
        // Stable sort keeps load order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_n.min(batch.fragments.len()));

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                fragment: batch.fragments[i].clone(),
                score,
            })
            .collect())
    }

    /// Whether a batch has been committed.
    pub fn is_loaded(&self) -> bool {
        self.batch
            .read()
            .map(|b| b.is_some())
            .unwrap_or_else(|e| e.into_inner().is_some())
    }

    /// Number of fragments in the committed batch (0 before loading).
    pub fn len(&self) -> usize {
        self.current().map(|b| b.fragments.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension of the committed batch.
    pub fn dims(&self) -> Result<usize, IndexError> {
        Ok(self.current()?.dims)
    }

    /// Snapshot of the committed fragments, in load order.
    pub fn fragments(&self) -> Result<Vec<Fragment>, IndexError> {
        Ok(self.current()?.fragments.clone())
    }

    fn current(&self) -> Result<Arc<Batch>, IndexError> {
        let guard = self.batch.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| IndexError::NotLoaded(self.name.clone()))
    }
}
