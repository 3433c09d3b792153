//! # wiki-kb core
//!
//! Pure, synchronous building blocks for wiki-kb: wikitext normalization,
//! section parsing, budget-balanced chunking, the embedding gateway trait,
//! persisted record decoding, and the in-memory similarity index.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Network-facing
//! collaborators (embedding and chat APIs, wiki fetching, file storage)
//! live in the `wiki-kb` app crate.
//!
//! ## Pipeline
//!
//! ```text
//! wikitext ─▶ section ─▶ normalize ─▶ chunk ─▶ (embed) ─▶ record ─▶ index
//!                                                query ─▶ (embed) ─▶ index.search
//! ```

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod normalize;
pub mod record;
pub mod section;
