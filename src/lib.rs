//! # wiki-kb
//!
//! Turn wiki articles into an embedded knowledge base and answer questions
//! against it.
//!
//! Pages (from a local directory or a MediaWiki category) are split into
//! sections, chunked to a size budget, embedded through an OpenAI-compatible
//! API, and stored as JSON Lines. At query time a knowledge base is loaded
//! into memory, ranked by cosine similarity, and the best fragments are
//! handed to a chat model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//! │   Sources   │──▶│    Pipeline      │──▶│  JSONL   │
//! │ dir / wiki  │   │ section+chunk+emb│   │   file   │
//! └─────────────┘   └──────────────────┘   └────┬─────┘
//!                                               │ load
//!                                               ▼
//!                   ┌──────────┐          ┌───────────┐
//!                   │   CLI    │◀────────▶│ Knowledge │
//!                   │  (wkb)   │  search  │   Base    │
//!                   └──────────┘   / ask  └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wkb chunk ./pages/Curling.wiki          # inspect chunking offline
//! wkb ingest --category "1980 Winter Olympics"
//! wkb topics
//! wkb search "who won the curling final"
//! wkb ask "who won the curling final" --topic olympics
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`openai`] | OpenAI-compatible HTTP client with retry |
//! | [`embedding`] | Embedding gateway implementations |
//! | [`chat`] | Chat completion client |
//! | [`sources`] | Local directory and MediaWiki page sources |
//! | [`store`] | JSON Lines knowledge-base files |
//! | [`ingest`] | Ingestion pipeline |
//! | [`ask`] | Retrieval-augmented answering |
//! | [`search`] | `search` and `ask` commands |
//! | [`inspect`] | `sections` and `chunk` commands |
//! | [`topics`] | `topics` command |
//!
//! Text processing, chunking, and the similarity index live in
//! [`wiki_kb_core`].

pub mod ask;
pub mod chat;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod inspect;
pub mod openai;
pub mod search;
pub mod sources;
pub mod store;
pub mod topics;
