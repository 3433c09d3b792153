//! Configuration parsing and validation.
//!
//! wiki-kb is configured by a TOML file (default `./config/wkb.toml`).
//! Every section has defaults except `[chunking]`, so a minimal file is:
//!
//! ```toml
//! [chunking]
//! max_tokens = 250
//!
//! [knowledge_bases.olympics]
//! path = "./data/olympics.jsonl"
//! ```
//!
//! [`load_config`] reads, parses, and validates the file. Topic names are
//! case-insensitive and stored lowercase.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use wiki_kb_core::chunk::{SizeUnit, DEFAULT_MAX_RECURSION};
use wiki_kb_core::section::{SectionOptions, DEFAULT_IGNORED_SECTIONS};

/// Prompt used when `[chat] system_prompt` is not set.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers only with \
the provided context from wiki articles. If the context does not contain the answer, say \
you don't know.";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub knowledge_bases: BTreeMap<String, KnowledgeBaseConfig>,
    #[serde(default)]
    pub default_topic: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    #[serde(default = "default_max_recursion")]
    pub max_recursion: usize,
    #[serde(default)]
    pub size_unit: SizeUnit,
    /// Model whose BPE is used when `size_unit = "tiktoken"`.
    #[serde(default = "default_tokenizer_model")]
    pub tokenizer_model: String,
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,
    /// Fragments longer than this (in chars) are not embedded.
    #[serde(default)]
    pub max_embedding_chars: Option<usize>,
}

fn default_max_recursion() -> usize {
    DEFAULT_MAX_RECURSION
}
fn default_tokenizer_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_min_section_chars() -> usize {
    16
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    8
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Defaults to `[embedding] base_url`.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            base_url: None,
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_ignore_sections")]
    pub ignore_sections: Vec<String>,
    /// Local directory of `.wiki` / `.txt` pages, used when `--dir` is not given.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// MediaWiki category, used when `--category` is not given.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_wiki_site")]
    pub wiki_site: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_pause_ms")]
    pub request_pause_ms: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            ignore_sections: default_ignore_sections(),
            dir: None,
            include_globs: default_include_globs(),
            category: None,
            wiki_site: default_wiki_site(),
            user_agent: default_user_agent(),
            request_pause_ms: default_request_pause_ms(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("./data/wiki_chunks.jsonl")
}
fn default_ignore_sections() -> Vec<String> {
    DEFAULT_IGNORED_SECTIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.wiki".to_string(), "**/*.txt".to_string()]
}
fn default_wiki_site() -> String {
    "en.wikipedia.org".to_string()
}
fn default_user_agent() -> String {
    concat!("wiki-kb/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_request_pause_ms() -> u64 {
    100
}
fn default_max_pages() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    pub path: PathBuf,
    /// Skip rows that fail to decode instead of failing the load.
    #[serde(default)]
    pub skip_malformed: bool,
}

impl Config {
    /// Configuration used by commands that only parse and chunk local
    /// files when no config file exists.
    pub fn minimal() -> Self {
        Self {
            chunking: ChunkingConfig {
                max_tokens: 250,
                max_recursion: default_max_recursion(),
                size_unit: SizeUnit::default(),
                tokenizer_model: default_tokenizer_model(),
                min_section_chars: default_min_section_chars(),
                max_embedding_chars: None,
            },
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            chat: ChatConfig::default(),
            ingest: IngestConfig::default(),
            knowledge_bases: BTreeMap::new(),
            default_topic: None,
        }
    }

    /// The topic used when a command does not name one: `default_topic`
    /// if set, otherwise the first configured topic by name.
    pub fn resolved_default_topic(&self) -> Option<String> {
        self.default_topic
            .as_ref()
            .map(|t| t.to_lowercase())
            .or_else(|| self.knowledge_bases.keys().next().cloned())
    }

    /// Look up a knowledge base by topic, falling back to the default topic.
    pub fn topic(&self, requested: Option<&str>) -> Result<(String, &KnowledgeBaseConfig)> {
        let topic = match requested {
            Some(t) => t.to_lowercase(),
            None => self.resolved_default_topic().ok_or_else(|| {
                anyhow::anyhow!(
                    "No knowledge bases configured. Add a [knowledge_bases.<topic>] section."
                )
            })?,
        };
        match self.knowledge_bases.get(&topic) {
            Some(kb) => Ok((topic, kb)),
            None => bail!(
                "Unknown topic '{}'. Available topics: {}",
                topic,
                self.knowledge_bases
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Section parser options derived from `[chunking]` and `[ingest]`.
    pub fn section_options(&self) -> SectionOptions {
        SectionOptions {
            ignore: self.ingest.ignore_sections.clone(),
            min_section_chars: self.chunking.min_section_chars,
            ..SectionOptions::default()
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.max_embedding_chars == Some(0) {
        bail!("chunking.max_embedding_chars must be > 0 when set");
    }

    // Validate retrieval
    if config.retrieval.top_n < 1 {
        bail!("retrieval.top_n must be >= 1");
    }

    if !(0.0..=2.0).contains(&config.chat.temperature) {
        bail!("chat.temperature must be in [0.0, 2.0]");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Topics are case-insensitive
    let mut topics = BTreeMap::new();
    for (name, kb) in std::mem::take(&mut config.knowledge_bases) {
        let key = name.to_lowercase();
        if topics.insert(key.clone(), kb).is_some() {
            bail!("knowledge_bases.{} is defined more than once", key);
        }
    }
    config.knowledge_bases = topics;

    if let Some(topic) = &config.default_topic {
        let topic = topic.to_lowercase();
        if !config.knowledge_bases.contains_key(&topic) {
            bail!(
                "default_topic '{}' is not among the configured knowledge_bases",
                topic
            );
        }
        config.default_topic = Some(topic);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_defaults() {
        let file = write_config("[chunking]\nmax_tokens = 100\n");
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.chunking.max_recursion, 5);
        assert_eq!(cfg.chunking.size_unit, SizeUnit::ApproxTokens);
        assert_eq!(cfg.chunking.min_section_chars, 16);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.embedding.batch_size, 8);
        assert_eq!(cfg.retrieval.top_n, 4);
        assert_eq!(cfg.ingest.ignore_sections.len(), DEFAULT_IGNORED_SECTIONS.len());
        assert!(cfg.resolved_default_topic().is_none());
    }

    #[test]
    fn test_topics_are_lowercased() {
        let file = write_config(
            r#"
default_topic = "Olympics"

[chunking]
max_tokens = 100

[knowledge_bases.Olympics]
path = "a.jsonl"

[knowledge_bases.curling]
path = "b.jsonl"
skip_malformed = true
"#,
        );
        let cfg = load_config(file.path()).unwrap();
        assert!(cfg.knowledge_bases.contains_key("olympics"));
        assert!(cfg.knowledge_bases["curling"].skip_malformed);
        assert_eq!(cfg.resolved_default_topic().as_deref(), Some("olympics"));
    }

    #[test]
    fn test_default_topic_falls_back_to_first() {
        let file = write_config(
            "[chunking]\nmax_tokens = 1\n[knowledge_bases.zeta]\npath = \"z\"\n[knowledge_bases.alpha]\npath = \"a\"\n",
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.resolved_default_topic().as_deref(), Some("alpha"));
    }

    #[test]
    fn test_unknown_default_topic_rejected() {
        let file = write_config(
            "default_topic = \"nope\"\n[chunking]\nmax_tokens = 1\n[knowledge_bases.a]\npath = \"a\"\n",
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("default_topic"));
    }

    #[test]
    fn test_validation_errors() {
        let zero = write_config("[chunking]\nmax_tokens = 0\n");
        assert!(load_config(zero.path()).is_err());

        let no_dims = write_config(
            "[chunking]\nmax_tokens = 10\n[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n",
        );
        let err = load_config(no_dims.path()).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let unknown = write_config("[chunking]\nmax_tokens = 10\n[embedding]\nprovider = \"local\"\n");
        assert!(load_config(unknown.path()).is_err());

        let top_n = write_config("[chunking]\nmax_tokens = 10\n[retrieval]\ntop_n = 0\n");
        assert!(load_config(top_n.path()).is_err());
    }

    #[test]
    fn test_topic_lookup() {
        let file = write_config(
            "[chunking]\nmax_tokens = 1\n[knowledge_bases.a]\npath = \"a\"\n[knowledge_bases.b]\npath = \"b\"\n",
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.topic(None).unwrap().0, "a");
        assert_eq!(cfg.topic(Some("B")).unwrap().0, "b");
        let err = cfg.topic(Some("c")).unwrap_err().to_string();
        assert!(err.contains("Available topics: a, b"), "{err}");

        assert!(Config::minimal().topic(None).is_err());
    }

    #[test]
    fn test_size_unit_parses() {
        let file = write_config("[chunking]\nmax_tokens = 10\nsize_unit = \"words\"\n");
        assert_eq!(load_config(file.path()).unwrap().chunking.size_unit, SizeUnit::Words);
    }
}
