//! Retrieval-augmented answering.
//!
//! [`AskService`] embeds a question, retrieves the top fragments from the
//! topic's knowledge base, and asks the chat model to answer from them.
//! The user prompt it sends looks like:
//!
//! ```text
//! Use the numbered context snippets below to answer the user's question. ...
//!
//! Context:
//! 1. (score=0.912) Curling — Results (chunk 0):
//! Sweden won the gold medal.
//! 2. (score=0.874) Curling (chunk 1):
//! ...
//!
//! Question: Who won curling?
//! ```

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use wiki_kb_core::embedding::EmbeddingGateway;
use wiki_kb_core::index::KnowledgeBase;
use wiki_kb_core::models::{Fragment, SearchHit};
use wiki_kb_core::record::DEFAULT_PAGE_TITLE;

use crate::chat::{ChatMessage, ChatModel, OpenAiChat};
use crate::config::Config;
use crate::embedding::create_gateway;
use crate::store;

const NO_CONTEXT: &str = "No relevant context found.";

/// A generated answer with the fragments it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub topic: String,
    pub text: String,
    pub hits: Vec<SearchHit>,
}

pub struct AskService {
    bases: BTreeMap<String, Arc<KnowledgeBase>>,
    gateway: Arc<dyn EmbeddingGateway>,
    chat: Arc<dyn ChatModel>,
    top_n: usize,
    system_prompt: String,
    default_topic: String,
}

impl AskService {
    pub fn new(
        bases: BTreeMap<String, Arc<KnowledgeBase>>,
        gateway: Arc<dyn EmbeddingGateway>,
        chat: Arc<dyn ChatModel>,
        top_n: usize,
        system_prompt: impl Into<String>,
        default_topic: &str,
    ) -> Result<Self> {
        if bases.is_empty() {
            bail!("AskService requires at least one knowledge base");
        }
        let bases: BTreeMap<String, Arc<KnowledgeBase>> = bases
            .into_iter()
            .map(|(topic, kb)| (topic.to_lowercase(), kb))
            .collect();
        let default_topic = default_topic.to_lowercase();
        if !bases.contains_key(&default_topic) {
            bail!("Default topic '{}' is not among the knowledge bases", default_topic);
        }
        Ok(Self {
            bases,
            gateway,
            chat,
            top_n,
            system_prompt: system_prompt.into(),
            default_topic,
        })
    }

    /// Load every configured knowledge base and connect the gateways.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut bases = BTreeMap::new();
        for (topic, kb_config) in &config.knowledge_bases {
            let kb = store::load_knowledge_base(topic, kb_config)?;
            bases.insert(topic.clone(), Arc::new(kb));
        }
        let default_topic = config.resolved_default_topic().ok_or_else(|| {
            anyhow::anyhow!("No knowledge bases configured. Add a [knowledge_bases.<topic>] section.")
        })?;
        let gateway = create_gateway(&config.embedding)?;
        let chat = Arc::new(OpenAiChat::new(&config.chat, &config.embedding)?);
        Self::new(
            bases,
            gateway,
            chat,
            config.retrieval.top_n,
            config.chat.system_prompt.clone(),
            &default_topic,
        )
    }

    pub fn available_topics(&self) -> Vec<String> {
        self.bases.keys().cloned().collect()
    }

    fn knowledge_base(&self, topic: Option<&str>) -> Result<(String, &Arc<KnowledgeBase>)> {
        let key = topic
            .map(str::to_lowercase)
            .unwrap_or_else(|| self.default_topic.clone());
        match self.bases.get(&key) {
            Some(kb) => Ok((key, kb)),
            None => bail!(
                "Unknown topic '{}'. Available topics: {}",
                key,
                self.available_topics().join(", ")
            ),
        }
    }

    /// Top fragments for `question`. A blank question retrieves nothing.
    pub async fn retrieve(&self, question: &str, topic: Option<&str>) -> Result<Vec<SearchHit>> {
        let (_, kb) = self.knowledge_base(topic)?;
        search_knowledge_base(kb, self.gateway.as_ref(), question, self.top_n).await
    }

    pub async fn answer(&self, question: &str, topic: Option<&str>) -> Result<Answer> {
        let (topic, kb) = self.knowledge_base(topic)?;
        let hits = search_knowledge_base(kb, self.gateway.as_ref(), question, self.top_n).await?;
        tracing::debug!(topic = %topic, hits = hits.len(), "retrieved context");

        let prompt = build_prompt(question, &build_context_block(&hits));
        let messages = [
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(prompt),
        ];
        let text = self.chat.complete(&messages).await?;
        Ok(Answer { topic, text, hits })
    }
}

/// Embed `query` and rank `kb` against it. Blank queries return nothing.
pub async fn search_knowledge_base(
    kb: &KnowledgeBase,
    gateway: &dyn EmbeddingGateway,
    query: &str,
    top_n: usize,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let vector = gateway
        .embed(query)
        .await
        .context("Failed to embed query")?;
    Ok(kb.search(&vector, top_n)?)
}

/// `"Title — Section (chunk N):\nbody"`; nested headings are joined with
/// `" / "` and the lead has no section part.
pub fn format_fragment(fragment: &Fragment) -> String {
    let title = fragment.title().unwrap_or(DEFAULT_PAGE_TITLE);
    let heading = if fragment.labels.len() > 1 {
        format!("{} — {}", title, fragment.labels[1..].join(" / "))
    } else {
        title.to_string()
    };
    format!("{} (chunk {}):\n{}", heading, fragment.position, fragment.body())
}

/// Numbered context lines with three-decimal scores.
pub fn build_context_block(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_CONTEXT.to_string();
    }
    let lines: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "{}. (score={:.3}) {}",
                i + 1,
                hit.score,
                format_fragment(&hit.fragment)
            )
        })
        .collect();
    format!("Context:\n{}", lines.join("\n"))
}

pub fn build_prompt(question: &str, context_block: &str) -> String {
    format!(
        "Use the numbered context snippets below to answer the user's question. \
         If the answer is not contained in the context, reply that you don't know.\n\n\
         {}\n\nQuestion: {}",
        context_block, question
    )
    .trim()
    .to_string()
}
