//! `wkb search` and `wkb ask`: load a knowledge base, rank fragments
//! against the query, and print them or a generated answer.

use anyhow::{bail, Result};

use crate::ask::{search_knowledge_base, AskService};
use crate::config::Config;
use crate::embedding::create_gateway;
use crate::store;

/// Run `wkb search`: print the top fragments for `query`.
pub async fn run_search(
    config: &Config,
    query: &str,
    topic: Option<&str>,
    top_n: Option<usize>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let (topic, kb_config) = config.topic(topic)?;
    let top_n = top_n.unwrap_or(config.retrieval.top_n);
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let kb = store::load_knowledge_base(&topic, kb_config)?;
    let gateway = create_gateway(&config.embedding)?;
    let hits = search_knowledge_base(&kb, gateway.as_ref(), query, top_n).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let fragment = &hit.fragment;
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            hit.score,
            fragment.labels.join(" / ")
        );
        println!("    topic: {}", topic);
        println!("    chunk: {}", fragment.position);
        println!(
            "    excerpt: \"{}\"",
            excerpt(fragment.body(), 200).replace('\n', " ").trim()
        );
        println!();
    }
    Ok(())
}

/// Run `wkb ask`: print a generated answer and its sources.
pub async fn run_ask(config: &Config, question: &str, topic: Option<&str>) -> Result<()> {
    // Validate the topic before loading every knowledge base.
    config.topic(topic)?;
    if !config.embedding.is_enabled() {
        bail!("Ask requires embeddings. Set [embedding] provider in config.");
    }
    let service = AskService::from_config(config)?;
    let answer = service.answer(question, topic).await?;

    println!("{}", answer.text);
    if !answer.hits.is_empty() {
        println!();
        println!("Sources ({}):", answer.topic);
        for (i, hit) in answer.hits.iter().enumerate() {
            println!(
                "  {}. [{:.3}] {} (chunk {})",
                i + 1,
                hit.score,
                hit.fragment.labels.join(" / "),
                hit.fragment.position
            );
        }
    }
    Ok(())
}

/// First `max_chars` characters of `text`, with `...` when cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
