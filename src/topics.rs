//! Knowledge-base overview for `wkb topics`.
//!
//! Loads every configured knowledge base and prints one row per topic with
//! its fragment count and vector dimension, or the reason it failed to
//! load. The default topic is marked with `*`.

use anyhow::Result;

use crate::config::Config;
use crate::store;

/// One row of the overview.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicStatus {
    pub topic: String,
    pub is_default: bool,
    pub path: String,
    /// `Ok((fragments, dims))` or the load error.
    pub state: Result<(usize, usize), String>,
}

pub fn collect_topics(config: &Config) -> Vec<TopicStatus> {
    let default_topic = config.resolved_default_topic();
    config
        .knowledge_bases
        .iter()
        .map(|(topic, kb_config)| {
            let state = store::load_knowledge_base(topic, kb_config)
                .map(|kb| (kb.len(), kb.dims().unwrap_or(0)))
                .map_err(|e| format!("{e:#}"));
            TopicStatus {
                topic: topic.clone(),
                is_default: default_topic.as_deref() == Some(topic.as_str()),
                path: kb_config.path.display().to_string(),
                state,
            }
        })
        .collect()
}

pub fn run_topics(config: &Config) -> Result<()> {
    let topics = collect_topics(config);
    if topics.is_empty() {
        println!("No knowledge bases configured.");
        return Ok(());
    }

    println!("{:<2}{:<16} {:<10} {:<6} PATH", "", "TOPIC", "FRAGMENTS", "DIMS");
    for status in &topics {
        let marker = if status.is_default { "*" } else { "" };
        match &status.state {
            Ok((fragments, dims)) => println!(
                "{:<2}{:<16} {:<10} {:<6} {}",
                marker, status.topic, fragments, dims, status.path
            ),
            Err(e) => {
                println!(
                    "{:<2}{:<16} {:<10} {:<6} {}",
                    marker, status.topic, "ERROR", "-", status.path
                );
                eprintln!("Warning: {}: {}", status.topic, e);
            }
        }
    }
    Ok(())
}
