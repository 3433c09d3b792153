//! Ingestion pipeline: pages → sections → fragments → embeddings → file.
//!
//! ```text
//! source ─▶ parse_sections ─▶ chunk_section ─▶ filter ─▶ embed (batched, reuse by hash) ─▶ JSONL ─▶ verify
//! ```
//!
//! Fragments whose SHA-256 matches a row of the previous output file keep
//! that row's vector instead of being re-embedded, as long as its length
//! matches `embedding.dims`.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use wiki_kb_core::chunk::{chunk_section, SizeFn};
use wiki_kb_core::models::Fragment;
use wiki_kb_core::record::{content_hash, FragmentRecord};
use wiki_kb_core::section::parse_sections;

use crate::config::Config;
use crate::embedding::{create_gateway, embed_in_batches};
use crate::sources::{self, Page};
use crate::store;

/// Where pages come from.
#[derive(Debug, Clone)]
pub enum IngestSource {
    Directory(PathBuf),
    Category(String),
}

impl IngestSource {
    /// Command-line choice first, then `[ingest] dir`, then `[ingest] category`.
    pub fn resolve(config: &Config, dir: Option<PathBuf>, category: Option<String>) -> Result<Self> {
        if let Some(dir) = dir {
            return Ok(Self::Directory(dir));
        }
        if let Some(category) = category {
            return Ok(Self::Category(category));
        }
        if let Some(dir) = &config.ingest.dir {
            return Ok(Self::Directory(dir.clone()));
        }
        if let Some(category) = &config.ingest.category {
            return Ok(Self::Category(category.clone()));
        }
        bail!("No page source. Pass --dir or --category, or set [ingest] dir or category.")
    }

    fn describe(&self) -> String {
        match self {
            Self::Directory(dir) => dir.display().to_string(),
            Self::Category(category) => category.clone(),
        }
    }
}

/// Counts from the fragment-building stage.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FragmentStats {
    pub pages: usize,
    pub sections: usize,
    pub fragments: usize,
    /// Blank or over-long fragments dropped before embedding.
    pub filtered: usize,
}

/// Parse, chunk, and filter `pages` into embeddable fragments.
pub fn build_fragments(
    pages: &[Page],
    config: &Config,
    size_fn: &(dyn SizeFn + Send + Sync),
) -> (Vec<Fragment>, FragmentStats) {
    let opts = config.section_options();
    let mut stats = FragmentStats {
        pages: pages.len(),
        ..FragmentStats::default()
    };
    let mut kept = Vec::new();

    for page in pages {
        let sections = parse_sections(&page.title, &page.wikitext, &opts);
        tracing::debug!(title = %page.title, sections = sections.len(), "parsed page");
        stats.sections += sections.len();

        for section in &sections {
            let fragments = chunk_section(
                section,
                config.chunking.max_tokens,
                size_fn,
                config.chunking.max_recursion,
            );
            stats.fragments += fragments.len();
            for fragment in fragments {
                let too_long = config
                    .chunking
                    .max_embedding_chars
                    .is_some_and(|max| fragment.text.chars().count() > max);
                if fragment.is_blank() || too_long {
                    stats.filtered += 1;
                    continue;
                }
                kept.push(fragment);
            }
        }
    }

    if stats.filtered > 0 {
        tracing::info!(filtered = stats.filtered, "filtered out fragments prior to embedding");
    }
    (kept, stats)
}

/// Run `wkb ingest`.
pub async fn run_ingest(config: &Config, source: IngestSource, dry_run: bool) -> Result<()> {
    let pages = match &source {
        IngestSource::Directory(dir) => sources::scan_directory(dir, &config.ingest.include_globs)?,
        IngestSource::Category(category) => sources::fetch_category(&config.ingest, category).await?,
    };
    if pages.is_empty() {
        bail!("No pages found in {}", source.describe());
    }

    let measure = config
        .chunking
        .size_unit
        .measure(&config.chunking.tokenizer_model)?;
    let (fragments, stats) = build_fragments(&pages, config, &*measure);

    if dry_run {
        println!("ingest {} (dry-run)", source.describe());
        println!("  pages: {}", stats.pages);
        println!("  sections: {}", stats.sections);
        println!("  fragments: {}", stats.fragments);
        println!("  filtered: {}", stats.filtered);
        return Ok(());
    }

    if fragments.is_empty() {
        bail!("No fragments to embed from {}", source.describe());
    }
    if !config.embedding.is_enabled() {
        bail!("Ingest requires embeddings. Set [embedding] provider in config.");
    }

    let output = &config.ingest.output;
    let dims = config.embedding.dims;
    let previous = store::existing_vectors(output);

    let mut vectors: Vec<Option<Vec<f32>>> = fragments
        .iter()
        .map(|f| {
            previous
                .get(&content_hash(&f.text))
                .filter(|v| Some(v.len()) == dims)
                .cloned()
        })
        .collect();
    let pending: Vec<usize> = (0..fragments.len())
        .filter(|&i| vectors[i].is_none())
        .collect();
    let reused = fragments.len() - pending.len();

    if !pending.is_empty() {
        let gateway = create_gateway(&config.embedding)?;
        let texts: Vec<String> = pending.iter().map(|&i| fragments[i].text.clone()).collect();
        let embedded = embed_in_batches(gateway.as_ref(), &texts, config.embedding.batch_size)
            .await
            .context("Embedding failed")?;
        for (i, vector) in pending.iter().zip(embedded) {
            vectors[*i] = Some(vector);
        }
        tracing::info!(count = texts.len(), model = gateway.model_name(), "generated embeddings");
    }

    let mut records = Vec::with_capacity(fragments.len());
    for (fragment, vector) in fragments.iter().zip(vectors) {
        let vector = vector.ok_or_else(|| anyhow::anyhow!("Missing embedding for fragment"))?;
        records.push(FragmentRecord::from_fragment(fragment, &vector));
    }

    store::write_records(output, &records)?;
    let verified = store::verify_file(output)
        .with_context(|| format!("Verification of {} failed", output.display()))?;

    println!("ingest {}", source.describe());
    println!("  pages: {}", stats.pages);
    println!("  sections: {}", stats.sections);
    println!("  fragments written: {}", verified);
    println!("  embeddings reused: {}", reused);
    println!("  embeddings generated: {}", pending.len());
    println!("  filtered: {}", stats.filtered);
    println!("  output: {}", output.display());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiki_kb_core::chunk::WordCount;

    fn page(title: &str, wikitext: &str) -> Page {
        Page {
            title: title.to_string(),
            wikitext: wikitext.to_string(),
        }
    }

    #[test]
    fn test_build_fragments_counts() {
        let config = Config::minimal();
        let pages = vec![
            page(
                "Curling",
                "Curling is played on ice with granite stones.\n== Rules ==\nTeams alternate throwing stones toward the house.\n== References ==\n* a book",
            ),
            page("Empty", ""),
        ];
        let (fragments, stats) = build_fragments(&pages, &config, &WordCount);
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.sections, 2);
        assert_eq!(stats.fragments, 2);
        assert_eq!(stats.filtered, 0);
        assert_eq!(fragments[1].labels, vec!["Curling", "Rules"]);
        assert!(fragments[1].text.starts_with("Curling\n\nRules\n\n"));
    }

    #[test]
    fn test_build_fragments_filters_long() {
        let mut config = Config::minimal();
        config.chunking.max_embedding_chars = Some(20);
        let pages = vec![page("Biathlon", "Biathlon combines skiing and rifle shooting.")];
        let (fragments, stats) = build_fragments(&pages, &config, &WordCount);
        assert!(fragments.is_empty());
        assert_eq!(stats.filtered, 1);
    }

    #[test]
    fn test_source_resolution_order() {
        let mut config = Config::minimal();
        assert!(IngestSource::resolve(&config, None, None).is_err());

        config.ingest.category = Some("Curling".into());
        assert!(matches!(
            IngestSource::resolve(&config, None, None).unwrap(),
            IngestSource::Category(c) if c == "Curling"
        ));
        assert!(matches!(
            IngestSource::resolve(&config, Some("pages".into()), None).unwrap(),
            IngestSource::Directory(_)
        ));
    }
}
