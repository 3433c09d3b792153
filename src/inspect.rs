//! Offline inspection of a single page.
//!
//! `wkb sections <file>` and `wkb chunk <file>` run the parser and the
//! chunker on a local wikitext file and print what ingestion would see,
//! without embedding anything. Both accept `--json` for machine-readable
//! output.

use anyhow::{Context, Result};
use std::path::Path;

use wiki_kb_core::chunk::chunk_section;
use wiki_kb_core::models::{Fragment, Section};
use wiki_kb_core::section::parse_sections;

use crate::config::Config;
use crate::sources::Page;

/// Read `path` as one page. The title defaults to the file stem.
pub fn load_page(path: &Path, title: Option<&str>) -> Result<Page> {
    let wikitext = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let title = title.map(str::to_string).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().replace('_', " "))
            .unwrap_or_default()
    });
    Ok(Page { title, wikitext })
}

pub fn page_sections(config: &Config, page: &Page) -> Vec<Section> {
    parse_sections(&page.title, &page.wikitext, &config.section_options())
}

/// Fragments of every section of `page`, using the configured size unit.
pub fn page_fragments(config: &Config, page: &Page, max_tokens: Option<usize>) -> Result<Vec<Fragment>> {
    let measure = config
        .chunking
        .size_unit
        .measure(&config.chunking.tokenizer_model)?;
    let max_size = max_tokens.unwrap_or(config.chunking.max_tokens).max(1);
    Ok(page_sections(config, page)
        .iter()
        .flat_map(|section| {
            chunk_section(section, max_size, &*measure, config.chunking.max_recursion)
        })
        .collect())
}

pub fn run_sections(config: &Config, path: &Path, title: Option<&str>, json: bool) -> Result<()> {
    let page = load_page(path, title)?;
    let sections = page_sections(config, &page);

    if json {
        println!("{}", serde_json::to_string_pretty(&sections)?);
        return Ok(());
    }

    println!("--- {} ({} sections) ---", page.title, sections.len());
    for section in &sections {
        println!("[{}]", section.labels.join(" / "));
        println!("{}", section.body);
        println!();
    }
    Ok(())
}

pub fn run_chunk(
    config: &Config,
    path: &Path,
    title: Option<&str>,
    max_tokens: Option<usize>,
    json: bool,
) -> Result<()> {
    let page = load_page(path, title)?;
    let fragments = page_fragments(config, &page, max_tokens)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&fragments)?);
        return Ok(());
    }

    println!("--- {} ({} fragments) ---", page.title, fragments.len());
    for fragment in &fragments {
        println!(
            "[{} | chunk {}]",
            fragment.labels.join(" / "),
            fragment.position
        );
        println!("{}", fragment.body());
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiki_kb_core::chunk::{SizeFn, SizeUnit, WordCount};

    const PAGE: &str = "'''Curling''' is a sport in which players slide stones on a sheet of ice.\n\
== History ==\n\
The game was invented in medieval Scotland. The first written reference dates from 1541.\n\
=== Olympics ===\n\
Curling was part of the 1924 Winter Olympics.\n\
== See also ==\n\
* [[Bowls]]\n";

    #[test]
    fn test_load_page_title_from_stem() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Winter_sports.wiki");
        std::fs::write(&path, PAGE).unwrap();
        assert_eq!(load_page(&path, None).unwrap().title, "Winter sports");
        assert_eq!(load_page(&path, Some("Curling")).unwrap().title, "Curling");
    }

    #[test]
    fn test_page_sections_drop_ignored() {
        let page = Page {
            title: "Curling".into(),
            wikitext: PAGE.into(),
        };
        let sections = page_sections(&Config::minimal(), &page);
        let labels: Vec<String> = sections.iter().map(|s| s.labels.join("/")).collect();
        assert_eq!(labels, vec!["Curling", "Curling/History", "Curling/History/Olympics"]);
    }

    #[test]
    fn test_page_fragments_respect_budget() {
        let mut config = Config::minimal();
        config.chunking.size_unit = SizeUnit::Words;
        let page = Page {
            title: "Curling".into(),
            wikitext: PAGE.into(),
        };
        let fragments = page_fragments(&config, &page, Some(12)).unwrap();
        assert!(fragments.len() > 3);
        for f in &fragments {
            assert!(WordCount.size(&f.text) <= 12, "{:?}", f.text);
        }
    }
}
