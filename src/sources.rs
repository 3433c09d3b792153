//! Page sources for ingestion.
//!
//! - **Local directory**: every file under a root matching the include
//!   globs is one page; the title is the file stem.
//! - **MediaWiki category**: up to `max_pages` members of a category,
//!   fetched as raw wikitext through the action API at
//!   `https://{wiki_site}/w/api.php`.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::time::Duration;
use walkdir::WalkDir;

use crate::config::IngestConfig;

/// One wiki page as raw wikitext.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub title: String,
    pub wikitext: String,
}

// ============ Local directory ============

pub fn scan_directory(root: &Path, include_globs: &[String]) -> Result<Vec<Page>> {
    if !root.exists() {
        bail!("Page directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(&["**/.git/**".to_string()])?;

    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        found.push((rel_str, path.to_path_buf()));
    }

    // Sort for deterministic ordering
    found.sort_by(|a, b| a.0.cmp(&b.0));

    let mut pages = Vec::with_capacity(found.len());
    for (_, path) in found {
        let wikitext = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let title = path
            .file_stem()
            .map(|n| n.to_string_lossy().replace('_', " "))
            .unwrap_or_default();
        pages.push(Page { title, wikitext });
    }
    Ok(pages)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

// ============ MediaWiki ============

pub struct MediaWikiClient {
    http: reqwest::Client,
    api_url: String,
    pause: Duration,
}

impl MediaWikiClient {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_url: format!("https://{}/w/api.php", config.wiki_site.trim_end_matches('/')),
            pause: Duration::from_millis(config.request_pause_ms),
        })
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        tokio::time::sleep(self.pause).await;
        let response = self
            .http
            .get(&self.api_url)
            .query(&[("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Titles of up to `max_pages` articles in `category`.
    pub async fn category_titles(&self, category: &str, max_pages: usize) -> Result<Vec<String>> {
        let category = category_title(category);
        let limit = max_pages.clamp(1, 500).to_string();
        let mut titles = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query"),
                ("list", "categorymembers"),
                ("cmtitle", category.as_str()),
                ("cmtype", "page"),
                ("cmlimit", limit.as_str()),
            ];
            if let Some(c) = cursor.as_deref() {
                params.push(("cmcontinue", c));
            }
            let json = self
                .get(&params)
                .await
                .with_context(|| format!("Failed to list members of '{}'", category))?;
            let (batch, next) = parse_category_members(&json)?;
            titles.extend(batch);

            if titles.len() >= max_pages || next.is_none() {
                break;
            }
            cursor = next;
        }

        titles.truncate(max_pages);
        tracing::info!(category = %category, count = titles.len(), "collected category titles");
        Ok(titles)
    }

    /// Raw wikitext of `title`, or `None` if the page does not exist.
    pub async fn page_wikitext(&self, title: &str) -> Result<Option<String>> {
        let json = self
            .get(&[
                ("action", "query"),
                ("prop", "revisions"),
                ("rvprop", "content"),
                ("rvslots", "main"),
                ("titles", title),
            ])
            .await?;
        parse_page_content(&json)
    }
}

/// Fetch every page of a category. Pages that fail to download are
/// logged and skipped.
pub async fn fetch_category(config: &IngestConfig, category: &str) -> Result<Vec<Page>> {
    let client = MediaWikiClient::new(config)?;
    let titles = client.category_titles(category, config.max_pages).await?;

    let mut pages = Vec::with_capacity(titles.len());
    for title in titles {
        match client.page_wikitext(&title).await {
            Ok(Some(wikitext)) if !wikitext.trim().is_empty() => {
                tracing::debug!(title = %title, chars = wikitext.len(), "fetched page");
                pages.push(Page { title, wikitext });
            }
            Ok(_) => tracing::warn!(title = %title, "page is missing or empty, skipping"),
            Err(e) => tracing::warn!(title = %title, error = %e, "failed to fetch page, skipping"),
        }
    }
    Ok(pages)
}

fn category_title(category: &str) -> String {
    let category = category.trim();
    if category
        .get(..9)
        .is_some_and(|p| p.eq_ignore_ascii_case("category:"))
    {
        category.to_string()
    } else {
        format!("Category:{}", category)
    }
}

/// Member titles and the continuation cursor, if any.
fn parse_category_members(json: &serde_json::Value) -> Result<(Vec<String>, Option<String>)> {
    if let Some(err) = json.get("error") {
        bail!("MediaWiki API error: {}", err);
    }
    let members = json
        .pointer("/query/categorymembers")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid MediaWiki response: missing categorymembers"))?;
    let titles = members
        .iter()
        .filter_map(|m| m.get("title").and_then(|t| t.as_str()))
        .map(str::to_string)
        .collect();
    let next = json
        .pointer("/continue/cmcontinue")
        .and_then(|c| c.as_str())
        .map(str::to_string);
    Ok((titles, next))
}

fn parse_page_content(json: &serde_json::Value) -> Result<Option<String>> {
    if let Some(err) = json.get("error") {
        bail!("MediaWiki API error: {}", err);
    }
    let page = json
        .pointer("/query/pages/0")
        .ok_or_else(|| anyhow::anyhow!("Invalid MediaWiki response: missing pages"))?;
    if page.get("missing").is_some() || page.get("invalid").is_some() {
        return Ok(None);
    }
    Ok(page
        .pointer("/revisions/0/slots/main/content")
        .and_then(|c| c.as_str())
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_directory_titles_and_globs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("Ice_hockey.wiki"), "Lead text.").unwrap();
        fs::write(tmp.path().join("sub/Curling.txt"), "Stones.").unwrap();
        fs::write(tmp.path().join("notes.md"), "ignored").unwrap();

        let globs = vec!["**/*.wiki".to_string(), "**/*.txt".to_string()];
        let pages = scan_directory(tmp.path(), &globs).unwrap();
        let titles: Vec<&str> = pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Ice hockey", "Curling"]);
        assert_eq!(pages[1].wikitext, "Stones.");
    }

    #[test]
    fn test_scan_missing_directory() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_directory(&tmp.path().join("nope"), &["**/*".to_string()]).is_err());
    }

    #[test]
    fn test_category_title_prefix() {
        assert_eq!(category_title("1980 Summer Olympics"), "Category:1980 Summer Olympics");
        assert_eq!(category_title("category:Curling"), "category:Curling");
    }

    #[test]
    fn test_parse_category_members() {
        let json = serde_json::json!({
            "continue": {"cmcontinue": "page|ABC|12", "continue": "-||"},
            "query": {"categorymembers": [
                {"pageid": 1, "ns": 0, "title": "Curling at the 1980 Winter Olympics"},
                {"pageid": 2, "ns": 0, "title": "Biathlon"}
            ]}
        });
        let (titles, next) = parse_category_members(&json).unwrap();
        assert_eq!(titles.len(), 2);
        assert_eq!(next.as_deref(), Some("page|ABC|12"));

        let last = serde_json::json!({"query": {"categorymembers": []}});
        assert_eq!(parse_category_members(&last).unwrap(), (vec![], None));

        let err = serde_json::json!({"error": {"code": "badtitle"}});
        assert!(parse_category_members(&err).is_err());
    }

    #[test]
    fn test_parse_page_content() {
        let json = serde_json::json!({"query": {"pages": [{
            "title": "Curling",
            "revisions": [{"slots": {"main": {"content": "'''Curling''' is a sport."}}}]
        }]}});
        assert_eq!(
            parse_page_content(&json).unwrap().as_deref(),
            Some("'''Curling''' is a sport.")
        );

        let missing = serde_json::json!({"query": {"pages": [{"title": "Nope", "missing": true}]}});
        assert_eq!(parse_page_content(&missing).unwrap(), None);
    }
}
