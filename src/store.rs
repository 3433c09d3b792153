//! Knowledge-base files.
//!
//! A knowledge base is stored as JSON Lines: one [`FragmentRecord`] per
//! line, with the embedding as a JSON-array string. Blank lines are
//! ignored.
//!
//! ```text
//! {"page_title":"Curling","section":"Results","labels":["Curling","Results"],"chunk_id":0,"text":"...","embedding":"[0.01,-0.2]","hash":"9f86..."}
//! ```

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use wiki_kb_core::index::KnowledgeBase;
use wiki_kb_core::models::Fragment;
use wiki_kb_core::record::FragmentRecord;

use crate::config::KnowledgeBaseConfig;

/// Write `records` to `path`, replacing any existing file.
pub fn write_records(path: &Path, records: &[FragmentRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Read raw rows. Each item is `(line_number, parsed row)`.
fn read_rows(path: &Path) -> Result<Vec<(usize, Result<FragmentRecord, serde_json::Error>)>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open knowledge base: {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push((i + 1, serde_json::from_str(&line)));
    }
    Ok(rows)
}

/// Decode every row of `path` into a fragment and its raw vector.
///
/// With `skip_malformed`, undecodable rows are logged and skipped;
/// otherwise the first one fails the read.
pub fn read_entries(path: &Path, skip_malformed: bool) -> Result<Vec<(Fragment, Vec<f32>)>> {
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for (line, row) in read_rows(path)? {
        let decoded = row
            .map_err(anyhow::Error::from)
            .and_then(|record| record.into_entry(entries.len()).map_err(anyhow::Error::from));
        match decoded {
            Ok(entry) => entries.push(entry),
            Err(e) if skip_malformed => {
                tracing::warn!(path = %path.display(), line, error = %e, "skipping malformed row");
                skipped += 1;
            }
            Err(e) => {
                return Err(e.context(format!("{}:{}: malformed row", path.display(), line)));
            }
        }
    }

    if skipped > 0 {
        tracing::info!(path = %path.display(), skipped, kept = entries.len(), "malformed rows skipped");
    }
    Ok(entries)
}

/// Read a configured knowledge-base file and load it into a new index.
pub fn load_knowledge_base(topic: &str, config: &KnowledgeBaseConfig) -> Result<KnowledgeBase> {
    let entries = read_entries(&config.path, config.skip_malformed)?;
    let kb = KnowledgeBase::new(topic);
    kb.load(entries)
        .with_context(|| format!("Failed to load knowledge base '{}'", topic))?;
    Ok(kb)
}

/// Embeddings already present in `path`, keyed by content hash.
///
/// Missing files and undecodable rows yield nothing; this only feeds
/// embedding reuse during ingestion.
pub fn existing_vectors(path: &Path) -> HashMap<String, Vec<f32>> {
    let mut vectors = HashMap::new();
    if !path.exists() {
        return vectors;
    }
    let rows = match read_rows(path) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read previous output");
            return vectors;
        }
    };
    for (_, row) in rows {
        let Ok(record) = row else { continue };
        let Some(hash) = record.resolved_hash() else {
            continue;
        };
        if let Ok((_, vector)) = record.into_entry(0) {
            vectors.insert(hash, vector);
        }
    }
    vectors
}

/// Re-read a written file and check that every row decodes and all
/// vectors share one dimension. Returns the row count.
pub fn verify_file(path: &Path) -> Result<usize> {
    let entries = read_entries(path, false)?;
    if let Some((_, first)) = entries.first() {
        let dims = first.len();
        if let Some(pos) = entries.iter().position(|(_, v)| v.len() != dims) {
            bail!(
                "{}: row {} has {} dimensions, expected {}",
                path.display(),
                pos + 1,
                entries[pos].1.len(),
                dims
            );
        }
    }
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fragment(section: &str, text: &str, position: usize) -> Fragment {
        Fragment {
            labels: vec!["Curling".to_string(), section.to_string()],
            text: format!("Curling\n\n{section}\n\n{text}"),
            position,
        }
    }

    fn sample() -> Vec<FragmentRecord> {
        vec![
            FragmentRecord::from_fragment(&fragment("Rules", "Stones slide.", 0), &[1.0, 0.0]),
            FragmentRecord::from_fragment(&fragment("Results", "Sweden won.", 0), &[0.0, 1.0]),
        ]
    }

    #[test]
    fn test_write_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/kb.jsonl");
        write_records(&path, &sample()).unwrap();
        assert_eq!(verify_file(&path).unwrap(), 2);

        let kb = load_knowledge_base(
            "curling",
            &KnowledgeBaseConfig {
                path: path.clone(),
                skip_malformed: false,
            },
        )
        .unwrap();
        let hits = kb.search(&[0.1, 0.9], 1).unwrap();
        assert_eq!(hits[0].fragment.section(), Some("Results"));
    }

    #[test]
    fn test_malformed_row_fails_or_skips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.jsonl");
        let mut body = String::new();
        for record in sample() {
            body.push_str(&serde_json::to_string(&record).unwrap());
            body.push('\n');
        }
        body.push_str("{\"text\":\"bad\",\"embedding\":\"[0.1,\"}\n\nnot json\n");
        std::fs::write(&path, body).unwrap();

        let err = read_entries(&path, false).unwrap_err();
        assert!(format!("{err:#}").contains(":3:"), "{err:#}");

        let entries = read_entries(&path, true).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_missing_chunk_id_uses_decoded_row_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.jsonl");
        let body = "{\"page_title\":\"A\",\"text\":\"a\",\"embedding\":\"[1.0]\"}\n\
                    not json\n\
                    {\"page_title\":\"B\",\"text\":\"b\",\"embedding\":\"[0.5]\"}\n\
                    {\"page_title\":\"B\",\"text\":\"c\",\"embedding\":\"[0.2]\"}\n";
        std::fs::write(&path, body).unwrap();

        let entries = read_entries(&path, true).unwrap();
        let positions: Vec<usize> = entries.iter().map(|(f, _)| f.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(read_entries(&tmp.path().join("absent.jsonl"), true).is_err());
        assert!(existing_vectors(&tmp.path().join("absent.jsonl")).is_empty());
    }

    #[test]
    fn test_existing_vectors_by_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.jsonl");
        let records = sample();
        write_records(&path, &records).unwrap();
        let vectors = existing_vectors(&path);
        assert_eq!(vectors.len(), 2);
        let hash = records[1].hash.clone().unwrap();
        assert_eq!(vectors[&hash], vec![0.0, 1.0]);
    }

    #[test]
    fn test_verify_rejects_mixed_dimensions() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.jsonl");
        let records = vec![
            FragmentRecord::from_fragment(&fragment("A", "one", 0), &[1.0, 0.0]),
            FragmentRecord::from_fragment(&fragment("B", "two", 0), &[1.0]),
        ];
        write_records(&path, &records).unwrap();
        assert!(verify_file(&path).is_err());
    }
}
