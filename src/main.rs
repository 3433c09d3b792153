//! # wiki-kb CLI (`wkb`)
//!
//! ## Usage
//!
//! ```bash
//! wkb --config ./config/wkb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wkb sections <file>` | Print the sections parsed from a wikitext file |
//! | `wkb chunk <file>` | Print the fragments a wikitext file is chunked into |
//! | `wkb ingest` | Build a knowledge-base file from a directory or category |
//! | `wkb topics` | List configured knowledge bases |
//! | `wkb search "<query>"` | Rank fragments of a knowledge base |
//! | `wkb ask "<question>"` | Answer a question from a knowledge base |
//!
//! Logs go to stderr; set `RUST_LOG` or pass `-v` for more detail.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use wiki_kb::config::{self, Config};
use wiki_kb::{ingest, inspect, search, topics};

/// wiki-kb: turn wiki articles into an embedded knowledge base and
/// answer questions against it.
#[derive(Parser)]
#[command(name = "wkb", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wkb.toml")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a wikitext file and print its sections.
    ///
    /// Works without a config file, using default parser settings.
    Sections {
        file: PathBuf,

        /// Page title (defaults to the file name).
        #[arg(long)]
        title: Option<String>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Parse and chunk a wikitext file and print its fragments.
    ///
    /// Works without a config file, using default chunking settings.
    Chunk {
        file: PathBuf,

        #[arg(long)]
        title: Option<String>,

        /// Override `chunking.max_tokens`.
        #[arg(long)]
        max_tokens: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Build a knowledge-base file.
    ///
    /// Pages come from `--dir`, `--category`, or the `[ingest]` config
    /// section. Fragments whose text is unchanged since the last run keep
    /// their embeddings.
    Ingest {
        /// Directory of `.wiki` / `.txt` pages.
        #[arg(long, conflicts_with = "category")]
        dir: Option<PathBuf>,

        /// MediaWiki category to fetch.
        #[arg(long)]
        category: Option<String>,

        /// Report page, section, and fragment counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// List configured knowledge bases.
    Topics,

    /// Search a knowledge base.
    Search {
        query: String,

        /// Knowledge base to search (defaults to `default_topic`).
        #[arg(long)]
        topic: Option<String>,

        /// Number of results (defaults to `retrieval.top_n`).
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Answer a question using a knowledge base as context.
    Ask {
        question: String,

        #[arg(long)]
        topic: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "wiki_kb=debug,wiki_kb_core=debug"
    } else {
        "wiki_kb=info,wiki_kb_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config for commands that can run on defaults: the file if it exists,
/// otherwise [`Config::minimal`].
fn config_or_minimal(path: &std::path::Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    match &cli.command {
        Commands::Sections { file, title, json } => {
            let cfg = config_or_minimal(&cli.config)?;
            return inspect::run_sections(&cfg, file, title.as_deref(), *json);
        }
        Commands::Chunk {
            file,
            title,
            max_tokens,
            json,
        } => {
            let cfg = config_or_minimal(&cli.config)?;
            return inspect::run_chunk(&cfg, file, title.as_deref(), *max_tokens, *json);
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            dir,
            category,
            dry_run,
        } => {
            let source = ingest::IngestSource::resolve(&cfg, dir, category)?;
            ingest::run_ingest(&cfg, source, dry_run).await?;
        }
        Commands::Topics => {
            topics::run_topics(&cfg)?;
        }
        Commands::Search {
            query,
            topic,
            top_n,
        } => {
            search::run_search(&cfg, &query, topic.as_deref(), top_n).await?;
        }
        Commands::Ask { question, topic } => {
            search::run_ask(&cfg, &question, topic.as_deref()).await?;
        }
        Commands::Sections { .. } | Commands::Chunk { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
