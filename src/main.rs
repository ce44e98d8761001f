//! # Pagewise CLI (`pagewise`)
//!
//! Runs the ingestion pipeline stage by stage and answers questions against
//! the built index.
//!
//! ## Usage
//!
//! ```bash
//! pagewise --config ./config/pagewise.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pagewise chunk` | Split `pages.json` into `chunks.json` |
//! | `pagewise embed` | Embed every chunk into `embeddings.json` |
//! | `pagewise index` | Normalize embeddings into `index.npy` + `metadata.json` |
//! | `pagewise build` | Run chunk, embed and index in sequence |
//! | `pagewise search "<query>"` | Print the top-k hits with scores |
//! | `pagewise ask "<question>"` | Answer a question with cited sources |
//!
//! Without `--config`, `./config/pagewise.toml` is used when present and
//! built-in defaults otherwise. A `.env` file in the working directory is
//! loaded before the configuration, so API keys can live there.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use pagewise::answer::{AnswerComposer, AnswerPolicy};
use pagewise::chunk::{create_chunks_from_pages, snippet};
use pagewise::config::{self, Config};
use pagewise::embedding::{create_embedder, create_embeddings};
use pagewise::generate::create_backend;
use pagewise::index::{build_index, VectorIndex};
use pagewise::progress::{ProgressMode, ProgressReporter};
use pagewise::retriever::Retriever;

const DEFAULT_CONFIG_PATH: &str = "./config/pagewise.toml";
const SEARCH_PREVIEW_CHARS: usize = 600;

/// Pagewise: grounded question answering over one ingested document.
#[derive(Parser)]
#[command(
    name = "pagewise",
    about = "Grounded question answering over one ingested document",
    version,
    long_about = "Pagewise chunks extracted pages, embeds the chunks, builds a cosine-similarity \
    index, and answers questions only from retrieved passages, citing the pages it used."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pagewise.toml` if it exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging for pagewise.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Progress output on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split extracted pages into chunks.
    ///
    /// Text is grouped into fixed windows of words, each OCR'd image becomes
    /// one chunk and each detected table is kept whole.
    Chunk {
        /// Page records from the extractor (overrides `paths.pages`).
        #[arg(long)]
        pages: Option<PathBuf>,
        /// Output chunk artifact (overrides `paths.chunks`).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Words per text chunk (overrides `chunking.chunk_size_words`).
        #[arg(long)]
        size: Option<usize>,
    },

    /// Embed every non-empty chunk with the configured provider.
    Embed {
        /// Chunk artifact (overrides `paths.chunks`).
        #[arg(long)]
        chunks: Option<PathBuf>,
        /// Output embedding artifact (overrides `paths.embeddings`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Build the normalized vector index and its metadata.
    Index {
        /// Embedding artifact (overrides `paths.embeddings`).
        #[arg(long)]
        embeddings: Option<PathBuf>,
        /// Output matrix in `.npy` format (overrides `paths.index`).
        #[arg(long)]
        index: Option<PathBuf>,
        /// Output metadata JSON (overrides `paths.metadata`).
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Run chunk, embed and index with the configured paths.
    Build,

    /// Print the top-k chunks for a query.
    Search {
        /// The search query.
        query: String,
        /// Number of hits (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a question from the indexed document.
    ///
    /// Hits below `answer.similarity_threshold` are ignored. A generative
    /// backend is used when its credential is set; otherwise the answer is
    /// stitched from the retrieved text.
    Ask {
        /// The question.
        question: String,
        /// Number of hits to retrieve (defaults to `retrieval.top_k`).
        #[arg(long)]
        k: Option<usize>,
        /// Ask the generative backend even when `answer.extractive_by_default` is set.
        #[arg(long)]
        generative: bool,
        /// Print `{answer, sources}` as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "pagewise=debug"
    } else {
        "pagewise=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = resolve_config(cli.config.as_deref())?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Chunk { pages, out, size } => {
            let mut chunking = cfg.chunking.clone();
            if let Some(size) = size {
                if size == 0 {
                    bail!("--size must be > 0");
                }
                chunking.chunk_size_words = size;
            }
            let pages = pages.unwrap_or_else(|| cfg.paths.pages.clone());
            let out = out.unwrap_or_else(|| cfg.paths.chunks.clone());
            let chunks = create_chunks_from_pages(&pages, &out, &chunking)?;
            println!("Wrote {} chunks to {}", chunks.len(), out.display());
        }
        Commands::Embed { chunks, out } => {
            let chunks = chunks.unwrap_or_else(|| cfg.paths.chunks.clone());
            let out = out.unwrap_or_else(|| cfg.paths.embeddings.clone());
            run_embed(&cfg, &chunks, &out, progress.as_ref())?;
        }
        Commands::Index {
            embeddings,
            index,
            metadata,
        } => {
            let embeddings = embeddings.unwrap_or_else(|| cfg.paths.embeddings.clone());
            let mut paths = cfg.paths.index_paths();
            if let Some(index) = index {
                paths.vectors = index;
            }
            if let Some(metadata) = metadata {
                paths.metadata = metadata;
            }
            let built = build_index(
                &embeddings,
                &paths,
                cfg.index.snippet_chars,
                progress.as_ref(),
            )?;
            println!(
                "Indexed {} vectors ({} dims) into {}",
                built.len(),
                built.dims(),
                paths.vectors.display()
            );
        }
        Commands::Build => {
            let chunks =
                create_chunks_from_pages(&cfg.paths.pages, &cfg.paths.chunks, &cfg.chunking)?;
            info!(chunks = chunks.len(), "chunk stage done");
            run_embed(
                &cfg,
                &cfg.paths.chunks,
                &cfg.paths.embeddings,
                progress.as_ref(),
            )?;
            let paths = cfg.paths.index_paths();
            let built = build_index(
                &cfg.paths.embeddings,
                &paths,
                cfg.index.snippet_chars,
                progress.as_ref(),
            )?;
            println!(
                "Built index: {} chunks, {} vectors ({} dims)",
                chunks.len(),
                built.len(),
                built.dims()
            );
        }
        Commands::Search { query, k } => {
            let k = resolve_k(k, &cfg)?;
            run_search(&cfg, &query, k)?;
        }
        Commands::Ask {
            question,
            k,
            generative,
            json,
        } => {
            if question.trim().is_empty() {
                bail!("question must not be empty");
            }
            let k = resolve_k(k, &cfg)?;
            run_ask(&cfg, &question, k, generative, json)?;
        }
    }

    Ok(())
}

/// Explicit `--config` must load; the default location is optional.
fn resolve_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                config::load_config(default)
            } else {
                debug!("no config file, using defaults");
                Ok(Config::default())
            }
        }
    }
}

fn resolve_k(k: Option<usize>, cfg: &Config) -> anyhow::Result<usize> {
    let k = k.unwrap_or(cfg.retrieval.top_k);
    if k < 1 {
        bail!("--k must be >= 1");
    }
    Ok(k)
}

fn run_embed(
    cfg: &Config,
    chunks: &Path,
    out: &Path,
    progress: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    if !cfg.embedding.is_enabled() {
        bail!("embedding provider is disabled; set [embedding].provider to embed chunks");
    }
    let embedder = create_embedder(&cfg.embedding)?;
    let embedded = create_embeddings(
        embedder.as_ref(),
        chunks,
        out,
        cfg.embedding.batch_size,
        progress,
    )?;
    println!(
        "Embedded {} chunks with {} into {}",
        embedded.len(),
        embedder.model_name(),
        out.display()
    );
    Ok(())
}

fn run_search(cfg: &Config, query: &str, k: usize) -> anyhow::Result<()> {
    let index = VectorIndex::load(&cfg.paths.index_paths())?;
    let embedder = create_embedder(&cfg.embedding)?;
    let retriever = Retriever::new(embedder.as_ref(), index)?;
    let hits = retriever.search(query, k)?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("--- Rank {} (score={:.4}) ---", i + 1, hit.score);
        println!("page: {}  type: {}", hit.meta.page, hit.meta.kind);
        println!("{}", snippet(&hit.meta.text, SEARCH_PREVIEW_CHARS));
        println!();
    }
    Ok(())
}

fn run_ask(
    cfg: &Config,
    question: &str,
    k: usize,
    prefer_generative: bool,
    json: bool,
) -> anyhow::Result<()> {
    let index = VectorIndex::load(&cfg.paths.index_paths())?;
    let embedder = create_embedder(&cfg.embedding)?;
    let retriever = Retriever::new(embedder.as_ref(), index)?;
    let backend = create_backend(&cfg.generation);
    let composer = AnswerComposer::new(
        &retriever,
        backend.as_deref(),
        AnswerPolicy::from_config(&cfg.answer, &cfg.generation),
    );
    let result = composer.answer(question, k, prefer_generative)?;

    if json {
        let out = serde_json::to_string_pretty(&result).context("failed to serialize answer")?;
        println!("{}", out);
        return Ok(());
    }

    println!("=== Answer ===\n");
    println!("{}", result.answer);
    if !result.sources.is_empty() {
        println!("\n=== Sources ===\n");
        for (i, hit) in result.sources.iter().enumerate() {
            println!(
                "{}. page {} ({}, score={:.4})",
                i + 1,
                hit.meta.page,
                hit.meta.kind,
                hit.score
            );
        }
    }
    Ok(())
}
