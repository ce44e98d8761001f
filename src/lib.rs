//! # Pagewise
//!
//! Grounded question answering over a single ingested document.
//!
//! Pagewise takes the page records produced by an upstream PDF/OCR extractor,
//! splits them into fixed-size chunks, embeds each chunk, and builds a dense
//! cosine-similarity index. Questions are answered from the best-matching
//! chunks only: hits below a similarity threshold are discarded, a generative
//! backend is asked for a cited answer when one is configured, and an
//! extractive answer stitched from the source text is used otherwise.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────┐   ┌──────────┐   ┌────────────────┐
//! │ pages.json │──▶│ Chunker │──▶│ Embedder │──▶│ Index Builder  │
//! └────────────┘   └─────────┘   └──────────┘   │ index.npy+meta │
//!                                               └───────┬────────┘
//!                                                       ▼
//!                   ┌─────────────────┐          ┌────────────┐
//!   question ──────▶│ Answer Composer │◀─────────│ Retriever  │
//!                   └────────┬────────┘          └────────────┘
//!                            ▼
//!                  answer + cited sources
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pagewise build                          # chunk, embed, index
//! pagewise search "operating margin" --k 5
//! pagewise ask "What was revenue in 2023?" --generative
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Library error type |
//! | [`models`] | Core data types and JSON artifacts |
//! | [`chunk`] | Word-window, image and table chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Normalized vector index and its persistence |
//! | [`retriever`] | Top-k cosine search |
//! | [`generate`] | Generative backends (OpenAI, Anthropic) |
//! | [`answer`] | Threshold gating, prompting and extractive fallback |
//! | [`progress`] | Pipeline progress reporting |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod models;
pub mod progress;
pub mod retriever;

pub use error::{Error, Result};
