//! Grounded answer composition.
//!
//! One query runs through a fixed sequence of states:
//!
//! ```text
//! retrieve ──▶ threshold filter ──▶ build prompt ──▶ generate ──▶ answer
//!    │               │                                   │
//!    ▼               ▼                                   ▼
//! not available  not available                 extractive fallback
//! ```
//!
//! Only retriever failures (missing or corrupt index, dimension mismatch)
//! reach the caller. Backend failures are logged and answered from the
//! extractive fallback, which is a pure string operation and cannot fail.

use tracing::{debug, info, warn};

use crate::chunk::snippet;
use crate::config::{AnswerConfig, GenerationConfig};
use crate::error::Result;
use crate::generate::{CompletionRequest, GenerativeBackend};
use crate::models::{AnswerResult, Hit};
use crate::retriever::Retriever;

/// Returned verbatim when no retrieved content is relevant enough.
pub const NOT_AVAILABLE: &str = "The answer is not available in the provided documents.";

pub const SYSTEM_INSTRUCTION: &str = "You are a concise, factual assistant that answers questions \
using ONLY the provided sources. Do not use outside knowledge and do not guess. \
If the answer cannot be found in the sources, reply exactly: \
\"The answer is not available in the provided documents.\" \
End your answer with the pages you used, like: (page X).";

/// Decoding temperature for every backend call.
pub const TEMPERATURE: f32 = 0.0;

/// Tunable knobs of the composer.
#[derive(Debug, Clone)]
pub struct AnswerPolicy {
    pub similarity_threshold: f32,
    pub fallback_hits: usize,
    pub fallback_snippet_chars: usize,
    pub max_output_tokens: usize,
    pub extractive_by_default: bool,
}

impl Default for AnswerPolicy {
    fn default() -> Self {
        Self::from_config(&AnswerConfig::default(), &GenerationConfig::default())
    }
}

impl AnswerPolicy {
    pub fn from_config(answer: &AnswerConfig, generation: &GenerationConfig) -> Self {
        Self {
            similarity_threshold: answer.similarity_threshold,
            fallback_hits: answer.fallback_hits,
            fallback_snippet_chars: answer.fallback_snippet_chars,
            max_output_tokens: generation.max_output_tokens,
            extractive_by_default: answer.extractive_by_default,
        }
    }
}

/// Keep hits scoring at or above `threshold`, preserving order.
pub fn filter_by_threshold(hits: Vec<Hit>, threshold: f32) -> Vec<Hit> {
    hits.into_iter().filter(|h| h.score >= threshold).collect()
}

/// Render the user prompt: one `Source i (page P):` block per hit, then the
/// question.
pub fn build_prompt(question: &str, hits: &[Hit]) -> String {
    let context = hits
        .iter()
        .enumerate()
        .map(|(i, h)| format!("Source {} (page {}):\n{}\n", i + 1, h.meta.page, h.meta.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Use the context below to answer the question.\n\n\
         CONTEXT:\n{}\n\n\
         Question: {}\n\n\
         Answer concisely, and at the end list the sources you referenced like: (page X).",
        context, question
    )
}

/// Stitch the leading hits into a cited answer: `(page P) snippet` joined by
/// spaces.
pub fn extractive_answer(hits: &[Hit], max_hits: usize, snippet_chars: usize) -> String {
    hits.iter()
        .take(max_hits)
        .map(|h| {
            let flat = h.meta.text.trim().replace('\n', " ");
            format!("(page {}) {}", h.meta.page, snippet(&flat, snippet_chars))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn not_available() -> AnswerResult {
    AnswerResult {
        answer: NOT_AVAILABLE.to_string(),
        sources: Vec::new(),
    }
}

pub struct AnswerComposer<'a> {
    retriever: &'a Retriever<'a>,
    backend: Option<&'a dyn GenerativeBackend>,
    policy: AnswerPolicy,
}

impl<'a> AnswerComposer<'a> {
    pub fn new(
        retriever: &'a Retriever<'a>,
        backend: Option<&'a dyn GenerativeBackend>,
        policy: AnswerPolicy,
    ) -> Self {
        Self {
            retriever,
            backend,
            policy,
        }
    }

    /// Answer `question` from the top `k` hits.
    ///
    /// The backend is called at most once, and only when one is configured
    /// and either `prefer_generative` is set or the policy does not default
    /// to extractive answers.
    pub fn answer(&self, question: &str, k: usize, prefer_generative: bool) -> Result<AnswerResult> {
        let hits = self.retriever.search(question, k)?;
        if hits.is_empty() {
            debug!("no hits");
            return Ok(not_available());
        }

        let retrieved = hits.len();
        let hits = filter_by_threshold(hits, self.policy.similarity_threshold);
        if hits.is_empty() {
            info!(
                retrieved,
                threshold = self.policy.similarity_threshold,
                "no hit above similarity threshold"
            );
            return Ok(not_available());
        }

        if let Some(answer) = self.generate(question, &hits, prefer_generative) {
            return Ok(AnswerResult {
                answer,
                sources: hits,
            });
        }

        let answer = extractive_answer(
            &hits,
            self.policy.fallback_hits,
            self.policy.fallback_snippet_chars,
        );
        Ok(AnswerResult {
            answer,
            sources: hits,
        })
    }

    fn generate(&self, question: &str, hits: &[Hit], prefer_generative: bool) -> Option<String> {
        let backend = self.backend?;
        if !prefer_generative && self.policy.extractive_by_default {
            return None;
        }

        let prompt = build_prompt(question, hits);
        let request = CompletionRequest {
            system: SYSTEM_INSTRUCTION,
            prompt: &prompt,
            temperature: TEMPERATURE,
            max_tokens: self.policy.max_output_tokens,
        };
        match backend.complete(&request) {
            Ok(text) if !text.trim().is_empty() => {
                debug!(backend = backend.name(), "generated answer");
                Some(text)
            }
            Ok(_) => {
                warn!(backend = backend.name(), "empty completion, using extractive answer");
                None
            }
            Err(e) => {
                warn!(
                    backend = backend.name(),
                    error = %format!("{:#}", e),
                    "generation failed, using extractive answer"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::embedding::Embedder;
    use crate::index::VectorIndex;
    use crate::models::{ChunkType, EmbeddedChunk, IndexMeta};

    /// Every query embeds to the first axis.
    struct QueryEmbedder;

    impl Embedder for QueryEmbedder {
        fn model_name(&self) -> &str {
            "query"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct FixedBackend {
        reply: anyhow::Result<String>,
        calls: Cell<usize>,
        last_prompt: RefCell<String>,
        last_temperature: Cell<Option<f32>>,
    }

    impl FixedBackend {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: Cell::new(0),
                last_prompt: RefCell::new(String::new()),
                last_temperature: Cell::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(anyhow::anyhow!("401 invalid api key")),
                calls: Cell::new(0),
                last_prompt: RefCell::new(String::new()),
                last_temperature: Cell::new(None),
            }
        }
    }

    impl GenerativeBackend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }
        fn complete(&self, request: &CompletionRequest<'_>) -> anyhow::Result<String> {
            self.calls.set(self.calls.get() + 1);
            *self.last_prompt.borrow_mut() = request.prompt.to_string();
            self.last_temperature.set(Some(request.temperature));
            assert_eq!(request.system, SYSTEM_INSTRUCTION);
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    /// Rows whose cosine with the query axis equals the given scores.
    fn index_with_scores(scores: &[f32]) -> VectorIndex {
        let items: Vec<EmbeddedChunk> = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| EmbeddedChunk {
                chunk_id: i,
                page: i as u32 + 1,
                kind: ChunkType::Text,
                text: format!("chunk text {}", i),
                embedding: Some(vec![s, (1.0 - s * s).max(0.0).sqrt()]),
            })
            .collect();
        VectorIndex::build(&items, 800).unwrap()
    }

    fn hit(page: u32, text: &str, score: f32) -> Hit {
        Hit {
            score,
            meta: IndexMeta {
                chunk_id: 0,
                page,
                kind: ChunkType::Text,
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn test_threshold_filters_low_hits_without_backend() {
        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.9, 0.8, 0.3])).unwrap();
        let composer = AnswerComposer::new(&retriever, None, AnswerPolicy::default());
        let result = composer.answer("X", 3, false).unwrap();

        assert_eq!(result.sources.len(), 2);
        assert!(result.sources.iter().all(|h| h.score >= 0.75));
        assert!((result.sources[0].score - 0.9).abs() < 1e-5);
        assert!((result.sources[1].score - 0.8).abs() < 1e-5);
        assert_eq!(
            result.answer,
            "(page 1) chunk text 0 (page 2) chunk text 1"
        );
    }

    #[test]
    fn test_nothing_above_threshold_is_not_available() {
        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.5, 0.2])).unwrap();
        let backend = FixedBackend::ok("should not be used");
        let composer = AnswerComposer::new(&retriever, Some(&backend), AnswerPolicy::default());
        let result = composer.answer("X", 5, true).unwrap();

        assert_eq!(result.answer, NOT_AVAILABLE);
        assert!(result.sources.is_empty());
        assert_eq!(backend.calls.get(), 0);
    }

    #[test]
    fn test_zero_k_is_not_available() {
        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.9])).unwrap();
        let composer = AnswerComposer::new(&retriever, None, AnswerPolicy::default());
        let result = composer.answer("X", 0, false).unwrap();
        assert_eq!(result.answer, NOT_AVAILABLE);
        assert!(result.sources.is_empty());
    }

    #[test]
    fn test_backend_answer_returned_verbatim() {
        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.95, 0.4])).unwrap();
        let backend = FixedBackend::ok("  Net income was $3M. (page 1)\n");
        let composer = AnswerComposer::new(&retriever, Some(&backend), AnswerPolicy::default());
        let result = composer.answer("What was net income?", 5, false).unwrap();

        assert_eq!(result.answer, "  Net income was $3M. (page 1)\n");
        assert_eq!(result.sources.len(), 1);
        assert_eq!(backend.calls.get(), 1);
        let prompt = backend.last_prompt.borrow();
        assert!(prompt.contains("Source 1 (page 1):\nchunk text 0"));
        assert!(!prompt.contains("chunk text 1"));
        assert!(prompt.contains("Question: What was net income?"));
    }

    #[test]
    fn test_backend_failure_falls_back() {
        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.9])).unwrap();
        let backend = FixedBackend::failing();
        let composer = AnswerComposer::new(&retriever, Some(&backend), AnswerPolicy::default());
        let result = composer.answer("X", 5, true).unwrap();

        assert_eq!(backend.calls.get(), 1);
        assert_eq!(result.answer, "(page 1) chunk text 0");
        assert_eq!(result.sources.len(), 1);
    }

    #[test]
    fn test_blank_backend_answer_falls_back() {
        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.9])).unwrap();
        let backend = FixedBackend::ok("   ");
        let composer = AnswerComposer::new(&retriever, Some(&backend), AnswerPolicy::default());
        let result = composer.answer("X", 5, false).unwrap();
        assert_eq!(result.answer, "(page 1) chunk text 0");
    }

    #[test]
    fn test_extractive_by_default_skips_backend_unless_preferred() {
        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.9])).unwrap();
        let backend = FixedBackend::ok("generated");
        let policy = AnswerPolicy {
            extractive_by_default: true,
            ..AnswerPolicy::default()
        };
        let composer = AnswerComposer::new(&retriever, Some(&backend), policy);

        let plain = composer.answer("X", 5, false).unwrap();
        assert_eq!(plain.answer, "(page 1) chunk text 0");
        assert_eq!(backend.calls.get(), 0);

        let preferred = composer.answer("X", 5, true).unwrap();
        assert_eq!(preferred.answer, "generated");
        assert_eq!(backend.calls.get(), 1);
    }

    #[test]
    fn test_backend_always_decodes_at_zero_temperature() {
        let config: crate::config::Config =
            toml::from_str("[generation]\ntemperature = 0.9\nmax_output_tokens = 50\n").unwrap();
        config.validate().unwrap();
        let policy = AnswerPolicy::from_config(&config.answer, &config.generation);
        assert_eq!(policy.max_output_tokens, 50);

        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.9])).unwrap();
        let backend = FixedBackend::ok("generated");
        let composer = AnswerComposer::new(&retriever, Some(&backend), policy);
        composer.answer("X", 5, true).unwrap();
        assert_eq!(backend.last_temperature.get(), Some(0.0));
    }

    #[test]
    fn test_threshold_is_tunable() {
        let retriever = Retriever::new(&QueryEmbedder, index_with_scores(&[0.5])).unwrap();
        let policy = AnswerPolicy {
            similarity_threshold: 0.4,
            ..AnswerPolicy::default()
        };
        let composer = AnswerComposer::new(&retriever, None, policy);
        let result = composer.answer("X", 5, false).unwrap();
        assert_eq!(result.sources.len(), 1);
    }

    #[test]
    fn test_filter_by_threshold_keeps_boundary() {
        let hits = vec![hit(1, "a", 0.75), hit(2, "b", 0.7499), hit(3, "c", 0.9)];
        let kept = filter_by_threshold(hits, 0.75);
        let pages: Vec<u32> = kept.iter().map(|h| h.meta.page).collect();
        assert_eq!(pages, vec![1, 3]);
    }

    #[test]
    fn test_extractive_answer_caps_hits_and_flattens() {
        let hits = vec![
            hit(1, "line one\nline two", 0.9),
            hit(2, &"y".repeat(900), 0.85),
            hit(3, "third", 0.8),
            hit(4, "fourth", 0.79),
        ];
        let answer = extractive_answer(&hits, 3, 800);
        assert!(answer.starts_with("(page 1) line one line two (page 2) "));
        assert!(answer.contains(&format!("{}... (page 3) third", "y".repeat(800))));
        assert!(!answer.contains("fourth"));
    }

    #[test]
    fn test_build_prompt_orders_sources() {
        let hits = vec![hit(7, "alpha", 0.9), hit(2, "beta", 0.8)];
        let prompt = build_prompt("Q?", &hits);
        let first = prompt.find("Source 1 (page 7):\nalpha").unwrap();
        let second = prompt.find("Source 2 (page 2):\nbeta").unwrap();
        assert!(first < second);
        assert!(prompt.ends_with("like: (page X)."));
    }
}
