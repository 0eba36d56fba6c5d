//! LLM coordination: provider-agnostic chat dispatch, summarization,
//! priority evaluation, embeddings, quota circuit breaking, and retry.

mod breaker;
mod client;
mod embedder;
mod evaluator;
mod retry;
mod summarizer;

pub use breaker::{CircuitBreaker, CircuitState, get_circuit_breaker, reset_circuit_breaker};
pub use client::{LlmClient, LlmSettings, Provider, extract_json_object, is_quota_error, is_transient_error};
pub use embedder::{EmbeddingProvider, HttpEmbedder, LocalHashEmbedder, compose_embedding_input};
pub use evaluator::{ContentEvaluation, Evaluator};
pub use retry::call_with_retry;
pub use summarizer::{ContentSummary, SummarizeRequest, Summarizer, SummaryMode};
