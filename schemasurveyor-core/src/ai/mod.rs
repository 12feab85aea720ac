//! AI-assisted field documentation.
//!
//! The [`DescriptionGenerator`] asks a text-generation backend for a short
//! description and business-friendly name per field. It can also act as the
//! [`SemanticOracle`](crate::classify::SemanticOracle) consulted for fields
//! the pattern detector cannot label.
//!
//! # Resilience
//! - TTL + LRU cache tagged with the model version
//! - Semaphore bounding in-flight requests
//! - Bounded exponential backoff honoring `Retry-After`
//! - Circuit breaker with a fixed cooldown
//!
//! Without an API key the generator never touches the network and returns
//! rule-based descriptions.

pub mod backend;
pub mod breaker;
pub mod cache;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod retry;

pub use backend::{Completion, CompletionBackend, CompletionRequest, OpenAiBackend, TokenUsage};
pub use cache::FieldDescription;
pub use error::AiError;
pub use generator::{DescriptionGenerator, fallback_description};
pub use metrics::AiMetrics;
pub use retry::RetryPolicy;
