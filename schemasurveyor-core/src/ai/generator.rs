//! Resilient description generation.
//!
//! [`DescriptionGenerator`] wraps a [`CompletionBackend`] with a response
//! cache, a concurrency limiter, bounded retries and a circuit breaker. Every
//! failure except rejected credentials degrades to a rule-based description
//! built from the field name and type.

use super::backend::{Completion, CompletionBackend, CompletionRequest, OpenAiBackend};
use super::breaker::CircuitBreaker;
use super::cache::{DescriptionCache, FieldDescription, InsertOutcome};
use super::error::AiError;
use super::metrics::AiMetrics;
use super::retry::RetryPolicy;
use crate::Result;
use crate::classify::SemanticOracle;
use crate::config::AiConfig;
use crate::models::{ClassifiedField, FieldType, SchemaSnapshot, SemanticType};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

const DESCRIPTION_SYSTEM_PROMPT: &str =
    "You are a data documentation expert. Generate concise, clear descriptions for data fields.";
const SEMANTIC_SYSTEM_PROMPT: &str =
    "You are a data classification expert. Respond with only the semantic type name.";

const PROMPT_SAMPLE_VALUES: usize = 5;
const SEMANTIC_TEMPERATURE: f32 = 0.1;
const SEMANTIC_MAX_TOKENS: u32 = 20;

const SEMANTIC_LABELS: &[&str] = &[
    "email",
    "phone",
    "ssn",
    "credit_card",
    "url",
    "uuid",
    "date",
    "zip_code",
    "currency",
    "identifier",
    "name",
    "category",
    "count",
    "address",
    "country",
    "state",
    "city",
    "other",
];

/// Generates field descriptions and business names.
pub struct DescriptionGenerator {
    config: AiConfig,
    backend: Option<Arc<dyn CompletionBackend>>,
    policy: RetryPolicy,
    limiter: Semaphore,
    cache: Mutex<DescriptionCache>,
    breaker: Mutex<CircuitBreaker>,
    metrics: Mutex<AiMetrics>,
}

impl std::fmt::Debug for DescriptionGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptionGenerator")
            .field("config", &self.config)
            .field("backend", &self.backend.is_some())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl DescriptionGenerator {
    /// Creates a generator, connecting to the configured provider when an API
    /// key is present. Without one every description is rule-based.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: AiConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| crate::SurveyError::configuration(e.to_string()))?;

        let backend: Option<Arc<dyn CompletionBackend>> = if config.has_credentials() {
            Some(Arc::new(OpenAiBackend::new(&config)?))
        } else {
            tracing::info!("No API key configured; using rule-based descriptions");
            None
        };
        Ok(Self::build(config, backend))
    }

    /// Creates a generator over an explicit backend.
    pub fn with_backend(config: AiConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        Self::build(config, Some(backend))
    }

    fn build(config: AiConfig, backend: Option<Arc<dyn CompletionBackend>>) -> Self {
        Self {
            policy: RetryPolicy::from_config(&config),
            limiter: Semaphore::new(config.max_concurrent_requests.max(1)),
            cache: Mutex::new(DescriptionCache::new(
                config.cache_ttl(),
                config.cache_max_size,
            )),
            breaker: Mutex::new(CircuitBreaker::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_timeout(),
            )),
            metrics: Mutex::new(AiMetrics::default()),
            backend,
            config,
        }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Switches models. Cached descriptions from the previous model are
    /// ignored from now on.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    /// Describes one field.
    ///
    /// # Errors
    ///
    /// Only a rejected API key is reported; every other failure yields the
    /// rule-based description.
    pub async fn generate_description(
        &self,
        field_path: &str,
        field_name: &str,
        data_type: FieldType,
        semantic_type: Option<SemanticType>,
        sample_values: &[Value],
    ) -> Result<FieldDescription> {
        self.metrics.lock().await.total_requests += 1;

        let key = DescriptionCache::key(field_path, data_type, semantic_type);
        if self.config.cache_enabled {
            let cached = self.cache.lock().await.get(&key, &self.config.model);
            let mut metrics = self.metrics.lock().await;
            if let Some(description) = cached {
                metrics.cache_hits += 1;
                metrics.cached_requests += 1;
                tracing::debug!("Cache hit for {}", field_path);
                return Ok(description);
            }
            metrics.cache_misses += 1;
        }

        let Some(backend) = &self.backend else {
            return Ok(fallback_description(field_name, data_type, semantic_type));
        };

        if self.breaker.lock().await.is_open() {
            self.metrics.lock().await.failed_requests += 1;
            tracing::warn!("Circuit breaker open, using fallback for {}", field_path);
            return Ok(fallback_description(field_name, data_type, semantic_type));
        }

        let request = CompletionRequest {
            model: self.config.model.clone(),
            system: DESCRIPTION_SYSTEM_PROMPT.to_string(),
            prompt: description_prompt(
                field_path,
                field_name,
                data_type,
                semantic_type,
                sample_values,
            ),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        match self.call_with_retry(backend.as_ref(), request).await {
            Ok(completion) => {
                let fallback = fallback_description(field_name, data_type, semantic_type);
                let description = parse_description(&completion.content, fallback);

                if self.config.cache_enabled {
                    let outcome = self.cache.lock().await.insert(
                        key,
                        description.clone(),
                        &self.config.model,
                    );
                    if outcome == InsertOutcome::Evicted {
                        self.metrics.lock().await.cache_evictions += 1;
                    }
                }
                Ok(description)
            }
            Err(error) if error.is_authentication() => {
                tracing::error!("Description backend rejected credentials: {}", error);
                Err(error.into())
            }
            Err(error) => {
                tracing::warn!(
                    "Description generation failed for {}, using fallback: {}",
                    field_path,
                    error
                );
                Ok(fallback_description(field_name, data_type, semantic_type))
            }
        }
    }

    /// Describes every field, preserving input order. Individual failures,
    /// including rejected credentials, yield the rule-based description.
    pub async fn generate_batch(&self, fields: &[ClassifiedField]) -> Vec<FieldDescription> {
        let tasks = fields.iter().map(|field| async move {
            match self
                .generate_description(
                    &field.field_path,
                    &field.field_name,
                    field.data_type,
                    field.semantic_type,
                    &field.sample_values,
                )
                .await
            {
                Ok(description) => description,
                Err(e) => {
                    tracing::warn!("Failed to describe {}: {}", field.field_path, e);
                    fallback_description(&field.field_name, field.data_type, field.semantic_type)
                }
            }
        });
        futures::future::join_all(tasks).await
    }

    /// Fills `description` and `business_name` on every snapshot field.
    pub async fn describe_snapshot(&self, snapshot: &mut SchemaSnapshot) {
        let descriptions = self.generate_batch(&snapshot.fields).await;
        for (field, generated) in snapshot.fields.iter_mut().zip(descriptions) {
            field.description = Some(generated.description);
            field.business_name = Some(generated.business_name);
        }
        tracing::info!(
            "Generated descriptions for {} fields of {}",
            snapshot.fields.len(),
            snapshot.source_name
        );
    }

    /// Current counters, including cache size and breaker state.
    pub async fn metrics(&self) -> AiMetrics {
        let mut metrics = self.metrics.lock().await.clone();
        metrics.cache_size = self.cache.lock().await.len();
        metrics.circuit_breaker_open = self.breaker.lock().await.is_open();
        metrics
    }

    pub async fn reset_metrics(&self) {
        *self.metrics.lock().await = AiMetrics::default();
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        tracing::debug!("Description cache cleared");
    }

    /// Sends `request`, retrying transient failures with backoff.
    ///
    /// Every attempt holds a limiter permit and runs under the request
    /// timeout. The breaker and request counters see one outcome per call.
    async fn call_with_retry(
        &self,
        backend: &dyn CompletionBackend,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, AiError> {
        let timeout = self.config.request_timeout();
        let mut backoff = self.policy.backoff();
        let mut attempt = 0;

        let result = loop {
            attempt += 1;
            let outcome = {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|e| AiError::Connection(e.to_string()))?;
                match tokio::time::timeout(timeout, backend.complete(request.clone())).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AiError::Timeout(timeout)),
                }
            };

            let error = match outcome {
                Ok(completion) => break Ok(completion),
                Err(error) => error,
            };

            {
                let mut metrics = self.metrics.lock().await;
                match &error {
                    AiError::RateLimited { .. } => metrics.rate_limit_errors += 1,
                    AiError::Timeout(_) => metrics.timeout_errors += 1,
                    _ => metrics.api_errors += 1,
                }
            }

            if !error.is_retryable() || attempt >= self.policy.max_attempts {
                break Err(error);
            }

            let wait = match &error {
                AiError::RateLimited {
                    retry_after: Some(hint),
                } => *hint,
                _ => backoff.next_backoff(),
            };
            tracing::warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}",
                attempt,
                self.policy.max_attempts,
                error,
                wait
            );
            tokio::time::sleep(wait).await;
        };

        match &result {
            Ok(completion) => {
                self.breaker.lock().await.record_success();
                let mut metrics = self.metrics.lock().await;
                metrics.successful_requests += 1;
                metrics.record_usage(completion.usage);
            }
            Err(_) => {
                self.metrics.lock().await.failed_requests += 1;
                let mut breaker = self.breaker.lock().await;
                if breaker.record_failure() {
                    tracing::warn!(
                        "Circuit breaker opened after {} consecutive failures",
                        breaker.consecutive_failures()
                    );
                }
            }
        }
        result
    }
}

#[async_trait]
impl SemanticOracle for DescriptionGenerator {
    async fn classify(
        &self,
        field_name: &str,
        sample_values: &[Value],
        data_type: FieldType,
    ) -> Option<SemanticType> {
        let backend = self.backend.as_ref()?;
        if self.breaker.lock().await.is_open() {
            return None;
        }
        self.metrics.lock().await.total_requests += 1;

        let request = CompletionRequest {
            model: self.config.model.clone(),
            system: SEMANTIC_SYSTEM_PROMPT.to_string(),
            prompt: semantic_prompt(field_name, data_type, sample_values),
            temperature: SEMANTIC_TEMPERATURE,
            max_tokens: SEMANTIC_MAX_TOKENS,
        };

        match self.call_with_retry(backend.as_ref(), request).await {
            Ok(completion) => {
                let label = completion
                    .content
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
                let semantic = SemanticType::from_label(label);
                tracing::debug!("Backend labelled {} as {:?}", field_name, semantic);
                semantic
            }
            Err(e) => {
                tracing::warn!("Semantic classification failed for {}: {}", field_name, e);
                None
            }
        }
    }
}

/// Rule-based description used whenever the backend is unavailable.
pub fn fallback_description(
    field_name: &str,
    data_type: FieldType,
    semantic_type: Option<SemanticType>,
) -> FieldDescription {
    let business_name = title_case(&field_name.replace('_', " "));
    let kind = semantic_type
        .map(|s| s.as_str())
        .unwrap_or_else(|| data_type.as_str());
    FieldDescription {
        description: format!("{business_name} field of type {kind}"),
        business_name,
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn render_samples(sample_values: &[Value]) -> String {
    sample_values
        .iter()
        .take(PROMPT_SAMPLE_VALUES)
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn description_prompt(
    field_path: &str,
    field_name: &str,
    data_type: FieldType,
    semantic_type: Option<SemanticType>,
    sample_values: &[Value],
) -> String {
    format!(
        "Generate a description and business-friendly name for this data field:\n\n\
         Field Path: {field_path}\n\
         Field Name: {field_name}\n\
         Data Type: {data_type}\n\
         Semantic Type: {}\n\
         Sample Values: {}\n\n\
         Please respond in this format:\n\
         DESCRIPTION: <1-2 sentence description>\n\
         BUSINESS_NAME: <Business-friendly name>",
        semantic_type.map(|s| s.as_str()).unwrap_or("N/A"),
        render_samples(sample_values),
    )
}

fn semantic_prompt(field_name: &str, data_type: FieldType, sample_values: &[Value]) -> String {
    format!(
        "Classify the semantic type of this data field.\n\n\
         Field Name: {field_name}\n\
         Data Type: {data_type}\n\
         Sample Values: {}\n\n\
         Choose one of: {}\n\n\
         Respond with ONLY the semantic type name.",
        render_samples(sample_values),
        SEMANTIC_LABELS.join(", "),
    )
}

/// Extracts the `DESCRIPTION:` and `BUSINESS_NAME:` lines, keeping the
/// fallback for whichever is missing.
fn parse_description(content: &str, fallback: FieldDescription) -> FieldDescription {
    let mut description = None;
    let mut business_name = None;
    for line in content.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("DESCRIPTION:") {
            description = Some(rest.trim().to_string()).filter(|s| !s.is_empty());
        } else if let Some(rest) = line.strip_prefix("BUSINESS_NAME:") {
            business_name = Some(rest.trim().to_string()).filter(|s| !s.is_empty());
        }
    }
    FieldDescription {
        description: description.unwrap_or(fallback.description),
        business_name: business_name.unwrap_or(fallback.business_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SurveyError;
    use crate::ai::backend::TokenUsage;
    use crate::models::FieldMetadata;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const REPLY: &str = "DESCRIPTION: The customer's email address.\nBUSINESS_NAME: Email Address";

    /// Backend that replays scripted outcomes, then succeeds with `REPLY`.
    #[derive(Default)]
    struct ScriptedBackend {
        script: std::sync::Mutex<VecDeque<std::result::Result<Completion, AiError>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        models: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn with_script(
            outcomes: Vec<std::result::Result<Completion, AiError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(outcomes.into()),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<Completion, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.models.lock().unwrap().push(request.model);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(Completion {
                        content: REPLY.to_string(),
                        usage: TokenUsage {
                            prompt_tokens: 80,
                            completion_tokens: 20,
                            total_tokens: 100,
                        },
                    })
                })
        }
    }

    fn classified(name: &str, data_type: FieldType) -> ClassifiedField {
        ClassifiedField {
            field_path: name.to_string(),
            field_name: name.to_string(),
            parent_path: String::new(),
            nesting_level: 0,
            data_type,
            confidence_score: 100.0,
            semantic_type: None,
            is_pii: false,
            pii_type: None,
            pii_confidence: 0.0,
            is_array: false,
            array_item_type: None,
            is_nullable: false,
            sample_values: vec![json!("x")],
            null_count: 0,
            total_count: 1,
            null_percentage: 0.0,
            distinct_count: 1,
            cardinality_ratio: 1.0,
            numeric_stats: None,
            description: None,
            business_name: None,
            metadata: FieldMetadata::default(),
        }
    }

    fn config() -> AiConfig {
        AiConfig::default().with_api_key("sk-test")
    }

    async fn describe_email(generator: &DescriptionGenerator) -> Result<FieldDescription> {
        generator
            .generate_description(
                "customer.email",
                "email",
                FieldType::String,
                Some(SemanticType::Email),
                &[json!("a@b.com")],
            )
            .await
    }

    #[test]
    fn test_fallback_description() {
        let fallback = fallback_description("customer_first_name", FieldType::String, None);
        assert_eq!(fallback.business_name, "Customer First Name");
        assert_eq!(fallback.description, "Customer First Name field of type string");

        let fallback =
            fallback_description("contact", FieldType::String, Some(SemanticType::Email));
        assert_eq!(fallback.description, "Contact field of type email");

        assert_eq!(title_case("userID total"), "Userid Total");
    }

    #[test]
    fn test_parse_description() {
        let fallback = fallback_description("email", FieldType::String, None);
        let parsed = parse_description(REPLY, fallback.clone());
        assert_eq!(parsed.description, "The customer's email address.");
        assert_eq!(parsed.business_name, "Email Address");

        let partial = parse_description("BUSINESS_NAME: Contact Email", fallback.clone());
        assert_eq!(partial.business_name, "Contact Email");
        assert_eq!(partial.description, fallback.description);

        assert_eq!(parse_description("I cannot help with that", fallback.clone()), fallback);
    }

    #[test]
    fn test_description_prompt_shape() {
        let samples: Vec<Value> = (1..=8).map(|i| json!(format!("v{i}"))).collect();
        let prompt = description_prompt("a.b", "b", FieldType::String, None, &samples);
        assert!(prompt.contains("Field Path: a.b\n"));
        assert!(prompt.contains("Semantic Type: N/A\n"));
        assert!(prompt.contains("Sample Values: v1, v2, v3, v4, v5\n"));
        assert!(!prompt.contains("v6"));
        assert!(prompt.ends_with("BUSINESS_NAME: <Business-friendly name>"));
    }

    #[tokio::test]
    async fn test_without_backend_uses_fallback() {
        let generator = DescriptionGenerator::new(AiConfig::default()).unwrap();
        assert!(!generator.has_backend());

        let description = describe_email(&generator).await.unwrap();
        assert_eq!(description.business_name, "Email");
        assert_eq!(description.description, "Email field of type email");

        let metrics = generator.metrics().await;
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.failed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_within_ttl_and_refresh_after() {
        let backend = ScriptedBackend::with_script(vec![]);
        let generator = DescriptionGenerator::with_backend(
            config().with_cache_ttl(Duration::from_secs(3600)),
            backend.clone(),
        );

        let first = describe_email(&generator).await.unwrap();
        let second = describe_email(&generator).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.business_name, "Email Address");
        assert_eq!(backend.calls(), 1);

        tokio::time::advance(Duration::from_secs(3601)).await;
        describe_email(&generator).await.unwrap();
        assert_eq!(backend.calls(), 2);

        let metrics = generator.metrics().await;
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 2);
        assert_eq!(metrics.successful_requests, 2);
        assert_eq!(metrics.total_tokens, 200);
        assert_eq!(metrics.cache_size, 1);
    }

    #[tokio::test]
    async fn test_model_change_bypasses_cache() {
        let backend = ScriptedBackend::with_script(vec![]);
        let mut generator = DescriptionGenerator::with_backend(config(), backend.clone());

        describe_email(&generator).await.unwrap();
        generator.set_model("gpt-4o-mini");
        describe_email(&generator).await.unwrap();

        assert_eq!(backend.calls(), 2);
        assert_eq!(
            *backend.models.lock().unwrap(),
            vec!["gpt-3.5-turbo".to_string(), "gpt-4o-mini".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cache_disabled_always_calls_backend() {
        let backend = ScriptedBackend::with_script(vec![]);
        let generator =
            DescriptionGenerator::with_backend(config().with_cache_enabled(false), backend.clone());

        describe_email(&generator).await.unwrap();
        describe_email(&generator).await.unwrap();
        assert_eq!(backend.calls(), 2);
        assert_eq!(generator.metrics().await.cache_misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_and_honors_retry_after() {
        let backend = ScriptedBackend::with_script(vec![
            Err(AiError::RateLimited {
                retry_after: Some(Duration::from_secs(5)),
            }),
            Err(AiError::Server { status: 503 }),
        ]);
        let generator = DescriptionGenerator::with_backend(config(), backend.clone());

        let start = tokio::time::Instant::now();
        let description = describe_email(&generator).await.unwrap();
        assert_eq!(description.business_name, "Email Address");
        assert_eq!(backend.calls(), 3);
        // 5s from the hint plus the first 1s backoff step.
        assert!(start.elapsed() >= Duration::from_secs(6));

        let metrics = generator.metrics().await;
        assert_eq!(metrics.rate_limit_errors, 1);
        assert_eq!(metrics.api_errors, 1);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fall_back() {
        let backend = ScriptedBackend::with_script(vec![
            Err(AiError::Connection("reset".into())),
            Err(AiError::Connection("reset".into())),
            Err(AiError::Connection("reset".into())),
        ]);
        let generator = DescriptionGenerator::with_backend(config(), backend.clone());

        let description = describe_email(&generator).await.unwrap();
        assert_eq!(description.description, "Email field of type email");
        assert_eq!(backend.calls(), 3);

        let metrics = generator.metrics().await;
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.cache_size, 0);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let backend = ScriptedBackend::with_script(vec![Err(AiError::Client {
            status: 400,
            message: "bad request".into(),
        })]);
        let generator = DescriptionGenerator::with_backend(config(), backend.clone());

        let description = describe_email(&generator).await.unwrap();
        assert_eq!(description.business_name, "Email");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_authentication_failure_propagates() {
        let backend =
            ScriptedBackend::with_script(vec![Err(AiError::Authentication { status: 401 })]);
        let generator = DescriptionGenerator::with_backend(config(), backend.clone());

        let err = describe_email(&generator).await.unwrap_err();
        assert!(matches!(err, SurveyError::ExternalService { .. }));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_is_retried() {
        let backend = Arc::new(ScriptedBackend {
            delay: Some(Duration::from_secs(45)),
            ..ScriptedBackend::default()
        });
        let generator = DescriptionGenerator::with_backend(config(), backend.clone());

        let description = describe_email(&generator).await.unwrap();
        assert_eq!(description.business_name, "Email");
        assert_eq!(backend.calls(), 3);
        assert_eq!(generator.metrics().await.timeout_errors, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_short_circuits() {
        let failures = (0..3).map(|_| Err(AiError::Server { status: 500 })).collect();
        let backend = ScriptedBackend::with_script(failures);
        let mut cfg = config()
            .with_max_attempts(1)
            .with_circuit_breaker(3, Duration::from_secs(60));
        cfg.cache_enabled = false;
        let generator = DescriptionGenerator::with_backend(cfg, backend.clone());

        for _ in 0..3 {
            describe_email(&generator).await.unwrap();
        }
        assert_eq!(backend.calls(), 3);
        assert!(generator.metrics().await.circuit_breaker_open);

        let description = describe_email(&generator).await.unwrap();
        assert_eq!(description.business_name, "Email");
        assert_eq!(backend.calls(), 3);
        assert_eq!(generator.metrics().await.failed_requests, 4);

        tokio::time::advance(Duration::from_secs(61)).await;
        let description = describe_email(&generator).await.unwrap();
        assert_eq!(description.business_name, "Email Address");
        assert_eq!(backend.calls(), 4);
        assert!(!generator.metrics().await.circuit_breaker_open);
    }

    /// Backend that names the prompted field in its reply. Fields listed
    /// earlier in `slow_first` take longer to answer.
    struct EchoBackend {
        slow_first: Vec<&'static str>,
    }

    #[async_trait]
    impl CompletionBackend for EchoBackend {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<Completion, AiError> {
            let name = request
                .prompt
                .lines()
                .find_map(|line| line.strip_prefix("Field Name: "))
                .unwrap_or_default()
                .to_string();
            let rank = self
                .slow_first
                .iter()
                .position(|n| *n == name)
                .unwrap_or_default();
            let delay = self.slow_first.len() - rank;
            tokio::time::sleep(Duration::from_secs(delay as u64)).await;
            Ok(Completion::new(format!(
                "DESCRIPTION: Holds {name}.\nBUSINESS_NAME: {name} label"
            )))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_preserves_order() {
        let names = ["first_name", "last_name", "zip"];
        let backend = Arc::new(EchoBackend {
            slow_first: names.to_vec(),
        });
        let generator =
            DescriptionGenerator::with_backend(config().with_max_concurrent_requests(3), backend);

        let fields: Vec<ClassifiedField> = names
            .iter()
            .map(|name| classified(name, FieldType::String))
            .collect();

        let descriptions = generator.generate_batch(&fields).await;
        assert_eq!(descriptions.len(), fields.len());
        for (field, description) in fields.iter().zip(&descriptions) {
            assert_eq!(
                description.business_name,
                format!("{} label", field.field_name)
            );
            assert_eq!(
                description.description,
                format!("Holds {}.", field.field_name)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_durations_do_not_overflow() {
        let mut cfg: AiConfig = serde_json::from_str(
            r#"{"cache_ttl_secs": 18446744073709551615,
                "circuit_breaker_timeout_secs": 18446744073709551615,
                "circuit_breaker_threshold": 1,
                "max_attempts": 1}"#,
        )
        .unwrap();
        cfg = cfg.with_api_key("sk-test");
        assert!(cfg.validate().is_ok());

        let backend = ScriptedBackend::with_script(vec![
            Ok(Completion::new(REPLY)),
            Err(AiError::Server { status: 503 }),
        ]);
        let generator = DescriptionGenerator::with_backend(cfg, backend.clone());
        let total_samples = [json!(9.5)];
        let describe_total = || {
            generator.generate_description(
                "order.total",
                "total",
                FieldType::Float,
                Some(SemanticType::Currency),
                &total_samples,
            )
        };

        // Cached with a TTL past the clock's range.
        let described = describe_email(&generator).await.unwrap();
        assert_eq!(described.business_name, "Email Address");

        // Opens the breaker with a cooldown past the clock's range.
        assert_eq!(describe_total().await.unwrap().business_name, "Total");
        assert!(generator.metrics().await.circuit_breaker_open);

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(describe_email(&generator).await.unwrap(), described);
        assert_eq!(describe_total().await.unwrap().business_name, "Total");
        assert!(generator.metrics().await.circuit_breaker_open);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_batch_turns_auth_failure_into_fallback() {
        let backend =
            ScriptedBackend::with_script(vec![Err(AiError::Authentication { status: 401 })]);
        let generator = DescriptionGenerator::with_backend(
            config().with_max_concurrent_requests(1),
            backend,
        );
        let fields = vec![classified("order_total", FieldType::Float)];

        let descriptions = generator.generate_batch(&fields).await;
        assert_eq!(descriptions[0].business_name, "Order Total");
    }

    #[tokio::test]
    async fn test_reset_metrics_and_clear_cache() {
        let backend = ScriptedBackend::with_script(vec![]);
        let generator = DescriptionGenerator::with_backend(config(), backend);
        describe_email(&generator).await.unwrap();

        generator.clear_cache().await;
        generator.reset_metrics().await;
        let metrics = generator.metrics().await;
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.cache_size, 0);
    }

    #[tokio::test]
    async fn test_semantic_oracle() {
        let backend = ScriptedBackend::with_script(vec![
            Ok(Completion::new("email")),
            Ok(Completion::new("other")),
            Err(AiError::Client {
                status: 400,
                message: "nope".into(),
            }),
        ]);
        let generator = DescriptionGenerator::with_backend(config(), backend);
        let samples = [json!("x1"), json!("x2")];

        assert_eq!(
            generator.classify("contact", &samples, FieldType::String).await,
            Some(SemanticType::Email)
        );
        assert_eq!(
            generator.classify("blob", &samples, FieldType::String).await,
            None
        );
        assert_eq!(
            generator.classify("misc", &samples, FieldType::String).await,
            None
        );
    }

    #[tokio::test]
    async fn test_semantic_oracle_without_backend() {
        let generator = DescriptionGenerator::new(AiConfig::default()).unwrap();
        assert_eq!(
            generator.classify("contact", &[], FieldType::String).await,
            None
        );
    }
}
