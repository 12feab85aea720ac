//! Runtime configuration for parsers and the description client.
//!
//! All knobs have conservative defaults. Builder methods clamp out-of-range
//! values and log a warning; [`SurveyConfig::validate`] rejects configurations
//! loaded from disk that were never passed through the builders.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

/// Default base URL of the chat completion API.
pub const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";

/// Validation errors for configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("max_samples must be greater than 0")]
    InvalidMaxSamples,
    #[error("max_depth must be between 1 and 128, got {0}")]
    InvalidMaxDepth(usize),
    #[error("max_sample_values must be greater than 0")]
    InvalidSampleValues,
    #[error("{0} timeout must be greater than 0 seconds")]
    InvalidTimeout(&'static str),
    #[error("max_file_size_bytes must be greater than 0")]
    InvalidFileSize,
    #[error("attribute_prefix must not be empty")]
    EmptyAttributePrefix,
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    InvalidTemperature(f32),
    #[error("max_concurrent_requests must be greater than 0")]
    InvalidConcurrency,
    #[error("max_attempts must be greater than 0")]
    InvalidRetryAttempts,
    #[error("retry wait bounds are inverted: min {min}s > max {max}s")]
    InvalidRetryWait { min: u64, max: u64 },
    #[error("circuit_breaker_threshold must be greater than 0")]
    InvalidBreakerThreshold,
    #[error("cache_max_size must be greater than 0 when the cache is enabled")]
    InvalidCacheSize,
    #[error("base_url is not a valid URL: {0}")]
    InvalidBaseUrl(String),
}

/// Limits shared by all parsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Records (or rows per column) sampled per parse
    pub max_samples: usize,
    /// Maximum nesting depth analyzed for hierarchical formats
    pub max_depth: usize,
    /// Unique sample values retained per field
    pub max_sample_values: usize,
    /// Items inspected in each array
    pub array_sample_items: usize,
    /// Wall-clock budget for a full parse of non-XML formats
    pub parse_timeout_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_samples: 1000,
            max_depth: 10,
            max_sample_values: 10,
            array_sample_items: 10,
            parse_timeout_secs: 300,
        }
    }
}

impl ParserConfig {
    /// Creates a new parser config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the record sample cap.
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        if max_samples == 0 {
            tracing::warn!("max_samples 0 clamped to 1");
        }
        self.max_samples = max_samples.max(1);
        self
    }

    /// Builder method to set the nesting depth limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        if !(1..=128).contains(&max_depth) {
            tracing::warn!("max_depth {} clamped to valid range [1, 128]", max_depth);
        }
        self.max_depth = max_depth.clamp(1, 128);
        self
    }

    /// Builder method to set the parse budget.
    pub fn with_parse_timeout(mut self, timeout: Duration) -> Self {
        self.parse_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Wall-clock budget for a full parse.
    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_samples == 0 {
            return Err(ConfigValidationError::InvalidMaxSamples);
        }
        if !(1..=128).contains(&self.max_depth) {
            return Err(ConfigValidationError::InvalidMaxDepth(self.max_depth));
        }
        if self.max_sample_values == 0 || self.array_sample_items == 0 {
            return Err(ConfigValidationError::InvalidSampleValues);
        }
        if self.parse_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout("parse"));
        }
        Ok(())
    }
}

/// XML-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XmlConfig {
    /// Files larger than this are rejected before parsing
    pub max_file_size_bytes: u64,
    /// Elements inspected while detecting the record element
    pub structure_sample_elements: usize,
    pub structure_timeout_secs: u64,
    pub dtd_timeout_secs: u64,
    pub parse_timeout_secs: u64,
    /// Drop namespace prefixes from element and attribute names
    pub strip_namespaces: bool,
    /// Marker prepended to attribute names in field paths
    pub attribute_prefix: String,
}

impl Default for XmlConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 100 * 1024 * 1024,
            structure_sample_elements: 100,
            structure_timeout_secs: 30,
            dtd_timeout_secs: 30,
            parse_timeout_secs: 300,
            strip_namespaces: true,
            attribute_prefix: "@".to_string(),
        }
    }
}

impl XmlConfig {
    /// Creates a new XML config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the file size ceiling.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        if bytes == 0 {
            tracing::warn!("max_file_size_bytes 0 clamped to 1");
        }
        self.max_file_size_bytes = bytes.max(1);
        self
    }

    /// Builder method to set the full parse budget.
    pub fn with_parse_timeout(mut self, timeout: Duration) -> Self {
        self.parse_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Builder method to keep or strip namespace prefixes.
    pub fn with_strip_namespaces(mut self, strip: bool) -> Self {
        self.strip_namespaces = strip;
        self
    }

    /// Builder method to set the attribute marker.
    pub fn with_attribute_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if prefix.is_empty() {
            tracing::warn!("Empty attribute_prefix replaced with '@'");
            self.attribute_prefix = "@".to_string();
        } else {
            self.attribute_prefix = prefix;
        }
        self
    }

    pub fn structure_timeout(&self) -> Duration {
        Duration::from_secs(self.structure_timeout_secs)
    }

    pub fn dtd_timeout(&self) -> Duration {
        Duration::from_secs(self.dtd_timeout_secs)
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_file_size_bytes == 0 {
            return Err(ConfigValidationError::InvalidFileSize);
        }
        if self.structure_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout("structure detection"));
        }
        if self.dtd_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout("DTD extraction"));
        }
        if self.parse_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout("XML parse"));
        }
        if self.attribute_prefix.is_empty() {
            return Err(ConfigValidationError::EmptyAttributePrefix);
        }
        Ok(())
    }
}

/// Description backend and resilience settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// API key; never serialized or logged
    #[serde(skip)]
    pub api_key: Option<Zeroizing<String>>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub cache_max_size: usize,
    pub max_concurrent_requests: usize,
    pub max_attempts: u32,
    pub retry_min_wait_secs: u64,
    pub retry_max_wait_secs: u64,
    pub retry_multiplier: u32,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout_secs: u64,
    /// Ask the backend to classify fields the pattern detector cannot
    pub use_ai_semantics: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_AI_BASE_URL.to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 150,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            cache_enabled: true,
            cache_ttl_secs: 3600,
            cache_max_size: 1000,
            max_concurrent_requests: 5,
            max_attempts: 3,
            retry_min_wait_secs: 1,
            retry_max_wait_secs: 10,
            retry_multiplier: 2,
            circuit_breaker_threshold: 3,
            circuit_breaker_timeout_secs: 60,
            use_ai_semantics: false,
        }
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_max_size", &self.cache_max_size)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("max_attempts", &self.max_attempts)
            .field("circuit_breaker_threshold", &self.circuit_breaker_threshold)
            .field(
                "circuit_breaker_timeout_secs",
                &self.circuit_breaker_timeout_secs,
            )
            .field("use_ai_semantics", &self.use_ai_semantics)
            .finish_non_exhaustive()
    }
}

impl AiConfig {
    /// Creates a new AI config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.trim().is_empty()
        {
            config.api_key = Some(Zeroizing::new(key));
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.model = model;
        }
        config
    }

    /// True when an API key is configured.
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    /// Builder method to set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(Zeroizing::new(key.into()));
        self
    }

    /// Builder method to set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method to set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builder method to set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        if !(0.0..=2.0).contains(&temperature) {
            tracing::warn!(
                "temperature {} clamped to valid range [0.0, 2.0]",
                temperature
            );
        }
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Builder method to enable or disable the response cache.
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Builder method to set the cache entry lifetime.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Builder method to set the cache capacity.
    pub fn with_cache_max_size(mut self, size: usize) -> Self {
        if size == 0 {
            tracing::warn!("cache_max_size 0 clamped to 1");
        }
        self.cache_max_size = size.max(1);
        self
    }

    /// Builder method to set the in-flight request limit.
    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        if limit == 0 {
            tracing::warn!("max_concurrent_requests 0 clamped to 1");
        }
        self.max_concurrent_requests = limit.max(1);
        self
    }

    /// Builder method to set the retry attempt bound.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        if attempts == 0 {
            tracing::warn!("max_attempts 0 clamped to 1");
        }
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder method to set the breaker threshold and cooldown.
    pub fn with_circuit_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        if threshold == 0 {
            tracing::warn!("circuit_breaker_threshold 0 clamped to 1");
        }
        self.circuit_breaker_threshold = threshold.max(1);
        self.circuit_breaker_timeout_secs = cooldown.as_secs();
        self
    }

    /// Builder method to enable AI semantic classification.
    pub fn with_ai_semantics(mut self, enabled: bool) -> Self {
        self.use_ai_semantics = enabled;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigValidationError::InvalidTemperature(self.temperature));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout("request"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigValidationError::InvalidConcurrency);
        }
        if self.max_attempts == 0 {
            return Err(ConfigValidationError::InvalidRetryAttempts);
        }
        if self.retry_min_wait_secs > self.retry_max_wait_secs {
            return Err(ConfigValidationError::InvalidRetryWait {
                min: self.retry_min_wait_secs,
                max: self.retry_max_wait_secs,
            });
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(ConfigValidationError::InvalidBreakerThreshold);
        }
        if self.cache_enabled && self.cache_max_size == 0 {
            return Err(ConfigValidationError::InvalidCacheSize);
        }
        if let Err(e) = url::Url::parse(&self.base_url) {
            return Err(ConfigValidationError::InvalidBaseUrl(e.to_string()));
        }
        Ok(())
    }
}

/// Top-level configuration aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    pub parser: ParserConfig,
    pub xml: XmlConfig,
    pub ai: AiConfig,
}

impl SurveyConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::SurveyError::io(format!("Failed to read config {}", path.display()), e)
        })?;
        let config: SurveyConfig = serde_json::from_str(&content)
            .map_err(|e| crate::SurveyError::serialization("Invalid configuration file", e))?;
        config
            .validate()
            .map_err(|e| crate::SurveyError::configuration(e.to_string()))?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.parser.validate()?;
        self.xml.validate()?;
        self.ai.validate()
    }
}
