//! Text-generation backends.
//!
//! [`CompletionBackend`] is the seam between the description generator and
//! the provider. [`OpenAiBackend`] speaks the OpenAI-compatible
//! `chat/completions` protocol; tests substitute scripted backends.

use super::error::AiError;
use crate::config::AiConfig;
use crate::{Result, SurveyError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

/// One chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Generated text plus usage.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
        }
    }
}

/// A provider able to complete a chat prompt.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Sends one request. Implementations must not retry internally.
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<Completion, AiError>;
}

/// Backend for OpenAI-compatible chat completion endpoints.
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Zeroizing<String>,
    request_timeout: Duration,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"****")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl OpenAiBackend {
    /// Builds a backend from `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no API key is set or the HTTP client
    /// cannot be constructed.
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| SurveyError::configuration("No API key configured"))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| SurveyError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            request_timeout: config.request_timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, error: reqwest::Error) -> AiError {
        if error.is_timeout() {
            AiError::Timeout(self.request_timeout)
        } else {
            AiError::Connection(error.to_string())
        }
    }
}

/// Maps a non-success status onto the error taxonomy.
fn status_error(status: StatusCode, retry_after: Option<Duration>, body: String) -> AiError {
    match status.as_u16() {
        401 | 403 => AiError::Authentication {
            status: status.as_u16(),
        },
        429 => AiError::RateLimited { retry_after },
        code if status.is_server_error() => AiError::Server { status: code },
        code => AiError::Client {
            status: code,
            message: body.chars().take(200).collect(),
        },
    }
}

/// Reads a delay-seconds `Retry-After` header.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<Completion, AiError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, text));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AiError::Timeout(self.request_timeout)
            } else {
                AiError::InvalidResponse(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AiError::InvalidResponse("response contained no choices".into()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(Completion { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_requires_api_key() {
        let err = OpenAiBackend::new(&AiConfig::default()).unwrap_err();
        assert!(matches!(err, SurveyError::Configuration { .. }));
    }

    #[test]
    fn test_endpoint_and_redacted_debug() {
        let config = AiConfig::default()
            .with_api_key("sk-secret")
            .with_base_url("http://localhost:8080/v1/");
        let backend = OpenAiBackend::new(&config).unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert!(!format!("{backend:?}").contains("sk-secret"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, String::new()),
            AiError::Authentication { status: 401 }
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, String::new()),
            AiError::Authentication { status: 403 }
        ));
        assert!(matches!(
            status_error(
                StatusCode::TOO_MANY_REQUESTS,
                Some(Duration::from_secs(3)),
                String::new()
            ),
            AiError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, None, String::new()),
            AiError::Server { status: 502 }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, None, "context too long".into()),
            AiError::Client { status: 400, ref message } if message == "context too long"
        ));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            temperature: 0.5,
            max_tokens: 20,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_tokens"], 20);
    }

    #[test]
    fn test_response_deserialization() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"DESCRIPTION: x"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("DESCRIPTION: x")
        );
        assert_eq!(parsed.usage.unwrap().total_tokens, 15);
    }
}
