//! Model backend abstraction and implementations.
//!
//! Defines the [`BackendGateway`] trait and two concrete implementations:
//! - **[`LocalBackend`]** — calls an LM-Studio-compatible server on
//!   localhost (OpenAI-shaped `/v1/chat/completions` and `/v1/models`).
//! - **[`CloudBackend`]** — calls a Together-compatible hosted endpoint
//!   with a bearer credential.
//!
//! Both take the same question/context/transcript triple, so switching
//! implementations never changes caller code. Every call is bounded by the
//! configured timeout; a hung endpoint surfaces as
//! [`BackendError::Unreachable`].
//!
//! # Retry Strategy
//!
//! At most one retry, and only for transient failures (network errors and
//! 5xx). Client errors (bad credentials, rate limits, malformed responses)
//! fail immediately. There is no failover between backend kinds: the
//! configured backend answers or the error is surfaced.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::json;

use crate::config::{BackendConfig, BackendKind};
use crate::error::BackendError;

const DEFAULT_LOCAL_MODEL: &str = "local-model";
const DEFAULT_CLOUD_MODEL: &str = "meta-llama/Llama-3-70b-chat-hf";
const MAX_ANSWER_TOKENS: u32 = 1000;

/// A language-model endpoint that can answer a question given the data
/// context and the conversation transcript.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Which configured kind this gateway is.
    fn kind(&self) -> BackendKind;

    /// Check reachability and list available model ids.
    async fn health(&self) -> Result<Vec<String>, BackendError>;

    /// Answer `question` against `context`, continuing `transcript`.
    async fn answer(
        &self,
        question: &str,
        context: &str,
        transcript: &str,
    ) -> Result<String, BackendError>;
}

/// Instantiate the gateway selected by the configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn BackendGateway>, BackendError> {
    match config.kind {
        BackendKind::Local => Ok(Box::new(LocalBackend::new(config)?)),
        BackendKind::Cloud => Ok(Box::new(CloudBackend::new(config)?)),
    }
}

/// Assemble the analyst prompt from question, context, and transcript.
fn build_prompt(question: &str, context: &str, transcript: &str) -> String {
    let mut prompt = String::from(
        "You are a professional data analyst. Based on the following data \
         context, answer the user's question with insights, patterns, and \
         actionable recommendations.\n",
    );
    if !context.is_empty() {
        prompt.push_str(&format!("\nData Context:\n{}\n", context));
    }
    if !transcript.is_empty() {
        prompt.push_str(&format!("\nConversation so far:\n{}\n", transcript));
    }
    prompt.push_str(&format!("\nUser Question: {}\n", question));
    prompt
}

fn chat_body(model: &str, prompt: &str) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": 0.7,
        "max_tokens": MAX_ANSWER_TOKENS,
        "stream": false,
    })
}

/// Extract the answer text from an OpenAI-shaped chat response.
fn parse_chat_response(body: &serde_json::Value) -> Result<String, BackendError> {
    body.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            BackendError::Malformed("response missing choices[0].message.content".to_string())
        })
}

/// Extract model ids from an OpenAI-shaped model-list response.
fn parse_models_response(body: &serde_json::Value) -> Result<Vec<String>, BackendError> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| BackendError::Malformed("response missing data array".to_string()))?;
    Ok(data
        .iter()
        .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
        .map(|s| s.to_string())
        .collect())
}

/// Classify a non-success HTTP status into the backend error taxonomy.
fn classify_status(
    kind: BackendKind,
    status: reqwest::StatusCode,
    body: &str,
) -> BackendError {
    match status.as_u16() {
        401 | 403 => BackendError::AuthenticationFailed,
        429 => BackendError::RateLimited,
        404 if kind == BackendKind::Local => BackendError::NoModelLoaded,
        s if status.is_server_error() => {
            BackendError::Unreachable(format!("HTTP {}: {}", s, truncate(body, 200)))
        }
        s => BackendError::Malformed(format!("HTTP {}: {}", s, truncate(body, 200))),
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BackendError::Unreachable(format!("HTTP client: {}", e)))
}

/// POST a chat request with the shared retry policy.
async fn post_chat(
    client: &reqwest::Client,
    kind: BackendKind,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    retries: u32,
) -> Result<String, BackendError> {
    // One retry at most, transient failures only.
    let retries = retries.min(1);
    let mut last_err = None;

    for attempt in 0..=retries {
        if attempt > 0 {
            debug!("retrying {} backend after transient failure", kind.as_str());
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| BackendError::Malformed(e.to_string()))?;
                    return parse_chat_response(&json);
                }
                let body_text = response.text().await.unwrap_or_default();
                let err = classify_status(kind, status, &body_text);
                if err.is_transient() && attempt < retries {
                    warn!("{} backend transient error: {}", kind.as_str(), err);
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                let err = BackendError::Unreachable(e.to_string());
                if attempt < retries {
                    warn!("{} backend network error: {}", kind.as_str(), e);
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| BackendError::Unreachable("retries exhausted".to_string())))
}

async fn get_models(
    client: &reqwest::Client,
    kind: BackendKind,
    url: &str,
    bearer: Option<&str>,
) -> Result<Vec<String>, BackendError> {
    let mut request = client.get(url);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::Unreachable(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(classify_status(kind, status, &body_text));
    }
    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| BackendError::Malformed(e.to_string()))?;
    parse_models_response(&json)
}

// ============ Local Backend ============

/// Gateway to an LM-Studio-compatible local server.
pub struct LocalBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    retries: u32,
}

impl LocalBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Ok(LocalBackend {
            base_url: config.local_url.trim_end_matches('/').to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string()),
            client: build_client(config.timeout_secs)?,
            retries: config.max_retries,
        })
    }
}

#[async_trait]
impl BackendGateway for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn health(&self) -> Result<Vec<String>, BackendError> {
        let models = get_models(
            &self.client,
            BackendKind::Local,
            &format!("{}/v1/models", self.base_url),
            None,
        )
        .await?;
        if models.is_empty() {
            return Err(BackendError::NoModelLoaded);
        }
        Ok(models)
    }

    async fn answer(
        &self,
        question: &str,
        context: &str,
        transcript: &str,
    ) -> Result<String, BackendError> {
        let prompt = build_prompt(question, context, transcript);
        let body = chat_body(&self.model, &prompt);
        post_chat(
            &self.client,
            BackendKind::Local,
            &format!("{}/v1/chat/completions", self.base_url),
            None,
            &body,
            self.retries,
        )
        .await
    }
}

// ============ Cloud Backend ============

/// Gateway to a Together-compatible hosted endpoint.
#[derive(Debug)]
pub struct CloudBackend {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
    retries: u32,
}

impl CloudBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(BackendError::AuthenticationFailed)?;
        Ok(CloudBackend {
            base_url: config.cloud_url.trim_end_matches('/').to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_CLOUD_MODEL.to_string()),
            api_key,
            client: build_client(config.timeout_secs)?,
            retries: config.max_retries,
        })
    }
}

#[async_trait]
impl BackendGateway for CloudBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    async fn health(&self) -> Result<Vec<String>, BackendError> {
        get_models(
            &self.client,
            BackendKind::Cloud,
            &format!("{}/models", self.base_url),
            Some(&self.api_key),
        )
        .await
    }

    async fn answer(
        &self,
        question: &str,
        context: &str,
        transcript: &str,
    ) -> Result<String, BackendError> {
        let prompt = build_prompt(question, context, transcript);
        let body = chat_body(&self.model, &prompt);
        post_chat(
            &self.client,
            BackendKind::Cloud,
            &format!("{}/chat/completions", self.base_url),
            Some(&self.api_key),
            &body,
            self.retries,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_context_and_transcript() {
        let prompt = build_prompt("trend?", "3 rows", "User: hi\nAssistant: hello");
        assert!(prompt.contains("Data Context:\n3 rows"));
        assert!(prompt.contains("Conversation so far:\nUser: hi"));
        assert!(prompt.contains("User Question: trend?"));
    }

    #[test]
    fn prompt_omits_empty_sections() {
        let prompt = build_prompt("hello?", "", "");
        assert!(!prompt.contains("Data Context:"));
        assert!(!prompt.contains("Conversation so far:"));
    }

    #[test]
    fn chat_response_parsing() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": " An answer. " } }]
        });
        assert_eq!(parse_chat_response(&body).unwrap(), "An answer.");

        let bad = json!({ "choices": [] });
        assert!(matches!(
            parse_chat_response(&bad),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn models_response_parsing() {
        let body = json!({ "data": [{ "id": "m1" }, { "id": "m2" }] });
        assert_eq!(parse_models_response(&body).unwrap(), vec!["m1", "m2"]);

        let bad = json!({ "models": [] });
        assert!(matches!(
            parse_models_response(&bad),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;
        assert!(matches!(
            classify_status(BackendKind::Cloud, StatusCode::UNAUTHORIZED, ""),
            BackendError::AuthenticationFailed
        ));
        assert!(matches!(
            classify_status(BackendKind::Cloud, StatusCode::TOO_MANY_REQUESTS, ""),
            BackendError::RateLimited
        ));
        assert!(matches!(
            classify_status(BackendKind::Local, StatusCode::NOT_FOUND, ""),
            BackendError::NoModelLoaded
        ));
        assert!(matches!(
            classify_status(BackendKind::Cloud, StatusCode::NOT_FOUND, ""),
            BackendError::Malformed(_)
        ));
        assert!(matches!(
            classify_status(BackendKind::Local, StatusCode::BAD_GATEWAY, ""),
            BackendError::Unreachable(_)
        ));
    }

    #[test]
    fn cloud_backend_requires_credential() {
        let config = BackendConfig {
            kind: BackendKind::Cloud,
            ..BackendConfig::default()
        };
        let err = CloudBackend::new(&config).unwrap_err();
        assert!(matches!(err, BackendError::AuthenticationFailed));
    }

    #[test]
    fn create_backend_respects_kind() {
        let config = BackendConfig::default();
        let gateway = create_backend(&config).unwrap();
        assert_eq!(gateway.kind(), BackendKind::Local);
    }
}
