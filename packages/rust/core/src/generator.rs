//! Content generator client (OpenAI-compatible chat completions).
//!
//! The generator is an opaque collaborator: its replies are untrusted text and
//! are repaired and parsed elsewhere. Only transport, auth and quota failures
//! surface from here, as [`PaperpageError::GeneratorUnavailable`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use paperpage_shared::{GeneratorSettings, PaperpageError, Result};

use crate::prompt::SYSTEM_PROMPT;

/// Bytes of an error body kept in the failure message.
const ERROR_BODY_EXCERPT: usize = 300;

/// Produces structured project metadata text from a prompt.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Model identifier, part of the generation cache key.
    fn model_id(&self) -> &str;

    /// Raw reply text for `prompt`. May be near-JSON.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible endpoint such as OpenRouter.
pub struct OpenRouterGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(settings: &GeneratorSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("paperpage/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| PaperpageError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl ContentGenerator for OpenRouterGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaperpageError::GeneratorUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let excerpt: String = text.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(PaperpageError::GeneratorUnavailable(format!(
                "HTTP {status}: {excerpt}"
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            PaperpageError::GeneratorUnavailable(format!("unreadable completion envelope: {e}"))
        })?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PaperpageError::GeneratorUnavailable("empty choices".into()))?
            .message
            .content
            .unwrap_or_default();

        debug!(reply_chars = text.len(), "generator replied");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: String) -> GeneratorSettings {
        GeneratorSettings {
            base_url,
            model: "test/model".into(),
            api_key: "sk-test".into(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test/model",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"title\":\"T\"}" } }]
            })))
            .mount(&server)
            .await;

        let generator = OpenRouterGenerator::new(&settings(server.uri())).unwrap();
        assert_eq!(generator.model_id(), "test/model");
        let text = generator.generate("prompt").await.unwrap();
        assert_eq!(text, r#"{"title":"T"}"#);
    }

    #[tokio::test]
    async fn quota_error_is_unavailable_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let generator = OpenRouterGenerator::new(&settings(server.uri())).unwrap();
        let err = generator.generate("prompt").await.unwrap_err();
        assert!(matches!(err, PaperpageError::GeneratorUnavailable(_)));
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_choices_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let generator = OpenRouterGenerator::new(&settings(server.uri())).unwrap();
        let err = generator.generate("prompt").await.unwrap_err();
        assert!(err.to_string().contains("empty choices"));
    }

    #[tokio::test]
    async fn null_content_is_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": null } }]
            })))
            .mount(&server)
            .await;

        let generator = OpenRouterGenerator::new(&settings(server.uri())).unwrap();
        assert_eq!(generator.generate("prompt").await.unwrap(), "");
    }
}
