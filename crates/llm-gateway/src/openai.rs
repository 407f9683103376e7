//! OpenAI-compatible chat completions adapter
//!
//! Covers OpenAI itself and compatible endpoints such as ZhiPu GLM
//! (`https://open.bigmodel.cn/api/paas/v4`) or OpenRouter.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::backend::ModelBackend;
use crate::errors::ProviderError;
use crate::types::{ContentPart, GenerateResponse, GenerationConfig};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub name: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct OpenAiCompatBackend {
    client: Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatBackend {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ProviderError::Other(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(
        &self,
        model: &str,
        key: &str,
        content: &[ContentPart],
        config: &GenerationConfig,
    ) -> Result<GenerateResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base());
        let body = build_request(model, content, config);

        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::from_transport(&err))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            if status.as_u16() == 429 {
                warn!(
                    target: "openai",
                    provider = %self.config.name,
                    message = %rate_limit_message(&text),
                    "rate limited generate request"
                );
            }
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }

        let payload: JsonValue = response
            .json()
            .await
            .map_err(|err| ProviderError::Other(format!("{} response invalid: {err}", self.config.name)))?;
        let parsed: ChatCompletionResponse = serde_json::from_value(payload.clone())
            .map_err(|err| ProviderError::Other(format!("{} response invalid: {err}", self.config.name)))?;
        let text = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .and_then(ChatCompletionContent::as_text)
            .unwrap_or_default();
        Ok(GenerateResponse::new(text, payload))
    }

    async fn ping(&self, key: &str) -> Result<(), ProviderError> {
        let url = format!("{}/models", self.base());
        let response = self
            .client
            .get(&url)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|err| ProviderError::from_transport(&err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), &text))
    }
}

fn build_request(model: &str, content: &[ContentPart], config: &GenerationConfig) -> ChatCompletionRequest {
    let parts = content
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => ChatPart::Text { text: text.clone() },
            ContentPart::Image { mime_type, data } => ChatPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{mime_type};base64,{}", Base64.encode(data)),
                },
            },
        })
        .collect();
    ChatCompletionRequest {
        model: model.to_string(),
        temperature: config.temperature,
        max_tokens: config.max_output_tokens,
        response_format: config.structured_output.then(|| ResponseFormat {
            r#type: "json_object".to_string(),
        }),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: parts,
        }],
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<ChatCompletionContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionPart>),
}

impl ChatCompletionContent {
    fn as_text(&self) -> Option<String> {
        match self {
            ChatCompletionContent::Text(value) => Some(value.clone()),
            ChatCompletionContent::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|part| part.text.as_ref())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: Option<String>,
}

fn rate_limit_message(raw: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(raw)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .map(|message| format!("rate limit exceeded: {}", message.trim()))
        .unwrap_or_else(|| "rate limit exceeded".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_encodes_image_as_data_url() {
        let content = vec![ContentPart::text("look"), ContentPart::png(vec![0xff])];
        let body = serde_json::to_value(build_request(
            "glm-4v",
            &content,
            &GenerationConfig::default().structured(),
        ))
        .unwrap();
        assert_eq!(body["model"], "glm-4v");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,/w=="
        );
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn parts_content_is_flattened() {
        let parsed: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}}]
        }))
        .unwrap();
        let text = parsed.choices[0]
            .message
            .content
            .as_ref()
            .and_then(ChatCompletionContent::as_text);
        assert_eq!(text.as_deref(), Some("a\nb"));
    }

    #[test]
    fn rate_limit_message_prefers_provider_text() {
        let raw = r#"{"error":{"message":" quota exceeded "}}"#;
        assert_eq!(rate_limit_message(raw), "rate limit exceeded: quota exceeded");
        assert_eq!(rate_limit_message("nope"), "rate limit exceeded");
    }
}
