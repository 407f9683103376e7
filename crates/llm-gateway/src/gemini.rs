//! Gemini `generateContent` adapter (multi-key, multi-model)

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::backend::ModelBackend;
use crate::errors::ProviderError;
use crate::types::{ContentPart, GenerateResponse, GenerationConfig};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub name: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            name: "gemini".to_string(),
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
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
impl ModelBackend for GeminiBackend {
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
        let url = format!("{}/models/{}:generateContent", self.base(), model);
        let body = build_request(content, config);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
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
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }

        let payload: JsonValue = response
            .json()
            .await
            .map_err(|err| ProviderError::Other(format!("gemini response invalid: {err}")))?;
        let parsed: GeminiResponse = serde_json::from_value(payload.clone())
            .map_err(|err| ProviderError::Other(format!("gemini response invalid: {err}")))?;
        Ok(GenerateResponse::new(parsed.first_text(), payload))
    }

    async fn ping(&self, key: &str) -> Result<(), ProviderError> {
        let url = format!("{}/models?pageSize=1", self.base());
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", key)
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

fn build_request(content: &[ContentPart], config: &GenerationConfig) -> GeminiRequest {
    let parts = content
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => GeminiPart::Text { text: text.clone() },
            ContentPart::Image { mime_type, data } => GeminiPart::InlineData {
                inline_data: GeminiBlob {
                    mime_type: mime_type.clone(),
                    data: Base64.encode(data),
                },
            },
        })
        .collect();
    GeminiRequest {
        contents: vec![GeminiContent {
            role: "user".to_string(),
            parts,
        }],
        generation_config: GeminiGenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            response_mime_type: config
                .structured_output
                .then(|| "application/json".to_string()),
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiBlob },
}

#[derive(Debug, Serialize)]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    fn first_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}
