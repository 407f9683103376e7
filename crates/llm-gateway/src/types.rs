//! Request/response types shared by every provider adapter

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Usage-context used when a caller does not name one.
pub const DEFAULT_USAGE_CONTEXT: &str = "default";

/// One segment of a generate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    /// Plain prompt text
    Text(String),

    /// Inline binary image payload (e.g. a PNG screenshot)
    Image { mime_type: String, data: Vec<u8> },
}

impl ContentPart {
    pub fn text(value: impl Into<String>) -> Self {
        ContentPart::Text(value.into())
    }

    pub fn png(data: Vec<u8>) -> Self {
        ContentPart::Image {
            mime_type: "image/png".to_string(),
            data,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::Image { .. })
    }
}

/// Generation options understood by all adapters.
///
/// Every field is optional; adapters omit what is unset so the provider
/// default applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Ask the provider for a JSON object response
    #[serde(default)]
    pub structured_output: bool,

    /// Upper bound on output tokens
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn structured(mut self) -> Self {
        self.structured_output = true;
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }
}

/// Normalized result returned by every adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    /// Concatenated text of the first candidate
    pub text: String,

    /// Provider payload as received, for diagnostics
    pub raw_payload: JsonValue,
}

impl GenerateResponse {
    pub fn new(text: impl Into<String>, raw_payload: JsonValue) -> Self {
        Self {
            text: text.into(),
            raw_payload,
        }
    }

    /// Text-only response without a provider payload
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text, JsonValue::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// How a provider exposes models and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ProviderMode {
    /// A pool of keys sharing one quota family, serving a chain of models
    MultiKey,

    /// One key bound to one fixed model
    SingleKey { model: String },
}

impl ProviderMode {
    pub fn is_multi_key(&self) -> bool {
        matches!(self, ProviderMode::MultiKey)
    }
}
