//! Deterministic backend for tests and dry runs

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::ModelBackend;
use crate::errors::ProviderError;
use crate::types::{ContentPart, GenerateResponse, GenerationConfig};

/// A recorded `generate` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub key: String,
    pub text: String,
    pub images: usize,
}

/// Backend that replays scripted outcomes and records every call.
///
/// Outcome precedence for `generate`: a per-key failure set with
/// [`ScriptedBackend::fail_key`], then the FIFO script, then the default.
pub struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<Result<GenerateResponse, ProviderError>>>,
    key_failures: Mutex<HashMap<String, ProviderError>>,
    default_outcome: Mutex<Result<GenerateResponse, ProviderError>>,
    ping_results: Mutex<HashMap<String, Result<(), ProviderError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    pings: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            key_failures: Mutex::new(HashMap::new()),
            default_outcome: Mutex::new(Err(ProviderError::Other(
                "no scripted response".to_string(),
            ))),
            ping_results: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            pings: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful text response
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.script
            .lock()
            .push_back(Ok(GenerateResponse::from_text(text)));
        self
    }

    /// Queue a failure
    pub fn push_error(&self, err: ProviderError) -> &Self {
        self.script.lock().push_back(Err(err));
        self
    }

    /// Every generate call with `key` fails with `err`
    pub fn fail_key(&self, key: impl Into<String>, err: ProviderError) -> &Self {
        self.key_failures.lock().insert(key.into(), err);
        self
    }

    /// Response used once the script is drained
    pub fn set_default_text(&self, text: impl Into<String>) -> &Self {
        *self.default_outcome.lock() = Ok(GenerateResponse::from_text(text));
        self
    }

    pub fn set_ping(&self, key: impl Into<String>, result: Result<(), ProviderError>) -> &Self {
        self.ping_results.lock().insert(key.into(), result);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn pinged_keys(&self) -> Vec<String> {
        self.pings.lock().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        model: &str,
        key: &str,
        content: &[ContentPart],
        _config: &GenerationConfig,
    ) -> Result<GenerateResponse, ProviderError> {
        let text = content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.calls.lock().push(RecordedCall {
            model: model.to_string(),
            key: key.to_string(),
            text,
            images: content.iter().filter(|part| part.is_image()).count(),
        });

        if let Some(err) = self.key_failures.lock().get(key) {
            return Err(err.clone());
        }
        if let Some(outcome) = self.script.lock().pop_front() {
            return outcome;
        }
        self.default_outcome.lock().clone()
    }

    async fn ping(&self, key: &str) -> Result<(), ProviderError> {
        self.pings.lock().push(key.to_string());
        self.ping_results
            .lock()
            .get(key)
            .cloned()
            .unwrap_or(Ok(()))
    }
}
