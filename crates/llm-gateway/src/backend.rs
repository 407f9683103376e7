//! Provider adapter seam

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::types::{ContentPart, GenerateResponse, GenerationConfig};

/// One external inference service.
///
/// Adapters translate the normalized request into the provider's wire format
/// and map provider failures into [`ProviderError`] classes. They never retry;
/// retry policy lives in the router.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short label used in logs and metrics
    fn name(&self) -> &str;

    /// Run one completion with an explicit model and key
    async fn generate(
        &self,
        model: &str,
        key: &str,
        content: &[ContentPart],
        config: &GenerationConfig,
    ) -> Result<GenerateResponse, ProviderError>;

    /// Issue one minimal low-cost request to test a key
    async fn ping(&self, key: &str) -> Result<(), ProviderError>;
}
