//! Multi-provider LLM gateway
//!
//! This crate routes one logical "generate" request across several external
//! model providers with:
//! - Process-wide provider and API-key health tracking with sampled pings
//! - Health-ordered provider selection
//! - Per-usage model chains with downgrade on failure
//! - Pool-wide round-robin key rotation with error-class specific eviction
//!   and backoff

pub mod backend;
pub mod config;
pub mod errors;
pub mod gemini;
pub mod health;
pub mod metrics;
pub mod mock;
pub mod openai;
pub mod router;
pub mod types;

pub use backend::ModelBackend;
pub use config::{GatewayConfig, GatewayConfigError, ProviderConfig, ProviderKind};
pub use errors::{ErrorClass, ProviderError, RouterError};
pub use health::{HealthMonitor, HealthSettings, KeyStatus, ProviderHandle, ProviderHealth};
pub use mock::ScriptedBackend;
pub use router::{BackoffPolicy, ModelChains, ProviderRouter};
pub use types::*;
