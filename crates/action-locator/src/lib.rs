//! Self-healing element locators
//!
//! This crate keeps per-context element locators valid across layout changes:
//! - Persisted locator knowledge with best-effort cross-process merge
//! - Visibility validation against a live document
//! - Context verification before any heal is attempted
//! - Two-pass AI re-discovery (visual inventory, then locator map) routed
//!   through `llm-gateway`
//! - Simplification of over-specified locators against page markup

pub mod context;
pub mod document;
pub mod errors;
pub mod healer;
pub mod metrics;
pub mod prompt;
pub mod resolver;
pub mod response;
pub mod schema;
pub mod simplify;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod validator;

pub use context::{ContextProfile, ContextRegistry};
pub use document::{Document, MemoryDocument};
pub use errors::*;
pub use healer::{HealerSettings, HealingOrchestrator, SelfHealer};
pub use prompt::PromptBuilder;
pub use resolver::LocatorResolver;
pub use response::parse_locator_map;
pub use schema::{base_schema, KeySchema};
pub use simplify::{ComplexityLimits, LocatorSimplifier};
pub use snapshot::{clean_markup, PageSnapshot, SnapshotKind, SnapshotStore};
pub use store::KnowledgeStore;
pub use types::*;
pub use validator::LocatorValidator;
