//! locator-heal operator CLI
//!
//! Exposes modules for integration testing

pub mod cli;
pub mod config;
pub mod metrics;

pub use config::Config;
