use clap::Subcommand;

use super::config::ConfigArgs;
use super::contexts::ContextsArgs;
use super::generate::GenerateArgs;
use super::heal::HealArgs;
use super::simplify::SimplifyArgs;
use super::store::StoreArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Inspect the persisted locator knowledge
    Store(StoreArgs),

    /// List declared contexts and their expected element keys
    Contexts(ContextsArgs),

    /// Sweep provider health and report key pools
    Health,

    /// Send one prompt through the provider router
    Generate(GenerateArgs),

    /// Heal a context offline from a saved page snapshot
    Heal(HealArgs),

    /// Simplify locators against a markup file
    Simplify(SimplifyArgs),

    /// Show or validate configuration
    Config(ConfigArgs),

    /// Print the Prometheus metrics of this process
    Metrics,
}
