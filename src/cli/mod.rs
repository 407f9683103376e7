pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod contexts;
pub mod dispatch;
pub mod env;
pub mod generate;
pub mod heal;
pub mod health;
pub mod metrics;
pub mod output;
pub mod runtime;
pub mod simplify;
pub mod store;

pub use app::run;
pub use context::CliContext;
pub use env::CliArgs;
