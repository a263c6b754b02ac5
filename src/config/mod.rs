mod cli;
#[allow(clippy::module_inception)]
mod config;
pub mod rules;
pub mod targets;
pub mod types;

pub use cli::{CliConfig, Overrides};
pub use config::Config;
pub use rules::{AttributeRule, SyntaxRule};
pub use targets::{GatewayConfig, TargetRecord, TargetsConfig, TargetsError};
pub use types::{KeepAlive, Limits, LogLevel};
