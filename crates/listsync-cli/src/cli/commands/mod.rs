//! CLI command handlers. Each command is in its own file.

mod add;
mod config;

pub use add::run_add;
pub use config::run_config;
