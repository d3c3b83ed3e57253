//! Settings come from a TOML file plus `TOKENVAULT__*` environment overrides.
//! See `bin/settings_demo.rs` for a binary that prints what gets loaded.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
