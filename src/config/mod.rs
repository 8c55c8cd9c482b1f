//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/codeforge/config.toml)
//! 3. Project config (./codeforge.toml)
//! 4. Explicit `--config` file
//! 5. Environment variables (CODEFORGE_*)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
