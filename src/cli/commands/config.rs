//! Config Command
//!
//! Usage:
//!   codeforge config show [--json]
//!   codeforge config path
//!   codeforge config init [--force]

use std::path::Path;

use crate::cli::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Print the merged effective configuration
pub fn show(config_path: Option<&Path>, as_json: bool) -> Result<()> {
    ConfigLoader::show_config(config_path, as_json)
}

/// Print configuration file locations
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Write the default global configuration file
pub fn init(force: bool) -> Result<()> {
    let config_path = ConfigLoader::init_global(force)?;
    Output::new().success(&format!(
        "Global configuration at {}",
        config_path.display()
    ));
    Ok(())
}
