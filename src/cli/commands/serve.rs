//! Serve Command
//!
//! Usage:
//!   codeforge serve [--host 127.0.0.1] [--port 8080]

use std::path::Path;

use crate::config::ConfigLoader;
use crate::server;
use crate::types::Result;

pub async fn run(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = ConfigLoader::load(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    server::serve(config).await
}
