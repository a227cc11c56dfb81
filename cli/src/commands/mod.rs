// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for MyServer CLI

pub mod config;
pub mod server;
pub mod template;

pub use self::config::ConfigCommand;
pub use self::server::ServerCommand;
pub use self::template::TemplateCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use myserver_core::domain::node_config::NodeConfig;
use myserver_core::MyServer;

/// Loads the node configuration and wires an orchestrator over it.
pub fn open(config_path: Option<PathBuf>) -> Result<MyServer> {
    let config = NodeConfig::load_or_default(config_path).context("Failed to load configuration")?;
    debug!(
        templates = ?config.folders.templates,
        servers = ?config.folders.servers,
        "Opening node"
    );
    MyServer::builder(config).build()
}
