// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use myserver_core::domain::node_config::NodeConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file holding the defaults
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./myserver-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. MYSERVER_CONFIG_PATH: {}",
            std::env::var("MYSERVER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./myserver-config.yaml");
        println!("  4. ~/.myserver/config.yaml");
        println!();
    }

    println!("{}", "Folders:".bold());
    println!("  Templates: {}", config.folders.templates.display());
    println!("  Servers:   {}", config.folders.servers.display());
    println!("  Cache:     {}", config.folders.cache.display());
    println!();

    println!("{}", "Registrar:".bold());
    println!("  Listen: {}", config.registrar.ip_listen);
    println!(
        "  Ports:  {}..{}",
        config.registrar.port_start,
        u32::from(config.registrar.port_start) + u32::from(config.registrar.port_amount)
    );
    println!();

    let supervision = &config.supervision;
    println!("{}", "Supervision:".bold());
    println!("  Probe interval: {:?}", supervision.probe_interval());
    println!("  Probe timeout:  {:?}", supervision.probe_timeout());
    println!("  Build timeout:  {:?}", supervision.build_timeout());
    println!(
        "  Scan depth:     templates {}, servers {}",
        supervision.template_scan_depth, supervision.server_scan_depth
    );
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    NodeConfig::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
