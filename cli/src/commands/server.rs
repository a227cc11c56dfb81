// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server instance commands
//!
//! Commands: list, create, info, tag, destroy, run

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::{ColoredString, Colorize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use myserver_core::application::ServerInstance;
use myserver_core::domain::events::ServerEvent;
use myserver_core::domain::server::{ServerError, ServerStatus};
use myserver_core::MyServer;

#[derive(Subcommand)]
pub enum ServerCommand {
    /// List server instances
    List,

    /// Create a server from a template
    Create {
        /// Server name
        #[arg(value_name = "NAME")]
        name: String,

        /// Template to instantiate
        #[arg(short, long, value_name = "TEMPLATE")]
        template: String,
    },

    /// Show a server's details
    Info {
        /// Server name or UUID
        #[arg(value_name = "SERVER")]
        server: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show, set or reset a tag
    Tag {
        /// Server name or UUID
        #[arg(value_name = "SERVER")]
        server: String,

        /// Tag name
        #[arg(value_name = "TAG")]
        tag: String,

        /// New value
        #[arg(value_name = "VALUE", conflicts_with = "reset")]
        value: Option<String>,

        /// Remove the override and fall back to the template default
        #[arg(long)]
        reset: bool,
    },

    /// Delete a server and its files
    Destroy {
        /// Server name or UUID
        #[arg(value_name = "SERVER")]
        server: String,

        /// Destroy even while the server is running
        #[arg(long)]
        force: bool,
    },

    /// Start a server and supervise it in the foreground
    Run {
        /// Server name or UUID
        #[arg(value_name = "SERVER")]
        server: String,
    },
}

pub async fn handle_command(command: ServerCommand, config_path: Option<PathBuf>) -> Result<()> {
    let myserver = super::open(config_path)?;

    match command {
        ServerCommand::List => list(&myserver).await,
        ServerCommand::Create { name, template } => create(&myserver, &name, &template).await,
        ServerCommand::Info { server, json } => info(&myserver, &server, json).await,
        ServerCommand::Tag {
            server,
            tag,
            value,
            reset,
        } => self::tag(&myserver, &server, &tag, value, reset).await,
        ServerCommand::Destroy { server, force } => destroy(&myserver, &server, force).await,
        ServerCommand::Run { server } => run(&myserver, &server).await,
    }
}

fn colored_status(status: ServerStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        ServerStatus::Started => label.green(),
        ServerStatus::Init | ServerStatus::Starting | ServerStatus::Stopping => label.yellow(),
        ServerStatus::Error => label.red(),
        ServerStatus::Stopped | ServerStatus::Unknown => label.dimmed(),
    }
}

async fn list(myserver: &MyServer) -> Result<()> {
    let mut servers = myserver.servers().list().await;
    if servers.is_empty() {
        println!("{}", "No servers found".yellow());
        return Ok(());
    }
    servers.sort_by_key(|server| server.name());

    println!("{} servers found:", servers.len());
    println!("{:<38} {:<20} {:<10} {}", "ID", "NAME", "STATUS", "TEMPLATE");
    for server in servers {
        println!(
            "{:<38} {:<20} {:<10} {}",
            server.uuid(),
            server.name().bold(),
            colored_status(server.status()),
            server.template().full_name()
        );
    }
    Ok(())
}

async fn create(myserver: &MyServer, name: &str, template: &str) -> Result<()> {
    let server = myserver
        .create_server(name, template)
        .await
        .with_context(|| format!("Failed to create server {}", name))?;
    println!(
        "{}",
        format!(
            "✓ Server {} created from {} ({})",
            server.name(),
            server.template().full_name(),
            server.uuid()
        )
        .green()
    );
    Ok(())
}

async fn info(myserver: &MyServer, id: &str, json: bool) -> Result<()> {
    let server = myserver.servers().get(id).await?;
    let info = server.info();
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", info.name.bold());
    println!("  ID:       {}", info.uuid);
    println!("  Template: {}", info.template);
    println!("  Status:   {}", colored_status(info.status));
    println!("  Path:     {}", info.path.display());
    if let Some(endpoint) = &info.endpoint {
        println!("  Endpoint: {}:{}", endpoint.ip, endpoint.port);
    }

    if !info.tags.is_empty() {
        println!();
        println!("{}", "Tags:".bold());
        for (name, value) in &info.tags {
            let marker = if server.tag(name).is_some() { "" } else { " (default)" };
            println!("  {:<20} {}{}", name, value, marker.dimmed());
        }
    }
    let missing: Vec<&String> = server
        .template()
        .tags()
        .iter()
        .filter(|(name, tag)| tag.required && !info.tags.contains_key(*name))
        .map(|(name, _)| name)
        .collect();
    for name in missing {
        println!("  {:<20} {}", name, "required, not set".red());
    }

    if !info.permissions.is_empty() {
        println!();
        println!("{}", "Permissions:".bold());
        for (permission, principals) in &info.permissions {
            println!("  {:<20} {}", permission, principals.join(", "));
        }
    }
    Ok(())
}

async fn tag(
    myserver: &MyServer,
    id: &str,
    name: &str,
    value: Option<String>,
    reset: bool,
) -> Result<()> {
    let server = myserver.servers().get(id).await?;

    if reset {
        if server.reset_tag(name)? {
            println!("{}", format!("✓ Tag {} reset", name).green());
        } else {
            println!("{}", format!("Tag {} has no override", name).yellow());
        }
        return Ok(());
    }

    match value {
        Some(value) => {
            server.set_tag(name, &value)?;
            println!("{}", format!("✓ {} = {}", name, value).green());
        }
        None => {
            let definition = server
                .template()
                .tag(name)
                .ok_or_else(|| ServerError::InvalidServer(format!("Unknown tag: {}", name)))?;
            println!("{} = {}", name.bold(), server.tag_or(name, "(not set)"));
            println!("  {}", definition.describe().dimmed());
            let options = definition.options();
            if !options.is_empty() {
                println!("  Options: {}", options.join(", "));
            }
        }
    }
    Ok(())
}

async fn destroy(myserver: &MyServer, id: &str, force: bool) -> Result<()> {
    let server = myserver.servers().get(id).await?;
    if server.status().is_active() && !force {
        anyhow::bail!(
            "Server {} is {}; stop it first or pass --force",
            server.name(),
            server.status()
        );
    }
    myserver.servers().destroy(&server).await?;
    println!("{}", format!("✓ Server {} destroyed", server.name()).green());
    Ok(())
}

/// Starts the server, streams its console and forwards stdin lines as
/// commands. Ctrl-C requests a graceful stop; returns once the server is
/// STOPPED.
async fn run(myserver: &MyServer, id: &str) -> Result<()> {
    let server = myserver.servers().get(id).await?;
    let mut console = myserver.events().subscribe_server(server.name());
    let mut status = server.subscribe_status();

    println!("{}", format!("Starting {}...", server.name()).dimmed());
    server.start().await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = console.recv() => {
                if let Ok(ServerEvent::ConsoleOutput { line, .. }) = event {
                    println!("{}", line);
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("{}", format!("[{}] {}", server.name(), colored_status(current)).bold());
                match current {
                    ServerStatus::Stopped => break,
                    ServerStatus::Error => anyhow::bail!("Server {} failed", server.name()),
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                request_stop(&server).await;
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if !line.trim().is_empty() => {
                        if let Err(e) = server.send_command(line.trim()).await {
                            eprintln!("{}", e.to_string().red());
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }
        }
    }

    println!("{}", format!("✓ Server {} stopped", server.name()).green());
    Ok(())
}

async fn request_stop(server: &Arc<ServerInstance>) {
    match server.stop().await {
        Ok(()) => println!("{}", "Stopping...".dimmed()),
        Err(ServerError::InvalidState(reason)) => {
            println!("{}", format!("Cannot stop yet: {}", reason).yellow())
        }
        Err(e) => eprintln!("{}", format!("Stop failed: {}", e).red()),
    }
}
