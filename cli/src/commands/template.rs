// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Template inspection commands
//!
//! Commands: list, show

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use myserver_core::domain::template::{Template, TemplateClass, TemplateFileClass};

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// List every template found by the loaders
    List,

    /// Resolve a template and show its effective settings
    Show {
        /// Template name (`type:name@version`, `type:name` or `name`)
        #[arg(value_name = "TEMPLATE")]
        name: String,

        /// Print the merged configuration document as YAML
        #[arg(long)]
        config: bool,
    },
}

pub async fn handle_command(command: TemplateCommand, config_path: Option<PathBuf>) -> Result<()> {
    let myserver = super::open(config_path)?;
    let resolver = myserver.resolver();

    match command {
        TemplateCommand::List => {
            let templates = resolver
                .list_templates()
                .await
                .context("Failed to list templates")?;
            if templates.is_empty() {
                println!("{}", "No templates found".yellow());
                return Ok(());
            }

            println!("{} templates found:", templates.len());
            println!("{:<40} {}", "NAME", "DESCRIPTION");
            for definition in templates {
                println!(
                    "{:<40} {}",
                    definition.name.full().bold(),
                    definition.description.as_deref().unwrap_or("").dimmed()
                );
            }
            Ok(())
        }
        TemplateCommand::Show { name, config } => {
            let template = resolver.resolve(&name, TemplateClass::Any).await?;
            if config {
                print!("{}", serde_yaml::to_string(template.config())?);
                return Ok(());
            }
            show(&template);
            Ok(())
        }
    }
}

fn show(template: &Template) {
    let definition = template.definition();
    println!("{}", template.full_name().bold());
    if let Some(description) = &definition.description {
        println!("  {}", description);
    }
    println!("  Source: {}", definition.source.display());

    let lineage: Vec<String> = template.lineage().iter().map(|t| t.full_name()).collect();
    println!("  Lineage: {}", lineage.join(" <- "));

    if let Some(server) = template.server() {
        let settings = server.settings();
        println!();
        println!("{}", "Server:".bold());
        println!(
            "  Execute: {}",
            settings.execute.as_deref().unwrap_or("(not set)")
        );
        if let Some(artifact) = server.artifact() {
            println!("  Artifact: {}", artifact.key());
        }
        if !settings.start_commands.is_empty() {
            println!(
                "  Start commands: {} (after {:?})",
                settings.start_commands.join(", "),
                settings.start_delay
            );
        }
        println!(
            "  Stop commands: {} (kill after {:?})",
            settings.stop_commands.join(", "),
            settings.stop_wait
        );
    }

    if !template.tags().is_empty() {
        println!();
        println!("{}", "Tags:".bold());
        for (name, tag) in template.tags() {
            let mut line = format!("  {:<20} {:<8}", name, tag.tag_type.to_string());
            if let Some(default) = &tag.default_value {
                line.push_str(&format!(" default={}", default));
            }
            let options = tag.options();
            if !options.is_empty() {
                line.push_str(&format!(" [{}]", options.join("|")));
            }
            if tag.required {
                println!("{} {}", line, "required".red());
            } else {
                println!("{}", line);
            }
            if let Some(description) = &tag.description {
                println!("    {}", description.dimmed());
            }
        }
    }

    for (label, class) in [
        ("Static files:", TemplateFileClass::Static),
        ("Dynamic files:", TemplateFileClass::Dynamic),
    ] {
        let files = template.files(class);
        if !files.is_empty() {
            println!();
            println!("{}", label.bold());
            for file in files {
                println!("  {}", file.display());
            }
        }
    }
}
