// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Placeholder Templater
//!
//! Substitutes `{{ NAME }}` placeholders in configuration files and start
//! commands. Values may themselves contain placeholders, so substitution is
//! repeated until the text stops changing.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Render instance variables into worker files and commands
//! - **Integration:** Server tags and instance identity → rendered files
//!
//! # Rules
//!
//! - Whitespace inside the braces is ignored: `{{ a }}` equals `{{a}}`.
//! - Placeholders without a bound variable stay in the output verbatim.
//! - At most [`MAX_PASSES`] passes are made; a text that is still changing
//!   after that is treated as a substitution cycle.
//!
//! # Usage
//!
//! ```ignore
//! let templater = Templater::new()
//!     .with_var("SERVER_PORT", "25565")
//!     .with_var("motd", "Welcome to {{SERVER_NAME}}");
//! let rendered = templater.render("server-port={{ SERVER_PORT }}")?;
//! ```

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::LazyLock;
use thiserror::Error;

use crate::domain::server::ServerError;

/// Upper bound on substitution passes over one text.
pub const MAX_PASSES: usize = 20;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^}\s]+)\s*\}\}").expect("placeholder pattern is a valid regex")
});

#[derive(Debug, Error)]
pub enum TemplaterError {
    #[error("Too many substitution passes while rendering: {0}")]
    TooManyPasses(String),

    #[error("I/O error while rendering: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TemplaterError> for ServerError {
    fn from(err: TemplaterError) -> Self {
        match err {
            TemplaterError::Io(io) => ServerError::Io(io),
            other => ServerError::Render(other.to_string()),
        }
    }
}

// ============================================================================
// Templater
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Templater {
    vars: HashMap<String, String>,
}

impl Templater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Renders one text.
    pub fn render(&self, input: &str) -> Result<String, TemplaterError> {
        let mut current = input.to_string();
        for _ in 0..MAX_PASSES {
            let mut substituted = false;
            let next = PLACEHOLDER.replace_all(&current, |caps: &Captures<'_>| {
                match self.vars.get(&caps[1]) {
                    Some(value) => {
                        substituted = true;
                        value.clone()
                    }
                    None => caps[0].to_string(),
                }
            });
            if !substituted {
                return Ok(current);
            }
            current = next.into_owned();
        }
        Err(TemplaterError::TooManyPasses(input.to_string()))
    }

    /// Renders `reader` line by line into `writer`.
    pub fn render_stream<R: BufRead, W: Write>(
        &self,
        reader: R,
        mut writer: W,
    ) -> Result<(), TemplaterError> {
        for line in reader.lines() {
            let rendered = self.render(&line?)?;
            writer.write_all(rendered.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}
