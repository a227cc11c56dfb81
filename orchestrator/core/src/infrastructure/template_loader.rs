// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Local Template Loader
//!
//! Loads template definitions from a directory tree. Every directory that
//! contains a `template.yml` is one template; its `files/` subdirectory
//! holds the files the template contributes to instances.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Filesystem-backed [`TemplateLoader`]
//! - **Integration:** templates folder → TemplateResolver
//!
//! The tree is rescanned on every query so edits on disk are picked up
//! without a restart.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::template::{TemplateDefinition, TemplateError, TemplateLoader, TEMPLATE_MANIFEST};
use crate::infrastructure::file_tree::{discover_manifest_dirs, ScanOptions};
use crate::infrastructure::manifest_parser::ManifestParser;

pub struct LocalTemplateLoader {
    root: PathBuf,
    options: ScanOptions,
}

impl LocalTemplateLoader {
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn scan(root: PathBuf, options: ScanOptions) -> Vec<Arc<TemplateDefinition>> {
        discover_manifest_dirs(&root, TEMPLATE_MANIFEST, options)
            .into_iter()
            .filter_map(|dir| match ManifestParser::parse_template_dir(&dir) {
                Ok(def) => Some(Arc::new(def)),
                Err(e) => {
                    warn!("Skipping template at {:?}: {}", dir, e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl TemplateLoader for LocalTemplateLoader {
    async fn definitions(&self) -> Result<Vec<Arc<TemplateDefinition>>, TemplateError> {
        let root = self.root.clone();
        let options = self.options;
        let definitions = tokio::task::spawn_blocking(move || Self::scan(root, options))
            .await
            .map_err(|e| TemplateError::Io(std::io::Error::other(e)))?;
        debug!("Found {} templates under {:?}", definitions.len(), self.root);
        Ok(definitions)
    }
}
