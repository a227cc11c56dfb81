// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Server Artifacts
//!
//! Seam for producing the executable a worker server runs (download,
//! patch or compile). Builds are cached per `(kind, version)`; see
//! `application::build_cache`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Artifact identity, build context and the provider trait

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Identifies one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub kind: String,
    pub version: String,
}

impl ArtifactKey {
    pub fn new(kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.version)
    }
}

/// Errors raised while producing an artifact. Cloned to every caller that
/// joined the same in-flight build.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Build step failed: {0}")]
    Patch(String),

    #[error("Build step timed out after {0} seconds: {1}")]
    Timeout(u64, String),

    #[error("Build I/O error: {0}")]
    Io(String),

    #[error("Build was cancelled before completion")]
    Cancelled,
}

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        BuildError::Io(err.to_string())
    }
}

/// Paths handed to a provider for one build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Root of the shared cache; tools shared across versions live here.
    pub cache_root: PathBuf,
    /// `<cache>/servers/<kind>/<version>`, already created.
    pub version_dir: PathBuf,
    /// Where the finished artifact must be written.
    pub artifact: PathBuf,
}

impl BuildContext {
    /// Scratch directory unique to this build, under the cache root.
    pub fn scratch_dir(&self) -> PathBuf {
        self.cache_root
            .join("tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    fn key(&self) -> ArtifactKey;

    /// File name of the finished artifact inside the version directory.
    fn artifact_name(&self) -> String;

    /// File name the artifact is installed under in an instance's files.
    fn install_name(&self) -> String {
        "server.jar".to_string()
    }

    /// Produces `ctx.artifact`. Only called when it does not exist yet.
    async fn build(&self, ctx: &BuildContext) -> Result<(), BuildError>;
}

impl fmt::Debug for dyn ArtifactProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactProvider")
            .field("key", &self.key())
            .field("artifact", &self.artifact_name())
            .finish()
    }
}
