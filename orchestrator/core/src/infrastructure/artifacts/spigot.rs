// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Spigot Server Artifact
//!
//! Compiles Spigot from source with BuildTools.

use async_trait::async_trait;

use super::fetcher::{ArtifactFetcher, ScratchDir};
use crate::domain::artifact::{ArtifactKey, ArtifactProvider, BuildContext, BuildError};

pub const BUILDTOOLS_URL: &str =
    "https://hub.spigotmc.org/jenkins/job/BuildTools/lastSuccessfulBuild/artifact/target/BuildTools.jar";

const BUILDTOOLS_JAR: &str = "BuildTools.jar";

pub struct SpigotArtifact {
    version: String,
    fetcher: ArtifactFetcher,
}

impl SpigotArtifact {
    pub fn new(version: impl Into<String>, fetcher: ArtifactFetcher) -> Self {
        Self {
            version: version.into(),
            fetcher,
        }
    }
}

#[async_trait]
impl ArtifactProvider for SpigotArtifact {
    fn key(&self) -> ArtifactKey {
        ArtifactKey::new("spigot", &self.version)
    }

    fn artifact_name(&self) -> String {
        format!("spigot-{}.jar", self.version)
    }

    async fn build(&self, ctx: &BuildContext) -> Result<(), BuildError> {
        let buildtools = ctx.cache_root.join("buildtools").join(BUILDTOOLS_JAR);
        self.fetcher.download_once(BUILDTOOLS_URL, &buildtools).await?;

        let scratch = ScratchDir::create(ctx.scratch_dir()).await?;
        tokio::fs::copy(&buildtools, scratch.path().join(BUILDTOOLS_JAR)).await?;
        self.fetcher
            .run_java(
                scratch.path(),
                &["-jar", BUILDTOOLS_JAR, "--rev", self.version.as_str(), "--compile-if-changed"],
            )
            .await?;

        let output = scratch.path().join(self.artifact_name());
        if !tokio::fs::try_exists(&output).await? {
            return Err(BuildError::Patch(format!(
                "BuildTools did not produce {:?}",
                output
            )));
        }
        tokio::fs::copy(&output, &ctx.artifact).await?;
        Ok(())
    }
}
