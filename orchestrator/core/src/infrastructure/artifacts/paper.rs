// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Paper Server Artifact
//!
//! Downloads a paperclip launcher from the template-provided URL and runs
//! it in version mode, which applies Paper's patches and leaves the
//! patched jar in its cache directory.

use async_trait::async_trait;

use super::fetcher::{ArtifactFetcher, ScratchDir};
use crate::domain::artifact::{ArtifactKey, ArtifactProvider, BuildContext, BuildError};

const PAPERCLIP_JAR: &str = "paperclip.jar";

pub struct PaperArtifact {
    version: String,
    url: String,
    fetcher: ArtifactFetcher,
}

impl PaperArtifact {
    pub fn new(version: impl Into<String>, url: impl Into<String>, fetcher: ArtifactFetcher) -> Self {
        Self {
            version: version.into(),
            url: url.into(),
            fetcher,
        }
    }
}

#[async_trait]
impl ArtifactProvider for PaperArtifact {
    fn key(&self) -> ArtifactKey {
        ArtifactKey::new("paper", &self.version)
    }

    fn artifact_name(&self) -> String {
        format!("paper-{}.jar", self.version)
    }

    async fn build(&self, ctx: &BuildContext) -> Result<(), BuildError> {
        let launcher = ctx
            .cache_root
            .join("paperclip")
            .join(&self.version)
            .join(PAPERCLIP_JAR);
        self.fetcher.download_once(&self.url, &launcher).await?;

        let scratch = ScratchDir::create(ctx.scratch_dir()).await?;
        tokio::fs::copy(&launcher, scratch.path().join(PAPERCLIP_JAR)).await?;
        self.fetcher
            .run_java(scratch.path(), &["-jar", PAPERCLIP_JAR, "-v"])
            .await?;

        let output = scratch
            .path()
            .join("cache")
            .join(format!("patched_{}.jar", self.version));
        if !tokio::fs::try_exists(&output).await? {
            return Err(BuildError::Patch(format!(
                "paperclip did not produce {:?}",
                output
            )));
        }
        tokio::fs::copy(&output, &ctx.artifact).await?;
        Ok(())
    }
}
