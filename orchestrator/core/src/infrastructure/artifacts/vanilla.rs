// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Vanilla Server Artifact
//!
//! Downloads the official server jar for a version and patches it with
//! VanillaCord so it accepts forwarded player connections from a proxy.

use async_trait::async_trait;

use super::fetcher::{json_str, ArtifactFetcher, ScratchDir};
use crate::domain::artifact::{ArtifactKey, ArtifactProvider, BuildContext, BuildError};

pub const VERSION_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest.json";
pub const VANILLACORD_PROFILE_URL: &str =
    "https://raw.githubusercontent.com/ME1312/VanillaCord/1.12/profile.json";

const ORIGINAL_JAR: &str = "original-server.jar";
const PATCHED_JAR: &str = "patched-server.jar";
const VANILLACORD_JAR: &str = "VanillaCord-1.12.jar";

pub struct VanillaArtifact {
    version: String,
    fetcher: ArtifactFetcher,
}

impl VanillaArtifact {
    pub fn new(version: impl Into<String>, fetcher: ArtifactFetcher) -> Self {
        Self {
            version: version.into(),
            fetcher,
        }
    }

    async fn server_download_url(&self) -> Result<String, BuildError> {
        let manifest = self.fetcher.fetch_json(VERSION_MANIFEST_URL).await?;
        let version_url = manifest
            .get("versions")
            .and_then(serde_json::Value::as_array)
            .and_then(|versions| {
                versions
                    .iter()
                    .find(|v| json_str(v, &["id"]) == Some(self.version.as_str()))
            })
            .and_then(|v| json_str(v, &["url"]))
            .ok_or_else(|| BuildError::Fetch {
                url: VERSION_MANIFEST_URL.to_string(),
                reason: format!("version {} is not listed", self.version),
            })?
            .to_string();

        let details = self.fetcher.fetch_json(&version_url).await?;
        json_str(&details, &["downloads", "server", "url"])
            .map(str::to_string)
            .ok_or_else(|| BuildError::Fetch {
                url: version_url.clone(),
                reason: format!("version {} has no server download", self.version),
            })
    }

    async fn vanillacord_download_url(&self) -> Result<String, BuildError> {
        let profile = self.fetcher.fetch_json(VANILLACORD_PROFILE_URL).await?;
        json_str(&profile, &["download", "url"])
            .map(str::to_string)
            .ok_or_else(|| BuildError::Fetch {
                url: VANILLACORD_PROFILE_URL.to_string(),
                reason: "profile has no download url".to_string(),
            })
    }
}

#[async_trait]
impl ArtifactProvider for VanillaArtifact {
    fn key(&self) -> ArtifactKey {
        ArtifactKey::new("vanilla", &self.version)
    }

    fn artifact_name(&self) -> String {
        PATCHED_JAR.to_string()
    }

    async fn build(&self, ctx: &BuildContext) -> Result<(), BuildError> {
        let original = ctx.version_dir.join(ORIGINAL_JAR);
        if !tokio::fs::try_exists(&original).await? {
            let url = self.server_download_url().await?;
            self.fetcher.download(&url, &original).await?;
        }

        let patcher = ctx.cache_root.join("vanillacord").join(VANILLACORD_JAR);
        if !tokio::fs::try_exists(&patcher).await? {
            let url = self.vanillacord_download_url().await?;
            self.fetcher.download_once(&url, &patcher).await?;
        }

        let scratch = ScratchDir::create(ctx.scratch_dir()).await?;
        let input = scratch.path().join("in");
        tokio::fs::create_dir_all(&input).await?;
        tokio::fs::copy(&original, input.join(format!("{}.jar", self.version))).await?;
        tokio::fs::copy(&patcher, scratch.path().join(VANILLACORD_JAR)).await?;

        self.fetcher
            .run_java(scratch.path(), &["-jar", VANILLACORD_JAR, self.version.as_str()])
            .await?;

        let output = scratch
            .path()
            .join("out")
            .join(format!("{}-bungee.jar", self.version));
        if !tokio::fs::try_exists(&output).await? {
            return Err(BuildError::Patch(format!(
                "VanillaCord did not produce {:?}",
                output
            )));
        }
        tokio::fs::copy(&output, &ctx.artifact).await?;
        Ok(())
    }
}
