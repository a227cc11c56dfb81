// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Artifact Fetcher
//!
//! HTTP downloads and bounded external tool runs used by the artifact
//! providers.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Download files, read JSON metadata, run patch/compile tools

use futures::{Stream, StreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::artifact::BuildError;

#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: Client,
    java: String,
    tool_timeout: Duration,
}

impl ArtifactFetcher {
    pub fn new(tool_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            java: "java".to_string(),
            tool_timeout,
        }
    }

    /// Overrides the JVM launcher used for build tools.
    pub fn with_java(mut self, java: impl Into<String>) -> Self {
        self.java = java.into();
        self
    }

    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, BuildError> {
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(url, e))?;
        response.json().await.map_err(|e| fetch_error(url, e))
    }

    /// Streams `url` into `dest`. The file only appears once complete.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<(), BuildError> {
        info!("Downloading {} to {:?}", url, dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(url, e))?;

        write_complete(response.bytes_stream(), dest, |e| fetch_error(url, e)).await
    }

    /// Downloads `url` to `dest` unless `dest` already exists.
    pub async fn download_once(&self, url: &str, dest: &Path) -> Result<(), BuildError> {
        if tokio::fs::try_exists(dest).await? {
            debug!("Using cached {:?}", dest);
            return Ok(());
        }
        self.download(url, dest).await
    }

    /// Runs `java <args>` in `dir`, bounded by the tool timeout. The tool's
    /// output is logged at debug level.
    pub async fn run_java(&self, dir: &Path, args: &[&str]) -> Result<(), BuildError> {
        let description = format!("{} {}", self.java, args.join(" "));
        info!("Running {} in {:?}", description, dir);

        let mut child = Command::new(&self.java)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::Patch(format!("failed to launch {}: {}", description, e)))?;

        if let Some(out) = child.stdout.take() {
            tokio::spawn(log_lines(out));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(log_lines(err));
        }

        match tokio::time::timeout(self.tool_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(BuildError::Patch(format!(
                "{} exited with {}",
                description, status
            ))),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!("{} exceeded {:?}; killing it", description, self.tool_timeout);
                let _ = child.kill().await;
                Err(BuildError::Timeout(self.tool_timeout.as_secs(), description))
            }
        }
    }
}

fn fetch_error(url: &str, err: reqwest::Error) -> BuildError {
    BuildError::Fetch {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

/// Writes `body` to a sibling `.part` file and renames it onto `dest`. The
/// partial file is removed on every failure.
async fn write_complete<S, B, E>(
    body: S,
    dest: &Path,
    on_error: impl Fn(E) -> BuildError,
) -> Result<(), BuildError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let partial = partial_path(dest);
    let result = async {
        let mut body = std::pin::pin!(body);
        let mut file = tokio::fs::File::create(&partial).await?;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(&on_error)?;
            file.write_all(chunk.as_ref()).await?;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, dest).await?;
        Ok::<(), BuildError>(())
    }
    .await;

    if result.is_err() {
        match tokio::fs::remove_file(&partial).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {:?}: {}", partial, e),
        }
    }
    result
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.part", uuid::Uuid::new_v4()));
    dest.with_file_name(name)
}

async fn log_lines<R: AsyncRead + Unpin>(stream: R) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "myserver::build", "{}", line);
    }
}

/// Scratch directory removed when dropped.
pub struct ScratchDir(PathBuf);

impl ScratchDir {
    pub async fn create(path: PathBuf) -> Result<Self, BuildError> {
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self(path))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            debug!("Failed to remove scratch dir {:?}: {}", self.0, e);
        }
    }
}

/// Reads a string at `path` in a JSON document.
pub fn json_str<'a>(doc: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(doc, |node, key| node.get(*key))
        .and_then(serde_json::Value::as_str)
}
