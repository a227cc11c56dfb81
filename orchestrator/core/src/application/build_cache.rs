// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Artifact Build Cache
//!
//! Keeps versioned worker artifacts under `<cache>/servers/<kind>/<version>`
//! and installs them into instance file trees. The artifact file on disk is
//! the cache; there is no separate metadata.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Single-flight artifact builds shared by every instance of a version
//!
//! Builds run on the task scheduler, not in the caller's task, so a caller
//! that gives up waiting does not abort a build other callers still need.

use futures::future::FutureExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::application::single_flight::SingleFlight;
use crate::domain::artifact::{ArtifactKey, ArtifactProvider, BuildContext, BuildError};
use crate::domain::scheduler::TaskScheduler;

pub struct ArtifactBuildCache {
    cache_root: PathBuf,
    scheduler: Arc<dyn TaskScheduler>,
    flights: SingleFlight<ArtifactKey, Result<bool, BuildError>>,
}

impl ArtifactBuildCache {
    pub fn new(cache_root: impl Into<PathBuf>, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self {
            cache_root: cache_root.into(),
            scheduler,
            flights: SingleFlight::new(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn version_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.cache_root
            .join("servers")
            .join(&key.kind)
            .join(&key.version)
    }

    pub fn artifact_path(&self, provider: &dyn ArtifactProvider) -> PathBuf {
        self.version_dir(&provider.key()).join(provider.artifact_name())
    }

    /// Makes sure the provider's artifact exists in the cache.
    ///
    /// Returns `true` when this call (or the build it joined) produced the
    /// artifact, `false` when it was already there.
    pub async fn ensure_ready(&self, provider: &Arc<dyn ArtifactProvider>) -> Result<bool, BuildError> {
        let key = provider.key();
        let ctx = BuildContext {
            cache_root: self.cache_root.clone(),
            version_dir: self.version_dir(&key),
            artifact: self.artifact_path(provider.as_ref()),
        };
        let scheduler = Arc::clone(&self.scheduler);
        let provider = Arc::clone(provider);

        self.flights
            .run(key, move || {
                let (tx, rx) = oneshot::channel();
                scheduler.run_async(Box::pin(async move {
                    let _ = tx.send(build_once(provider, ctx).await);
                }));
                async move { rx.await.unwrap_or(Err(BuildError::Cancelled)) }.boxed()
            })
            .await
    }

    /// Ensures the artifact and copies it into `files_dir` under the
    /// provider's install name. The copy happens on every call.
    pub async fn prepare(
        &self,
        provider: &Arc<dyn ArtifactProvider>,
        files_dir: &Path,
    ) -> Result<bool, BuildError> {
        let built = self.ensure_ready(provider).await?;
        let source = self.artifact_path(provider.as_ref());
        let target = files_dir.join(provider.install_name());
        tokio::fs::create_dir_all(files_dir).await?;
        tokio::fs::copy(&source, &target).await?;
        debug!("Installed {} into {}", source.display(), target.display());
        Ok(built)
    }
}

async fn build_once(provider: Arc<dyn ArtifactProvider>, ctx: BuildContext) -> Result<bool, BuildError> {
    let key = provider.key();
    tokio::fs::create_dir_all(&ctx.version_dir).await?;
    if tokio::fs::try_exists(&ctx.artifact).await? {
        debug!("Artifact {} is cached", key);
        return Ok(false);
    }

    info!("Building artifact {}", key);
    let started = Instant::now();
    if let Err(e) = provider.build(&ctx).await {
        warn!("Build of {} failed: {}", key, e);
        // A partial artifact must not pass for a cached one.
        match tokio::fs::remove_file(&ctx.artifact).await {
            Ok(()) => debug!("Removed partial artifact {}", ctx.artifact.display()),
            Err(io) if io.kind() == std::io::ErrorKind::NotFound => {}
            Err(io) => warn!("Failed to remove {}: {}", ctx.artifact.display(), io),
        }
        return Err(e);
    }
    if !tokio::fs::try_exists(&ctx.artifact).await? {
        return Err(BuildError::Patch(format!(
            "Build of {} did not produce {}",
            key,
            ctx.artifact.display()
        )));
    }
    info!("Built artifact {} in {:.1}s", key, started.elapsed().as_secs_f64());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::scheduler::TokioTaskScheduler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingProvider {
        builds: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ArtifactProvider for CountingProvider {
        fn key(&self) -> ArtifactKey {
            ArtifactKey::new("fake", "1.0")
        }

        fn artifact_name(&self) -> String {
            "fake.jar".to_string()
        }

        async fn build(&self, ctx: &BuildContext) -> Result<(), BuildError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail.load(Ordering::SeqCst) {
                tokio::fs::write(&ctx.artifact, b"trunc").await?;
                return Err(BuildError::Io("No space left on device".to_string()));
            }
            tokio::fs::write(&ctx.artifact, b"jar").await?;
            Ok(())
        }
    }

    fn cache(dir: &TempDir) -> Arc<ArtifactBuildCache> {
        let scheduler = Arc::new(TokioTaskScheduler::new(tokio::runtime::Handle::current()));
        Arc::new(ArtifactBuildCache::new(dir.path().join("cache"), scheduler))
    }

    #[tokio::test]
    async fn test_concurrent_callers_build_once() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let counting = CountingProvider::new();
        let provider: Arc<dyn ArtifactProvider> = counting.clone();

        let mut joins = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let provider = Arc::clone(&provider);
            joins.push(tokio::spawn(async move { cache.ensure_ready(&provider).await }));
        }
        for join in joins {
            assert!(join.await.unwrap().unwrap());
        }
        assert_eq!(counting.builds.load(Ordering::SeqCst), 1);

        // Already cached: no further work.
        assert!(!cache.ensure_ready(&provider).await.unwrap());
        assert_eq!(counting.builds.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("cache/servers/fake/1.0/fake.jar").is_file());
    }

    #[tokio::test]
    async fn test_failure_reaches_every_caller_and_is_retried() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let counting = CountingProvider::new();
        counting.fail.store(true, Ordering::SeqCst);
        let provider: Arc<dyn ArtifactProvider> = counting.clone();

        let (a, b) = tokio::join!(cache.ensure_ready(&provider), cache.ensure_ready(&provider));
        assert!(matches!(a, Err(BuildError::Io(_))));
        assert!(matches!(b, Err(BuildError::Io(_))));
        assert_eq!(counting.builds.load(Ordering::SeqCst), 1);

        counting.fail.store(false, Ordering::SeqCst);
        assert!(cache.ensure_ready(&provider).await.unwrap());
        assert_eq!(counting.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_no_cached_artifact() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let counting = CountingProvider::new();
        counting.fail.store(true, Ordering::SeqCst);
        let provider: Arc<dyn ArtifactProvider> = counting.clone();
        let artifact = cache.artifact_path(provider.as_ref());

        assert!(cache.ensure_ready(&provider).await.is_err());
        assert!(!artifact.exists());
        assert!(cache.ensure_ready(&provider).await.is_err());
        assert_eq!(counting.builds.load(Ordering::SeqCst), 2);

        let files = dir.path().join("server/files");
        assert!(cache.prepare(&provider, &files).await.is_err());
        assert!(!files.join("server.jar").exists());

        counting.fail.store(false, Ordering::SeqCst);
        assert!(cache.ensure_ready(&provider).await.unwrap());
        assert_eq!(std::fs::read(&artifact).unwrap(), b"jar");
    }

    #[tokio::test]
    async fn test_prepare_installs_on_every_call() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let provider: Arc<dyn ArtifactProvider> = CountingProvider::new();
        let files = dir.path().join("server/files");

        assert!(cache.prepare(&provider, &files).await.unwrap());
        std::fs::remove_file(files.join("server.jar")).unwrap();

        assert!(!cache.prepare(&provider, &files).await.unwrap());
        assert_eq!(std::fs::read(files.join("server.jar")).unwrap(), b"jar");
    }
}
