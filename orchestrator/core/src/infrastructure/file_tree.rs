// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! File Tree Helpers
//!
//! Storage walks shared by template and instance handling.
//!
//! Manifest discovery finds directories holding a given manifest file below
//! a storage root. Once a directory with the manifest is found, nothing
//! below it is visited: a template's or instance's own file tree never
//! yields nested templates or instances.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Bounded, pruned directory walks and tree copies

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Bounds of a storage walk.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub max_depth: usize,
    pub follow_links: bool,
}

/// Directories under `root` that contain `manifest`, in file-name order.
pub fn discover_manifest_dirs(root: &Path, manifest: &str, options: ScanOptions) -> Vec<PathBuf> {
    if !root.is_dir() {
        debug!("Storage root {:?} does not exist; nothing to scan", root);
        return Vec::new();
    }

    let mut found = Vec::new();
    let mut walker = WalkDir::new(root)
        .max_depth(options.max_depth)
        .follow_links(options.follow_links)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry below {:?}: {}", root, e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().join(manifest).is_file() {
            found.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    found
}

/// Copies the contents of `source` into `target`, overwriting files that
/// already exist. A missing `source` copies nothing.
pub fn copy_tree(source: &Path, target: &Path) -> io::Result<u64> {
    if !source.is_dir() {
        return Ok(0);
    }
    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &destination)?;
            copied += 1;
        }
    }
    debug!("Copied {} files from {:?} to {:?}", copied, source, target);
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn options() -> ScanOptions {
        ScanOptions {
            max_depth: 5,
            follow_links: false,
        }
    }

    #[test]
    fn test_nested_manifests_are_pruned() {
        let root = tempfile::tempdir().unwrap();
        let outer = root.path().join("group/lobby");
        let nested = outer.join("files/world/backup");
        fs::create_dir_all(&nested).unwrap();
        fs::write(outer.join("instance.yml"), "name: lobby").unwrap();
        fs::write(nested.join("instance.yml"), "name: shadow").unwrap();

        let found = discover_manifest_dirs(root.path(), "instance.yml", options());
        assert_eq!(found, vec![outer]);
    }

    #[test]
    fn test_depth_limit() {
        let root = tempfile::tempdir().unwrap();
        let shallow = root.path().join("a");
        let deep = root.path().join("b/c/d/e/f/g");
        fs::create_dir_all(&shallow).unwrap();
        fs::create_dir_all(&deep).unwrap();
        fs::write(shallow.join("template.yml"), "").unwrap();
        fs::write(deep.join("template.yml"), "").unwrap();

        let found = discover_manifest_dirs(root.path(), "template.yml", options());
        assert_eq!(found, vec![shallow]);
    }

    #[test]
    fn test_copy_tree_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let older = root.path().join("older");
        let newer = root.path().join("newer");
        let target = root.path().join("target");
        fs::create_dir_all(older.join("config")).unwrap();
        fs::create_dir_all(&newer).unwrap();
        fs::write(older.join("config/a.yml"), "old").unwrap();
        fs::write(older.join("eula.txt"), "eula=false").unwrap();
        fs::write(newer.join("eula.txt"), "eula=true").unwrap();

        assert_eq!(copy_tree(&older, &target).unwrap(), 2);
        assert_eq!(copy_tree(&newer, &target).unwrap(), 1);
        assert_eq!(copy_tree(&root.path().join("none"), &target).unwrap(), 0);

        assert_eq!(fs::read_to_string(target.join("eula.txt")).unwrap(), "eula=true");
        assert_eq!(fs::read_to_string(target.join("config/a.yml")).unwrap(), "old");
    }

    #[test]
    fn test_missing_root_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let found = discover_manifest_dirs(&root.path().join("absent"), "template.yml", options());
        assert!(found.is_empty());
    }
}
