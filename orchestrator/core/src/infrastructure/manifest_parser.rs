// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Manifest YAML Parser
//!
//! Parses template manifests (`template.yml`) and instance manifests
//! (`instance.yml`) into domain objects, and merges template documents
//! along an inheritance chain.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//! - **Anti-Corruption:** Translates YAML schema to domain model
//!
//! # Template Manifest Format
//!
//! ```yaml
//! name: server/vanilla/1.12:lobby@1.0
//! description: Lobby server
//! parents: [ "base:defaults@1.0" ]
//! tags:
//!   motd: { type: string, default: "Welcome" }
//!   difficulty: { type: choice, choices: [ peaceful, easy, hard ], required: true }
//! templates:
//!   static: [ "eula.txt" ]
//!   dynamic: [ "server.properties" ]
//! server:
//!   execute: "java -jar server.jar nogui"
//!   start: { commands: [ "say ready" ], delay: 5 }
//!   stop: { commands: [ "stop" ], wait: 30 }
//! vanilla:
//!   version: "1.12.2"
//! ```

use serde_yaml::{Mapping, Value};
use std::path::Path;

use crate::domain::server::{ServerError, ServerManifest, INSTANCE_MANIFEST};
use crate::domain::template::{TemplateDefinition, TemplateError, TEMPLATE_MANIFEST};

// ============================================================================
// Parser API
// ============================================================================

pub struct ManifestParser;

impl ManifestParser {
    /// Parse a template manifest from a YAML string
    pub fn parse_template_yaml(yaml: &str, source: &Path) -> Result<TemplateDefinition, TemplateError> {
        let document: Value = serde_yaml::from_str(yaml).map_err(|e| {
            TemplateError::InvalidTemplate(format!(
                "Failed to parse {}: {}",
                source.join(TEMPLATE_MANIFEST).display(),
                e
            ))
        })?;
        TemplateDefinition::from_document(document, source.to_path_buf())
    }

    /// Parse the template manifest inside `dir`
    pub fn parse_template_dir(dir: &Path) -> Result<TemplateDefinition, TemplateError> {
        let yaml = std::fs::read_to_string(dir.join(TEMPLATE_MANIFEST))?;
        Self::parse_template_yaml(&yaml, dir)
    }

    /// Parse the instance manifest inside `dir`
    pub fn parse_instance_dir(dir: &Path) -> Result<ServerManifest, ServerError> {
        let yaml = std::fs::read_to_string(dir.join(INSTANCE_MANIFEST))?;
        ServerManifest::from_yaml_str(&yaml)
    }

    /// Write the instance manifest inside `dir`
    pub fn write_instance_dir(dir: &Path, manifest: &ServerManifest) -> Result<(), ServerError> {
        let yaml = manifest.to_yaml()?;
        std::fs::write(dir.join(INSTANCE_MANIFEST), yaml)?;
        Ok(())
    }
}

// ============================================================================
// Document merging
// ============================================================================

/// Merges `overlay` over `base`.
///
/// Mappings merge key by key, sequences element by element, and for any
/// other pair the overlay wins. A null overlay keeps the base value.
pub fn merge_documents(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (_, Value::Null) => base.clone(),
        (Value::Mapping(b), Value::Mapping(o)) => {
            let mut merged: Mapping = b.clone();
            for (key, value) in o {
                let next = match b.get(key) {
                    Some(existing) => merge_documents(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Mapping(merged)
        }
        (Value::Sequence(b), Value::Sequence(o)) => {
            let len = b.len().max(o.len());
            let merged = (0..len)
                .map(|i| match (b.get(i), o.get(i)) {
                    (Some(x), Some(y)) => merge_documents(x, y),
                    (Some(x), None) => x.clone(),
                    (None, Some(y)) => y.clone(),
                    (None, None) => Value::Null,
                })
                .collect();
            Value::Sequence(merged)
        }
        (_, other) => other.clone(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_template_yaml() {
        let def = ManifestParser::parse_template_yaml(
            r#"
name: server:lobby@1.0
description: Lobby
parents: [ "base:defaults@1" ]
"#,
            Path::new("/templates/lobby"),
        )
        .unwrap();
        assert_eq!(def.name.full(), "server:lobby@1.0");
        assert_eq!(def.description.as_deref(), Some("Lobby"));
        assert_eq!(def.parents, vec!["base:defaults@1"]);
        assert_eq!(def.files_dir(), Path::new("/templates/lobby/files"));
    }

    #[test]
    fn test_parse_template_yaml_rejects_garbage() {
        let err = ManifestParser::parse_template_yaml("name: [unclosed", Path::new("/t")).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidTemplate(_)));
    }

    #[test]
    fn test_merge_mappings_recursively() {
        let base = yaml("server: { execute: a, stop: { wait: 10, commands: [stop] } }\nkeep: 1");
        let overlay = yaml("server: { stop: { wait: 3 } }\nextra: 2");
        let merged = merge_documents(&base, &overlay);
        assert_eq!(merged, yaml(
            "server: { execute: a, stop: { wait: 3, commands: [stop] } }\nkeep: 1\nextra: 2"
        ));
    }

    #[test]
    fn test_merge_sequences_index_wise() {
        let merged = merge_documents(&yaml("[a, b, c]"), &yaml("[x]"));
        assert_eq!(merged, yaml("[x, b, c]"));
        let merged = merge_documents(&yaml("[a]"), &yaml("[x, y]"));
        assert_eq!(merged, yaml("[x, y]"));
    }

    #[test]
    fn test_merge_scalars_child_wins() {
        assert_eq!(merge_documents(&yaml("1"), &yaml("2")), yaml("2"));
        assert_eq!(merge_documents(&yaml("a: 1"), &yaml("a: ~")), yaml("a: 1"));
        assert_eq!(merge_documents(&yaml("a: [1]"), &yaml("a: x")), yaml("a: x"));
    }

    #[test]
    fn test_instance_manifest_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = ServerManifest {
            uuid: Some(uuid::Uuid::new_v4()),
            name: Some("lobby".to_string()),
            template: Some("server:lobby@1.0".to_string()),
            ..Default::default()
        };
        manifest.tags.insert("motd".to_string(), "hi".to_string());
        ManifestParser::write_instance_dir(dir.path(), &manifest).unwrap();

        let parsed = ManifestParser::parse_instance_dir(dir.path()).unwrap();
        assert_eq!(parsed, manifest);
    }
}
