// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Templates
//!
//! A template is a named, versioned blueprint for worker servers. Templates
//! declare parents and inherit configuration, tags and file lists from them.
//! This module holds the raw [`TemplateDefinition`] as discovered on storage,
//! the resolved [`Template`] with its ancestry attached, and the lookup
//! helpers used to derive inherited values from the ancestry.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Template identity, versions, inheritance data and loader seam
//!
//! Inherited scalar lookups walk the definition documents depth-first,
//! starting with the template itself and then each parent in declaration
//! order, and take the first document that defines the key.

use async_trait::async_trait;
use serde::Serialize;
use serde_yaml::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::server_template::ServerTemplate;
use crate::domain::tag::{TagDefinition, TagType};

/// File name of a template manifest inside a template directory.
pub const TEMPLATE_MANIFEST: &str = "template.yml";

/// Directory inside a template (and an instance) holding the worker files.
pub const FILES_DIR: &str = "files";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("No such template: {0}")]
    NoSuchTemplate(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Template I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Names and versions
// ============================================================================

/// Lenient dotted version. Numeric components compare numerically, other
/// components lexically, and a missing numeric component counts as zero.
#[derive(Debug, Clone, Eq, Serialize)]
#[serde(transparent)]
pub struct TemplateVersion(String);

impl TemplateVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(['.', '-', '_']).filter(|c| !c.is_empty())
    }
}

fn compare_component(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(a), Some(b)) => match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()),
        },
        // A missing numeric part is zero; a missing qualifier ranks above a
        // present one (1.0 > 1.0-beta).
        (None, Some(b)) => match b.parse::<u64>() {
            Ok(y) => 0.cmp(&y),
            Err(_) => Ordering::Greater,
        },
        (Some(a), None) => compare_component(None, Some(a)).reverse(),
    }
}

impl Ord for TemplateVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.components();
        let mut right = other.components();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (a, b) => match compare_component(a, b) {
                    Ordering::Equal => continue,
                    unequal => return unequal,
                },
            }
        }
    }
}

impl PartialOrd for TemplateVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TemplateVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed full template name of the form `type:name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateName {
    pub kind: String,
    pub name: String,
    pub version: TemplateVersion,
}

impl TemplateName {
    /// `type:name@version`
    pub fn full(&self) -> String {
        format!("{}:{}@{}", self.kind, self.name, self.version)
    }

    /// Returns true when `partial` selects this template.
    ///
    /// Accepted forms: `type:name@version` (exact), `type:name` (any
    /// version), or a bare `name`.
    pub fn matches(&self, partial: &str) -> bool {
        if partial.contains('@') {
            partial == self.full()
        } else if let Some((kind, name)) = partial.split_once(':') {
            kind == self.kind && name == self.name
        } else {
            partial == self.name
        }
    }
}

impl FromStr for TemplateName {
    type Err = TemplateError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || TemplateError::InvalidTemplate(format!("Illegal template name: {}", input));
        let (kind, rest) = input.split_once(':').ok_or_else(invalid)?;
        let (name, version) = rest.split_once('@').ok_or_else(invalid)?;
        if kind.is_empty() || name.is_empty() || version.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            kind: kind.to_string(),
            name: name.to_string(),
            version: TemplateVersion::new(version),
        })
    }
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.name, self.version)
    }
}

// ============================================================================
// File classes
// ============================================================================

/// When a templated file is rendered into an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFileClass {
    /// Rendered once, when the instance is created.
    Static,
    /// Rendered before every start and after every tag change.
    Dynamic,
}

impl TemplateFileClass {
    pub fn parse(input: &str) -> Option<Self> {
        match input.to_ascii_lowercase().as_str() {
            "static" => Some(Self::Static),
            "dynamic" => Some(Self::Dynamic),
            _ => None,
        }
    }
}

/// Capability requested from the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateClass {
    Any,
    Server,
}

impl fmt::Display for TemplateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateClass::Any => f.write_str("template"),
            TemplateClass::Server => f.write_str("server template"),
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// Raw template manifest as found on storage, before parents are resolved.
#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    pub name: TemplateName,
    pub description: Option<String>,
    pub parents: Vec<String>,
    pub document: Value,
    /// Directory holding the manifest.
    pub source: PathBuf,
}

impl TemplateDefinition {
    pub fn from_document(document: Value, source: PathBuf) -> Result<Self, TemplateError> {
        if !document.is_mapping() {
            return Err(TemplateError::InvalidTemplate(format!(
                "Template manifest in {} is not a mapping",
                source.display()
            )));
        }
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TemplateError::InvalidTemplate(format!(
                    "Failed to find a name field in {}",
                    source.display()
                ))
            })?
            .parse::<TemplateName>()?;
        let description = document.get("description").and_then(scalar_string);
        let parents = match document.get("parents") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(single)) => vec![single.clone()],
            Some(Value::Sequence(seq)) => seq.iter().filter_map(scalar_string).collect(),
            Some(_) => {
                return Err(TemplateError::InvalidTemplate(format!(
                    "{}: parents must be a list of template names",
                    name
                )))
            }
        };
        Ok(Self {
            name,
            description,
            parents,
            document,
            source,
        })
    }

    pub fn files_dir(&self) -> PathBuf {
        self.source.join(FILES_DIR)
    }
}

/// Source of template definitions.
#[async_trait]
pub trait TemplateLoader: Send + Sync {
    /// Every readable definition this loader knows about.
    async fn definitions(&self) -> Result<Vec<Arc<TemplateDefinition>>, TemplateError>;

    /// Definitions whose name matches `partial` (see [`TemplateName::matches`]).
    async fn find_by_name(
        &self,
        partial: &str,
    ) -> Result<Vec<Arc<TemplateDefinition>>, TemplateError> {
        Ok(self
            .definitions()
            .await?
            .into_iter()
            .filter(|d| d.name.matches(partial))
            .collect())
    }
}

// ============================================================================
// Resolved templates
// ============================================================================

/// Type-specific part of a resolved template.
#[derive(Debug, Clone)]
pub enum TemplateKind {
    Base,
    Server(ServerTemplate),
}

/// A definition with its parents resolved and inherited data computed.
#[derive(Debug)]
pub struct Template {
    definition: Arc<TemplateDefinition>,
    parents: Vec<Arc<Template>>,
    config: Value,
    tags: BTreeMap<String, TagDefinition>,
    files: HashMap<TemplateFileClass, Vec<PathBuf>>,
    kind: TemplateKind,
}

impl Template {
    pub fn new(chain: TemplateChain<'_>, config: Value, kind: TemplateKind) -> Result<Self, TemplateError> {
        let tags = chain.collect_tags()?;
        let files = chain.collect_files()?;
        Ok(Self {
            definition: Arc::clone(chain.definition),
            parents: chain.parents.to_vec(),
            config,
            tags,
            files,
            kind,
        })
    }

    pub fn definition(&self) -> &TemplateDefinition {
        &self.definition
    }

    pub fn full_name(&self) -> String {
        self.definition.name.full()
    }

    pub fn name(&self) -> &TemplateName {
        &self.definition.name
    }

    pub fn parents(&self) -> &[Arc<Template>] {
        &self.parents
    }

    /// Own document merged over the parents' merged documents.
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn tags(&self) -> &BTreeMap<String, TagDefinition> {
        &self.tags
    }

    pub fn tag(&self, name: &str) -> Option<&TagDefinition> {
        self.tags.get(name)
    }

    pub fn files(&self, class: TemplateFileClass) -> &[PathBuf] {
        self.files.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn kind(&self) -> &TemplateKind {
        &self.kind
    }

    pub fn server(&self) -> Option<&ServerTemplate> {
        match &self.kind {
            TemplateKind::Server(server) => Some(server),
            TemplateKind::Base => None,
        }
    }

    pub fn is(&self, class: TemplateClass) -> bool {
        match class {
            TemplateClass::Any => true,
            TemplateClass::Server => self.server().is_some(),
        }
    }

    /// This template followed by its ancestry, depth-first.
    pub fn lineage(&self) -> Vec<&Template> {
        let mut out = vec![self];
        for parent in &self.parents {
            out.extend(parent.lineage());
        }
        out
    }

    /// Definition documents of the lineage, depth-first.
    pub fn nodes(&self) -> Vec<&Value> {
        self.lineage().into_iter().map(|t| &t.definition.document).collect()
    }

    /// First template in the lineage that ships `relative` in its file tree.
    pub fn source_file(&self, relative: &Path) -> Option<PathBuf> {
        self.lineage()
            .into_iter()
            .map(|t| t.definition.files_dir().join(relative))
            .find(|candidate| candidate.is_file())
    }
}

/// A definition together with its already resolved parents. Handed to type
/// factories so they can read inherited values before the template exists.
#[derive(Clone, Copy)]
pub struct TemplateChain<'a> {
    pub definition: &'a Arc<TemplateDefinition>,
    pub parents: &'a [Arc<Template>],
}

impl<'a> TemplateChain<'a> {
    pub fn new(definition: &'a Arc<TemplateDefinition>, parents: &'a [Arc<Template>]) -> Self {
        Self { definition, parents }
    }

    pub fn nodes(&self) -> Vec<&'a Value> {
        let mut out = vec![&self.definition.document];
        for parent in self.parents {
            out.extend(parent.nodes());
        }
        out
    }

    /// First value found at `path` in the lineage.
    pub fn first(&self, path: &[&str]) -> Option<&'a Value> {
        self.nodes()
            .into_iter()
            .filter_map(|node| lookup(node, path))
            .find(|v| !v.is_null())
    }

    pub fn first_string(&self, path: &[&str]) -> Option<String> {
        self.first(path).and_then(scalar_string)
    }

    /// Like [`first_string`](Self::first_string) but missing values are an error.
    pub fn require_string(&self, path: &[&str]) -> Result<String, TemplateError> {
        self.first_string(path).ok_or_else(|| {
            TemplateError::InvalidTemplate(format!(
                "{}: Missing field: {}",
                self.definition.name,
                path.join(".")
            ))
        })
    }

    pub fn first_strings(&self, path: &[&str]) -> Result<Vec<String>, TemplateError> {
        match self.first(path) {
            None => Ok(Vec::new()),
            Some(Value::Sequence(seq)) => Ok(seq.iter().filter_map(scalar_string).collect()),
            Some(other) => scalar_string(other).map(|s| vec![s]).ok_or_else(|| {
                TemplateError::InvalidTemplate(format!(
                    "{}: {} must be a list",
                    self.definition.name,
                    path.join(".")
                ))
            }),
        }
    }

    pub fn first_u64(&self, path: &[&str]) -> Result<Option<u64>, TemplateError> {
        match self.first(path) {
            None => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                TemplateError::InvalidTemplate(format!(
                    "{}: {} must be a non-negative integer",
                    self.definition.name,
                    path.join(".")
                ))
            }),
        }
    }

    /// Tags of the lineage; the nearest declaration of a name wins.
    fn collect_tags(&self) -> Result<BTreeMap<String, TagDefinition>, TemplateError> {
        let mut tags = BTreeMap::new();
        for node in self.nodes() {
            let Some(declared) = node.get("tags") else {
                continue;
            };
            let mapping = match declared {
                Value::Null => continue,
                Value::Mapping(m) => m,
                _ => {
                    return Err(TemplateError::InvalidTemplate(format!(
                        "{}: tags must be a mapping",
                        self.definition.name
                    )))
                }
            };
            for (key, body) in mapping {
                let Some(name) = scalar_string(key) else {
                    continue;
                };
                if tags.contains_key(&name) {
                    continue;
                }
                let tag = parse_tag(&name, body)?;
                tags.insert(name, tag);
            }
        }
        Ok(tags)
    }

    /// Templated file lists of the lineage as a depth-first, de-duplicated union.
    fn collect_files(&self) -> Result<HashMap<TemplateFileClass, Vec<PathBuf>>, TemplateError> {
        let mut files: HashMap<TemplateFileClass, Vec<PathBuf>> = HashMap::new();
        let mut seen: HashSet<(TemplateFileClass, PathBuf)> = HashSet::new();
        for node in self.nodes() {
            let Some(declared) = node.get("templates") else {
                continue;
            };
            let mapping = match declared {
                Value::Null => continue,
                Value::Mapping(m) => m,
                _ => {
                    return Err(TemplateError::InvalidTemplate(format!(
                        "{}: templates must be a mapping",
                        self.definition.name
                    )))
                }
            };
            for (key, list) in mapping {
                let class = scalar_string(key)
                    .as_deref()
                    .and_then(TemplateFileClass::parse)
                    .ok_or_else(|| {
                        TemplateError::InvalidTemplate(format!(
                            "{}: Illegal template file class {:?}",
                            self.definition.name, key
                        ))
                    })?;
                let entries = match list {
                    Value::Null => continue,
                    Value::Sequence(seq) => seq,
                    _ => {
                        return Err(TemplateError::InvalidTemplate(format!(
                            "{}: template file list must be a sequence",
                            self.definition.name
                        )))
                    }
                };
                for entry in entries.iter().filter_map(scalar_string) {
                    let path = relative_file(&entry).ok_or_else(|| {
                        TemplateError::InvalidTemplate(format!(
                            "{}: templated file {:?} must be a relative path inside the file tree",
                            self.definition.name, entry
                        ))
                    })?;
                    if seen.insert((class, path.clone())) {
                        files.entry(class).or_default().push(path);
                    }
                }
            }
        }
        Ok(files)
    }
}

/// Factory turning a resolved chain into the type-specific template part.
pub type TemplateFactory =
    Arc<dyn Fn(&TemplateChain<'_>) -> Result<TemplateKind, TemplateError> + Send + Sync>;

/// Wraps a closure as a [`TemplateFactory`].
pub fn template_factory<F>(f: F) -> TemplateFactory
where
    F: Fn(&TemplateChain<'_>) -> Result<TemplateKind, TemplateError> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================================================
// Value helpers
// ============================================================================

/// Follows a key path through nested mappings.
pub fn lookup<'a>(node: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(node, |current, key| current.get(*key))
}

/// Renders a YAML scalar as a string.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Normalizes a templated file entry; `None` when it is absolute or walks
/// out of the tree.
fn relative_file(entry: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(entry).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!normalized.as_os_str().is_empty()).then_some(normalized)
}

fn parse_tag(name: &str, body: &Value) -> Result<TagDefinition, TemplateError> {
    let mut tag = TagDefinition::new(name, TagType::String);
    let body = match body {
        Value::Null => return Ok(tag),
        Value::Mapping(_) => body,
        _ => {
            return Err(TemplateError::InvalidTemplate(format!(
                "Tag {} must be a mapping",
                name
            )))
        }
    };

    if let Some(raw) = body.get("type").and_then(scalar_string) {
        tag.tag_type = TagType::parse(&raw).ok_or_else(|| {
            TemplateError::InvalidTemplate(format!("Unknown type '{}' for tag {}", raw, name))
        })?;
    }
    tag.description = body.get("description").and_then(scalar_string);
    tag.default_value = body.get("default").and_then(scalar_string);
    tag.permission = body.get("permission").and_then(scalar_string);
    tag.required = body.get("required").and_then(Value::as_bool).unwrap_or(false);
    tag.choices = match body.get("choices") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(seq)) => seq.iter().filter_map(scalar_string).collect(),
        Some(Value::Mapping(map)) => map.keys().filter_map(scalar_string).collect(),
        Some(_) => {
            return Err(TemplateError::InvalidTemplate(format!(
                "Choices of tag {} must be a list",
                name
            )))
        }
    };
    if tag.tag_type == TagType::Choice && tag.choices.is_empty() {
        return Err(TemplateError::InvalidTemplate(format!(
            "Choice tag {} declares no choices",
            name
        )));
    }
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(yaml: &str) -> Arc<TemplateDefinition> {
        let doc: Value = serde_yaml::from_str(yaml).unwrap();
        Arc::new(TemplateDefinition::from_document(doc, PathBuf::from("/nowhere")).unwrap())
    }

    fn base(yaml: &str, parents: Vec<Arc<Template>>) -> Arc<Template> {
        let def = definition(yaml);
        let chain = TemplateChain::new(&def, &parents);
        Arc::new(Template::new(chain, def.document.clone(), TemplateKind::Base).unwrap())
    }

    #[test]
    fn test_parse_template_name() {
        let name: TemplateName = "server/vanilla/1.12:lobby@2.0".parse().unwrap();
        assert_eq!(name.kind, "server/vanilla/1.12");
        assert_eq!(name.name, "lobby");
        assert_eq!(name.version.as_str(), "2.0");
        assert_eq!(name.full(), "server/vanilla/1.12:lobby@2.0");

        assert!("lobby".parse::<TemplateName>().is_err());
        assert!("server:lobby".parse::<TemplateName>().is_err());
        assert!(":lobby@1".parse::<TemplateName>().is_err());
        assert!("server:@1".parse::<TemplateName>().is_err());
    }

    #[test]
    fn test_name_matching() {
        let name: TemplateName = "server:lobby@1.0".parse().unwrap();
        assert!(name.matches("lobby"));
        assert!(name.matches("server:lobby"));
        assert!(name.matches("server:lobby@1.0"));
        assert!(!name.matches("server:lobby@1.1"));
        assert!(!name.matches("base:lobby"));
        assert!(!name.matches("hub"));
    }

    #[test]
    fn test_version_ordering() {
        let v = TemplateVersion::new;
        assert!(v("1.10") > v("1.9"));
        assert!(v("2") > v("1.99.99"));
        assert_eq!(v("1.0"), v("1"));
        assert!(v("1.0") > v("1.0-beta"));
        assert!(v("1.0-rc2") > v("1.0-rc1"));
        assert!(v("1.0.1") > v("1.0"));
    }

    #[test]
    fn test_definition_requires_name() {
        let doc: Value = serde_yaml::from_str("description: nameless").unwrap();
        let err = TemplateDefinition::from_document(doc, PathBuf::from("/x")).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidTemplate(_)));
    }

    #[test]
    fn test_nearest_tag_declaration_wins() {
        let root = base(
            r#"
name: base:root@1
tags:
  motd: { default: "from root" }
  pvp: { type: boolean, default: "true" }
"#,
            vec![],
        );
        let child = base(
            r#"
name: base:child@1
parents: [ "base:root@1" ]
tags:
  motd: { default: "from child" }
"#,
            vec![root],
        );

        assert_eq!(child.tag("motd").unwrap().default_value.as_deref(), Some("from child"));
        assert_eq!(child.tag("pvp").unwrap().tag_type, TagType::Boolean);
        assert_eq!(child.tags().len(), 2);
    }

    #[test]
    fn test_tags_walk_first_parent_ancestry_before_second_parent() {
        let grandparent = base(
            "name: base:gp@1\ntags:\n  motd: { default: gp }\n  seed: { default: gp }",
            vec![],
        );
        let first = base(
            "name: base:p1@1\nparents: [ \"base:gp@1\" ]\nserver: { execute: p1 }",
            vec![grandparent],
        );
        let second = base(
            "name: base:p2@1\ntags:\n  motd: { default: p2 }\n  level: { default: p2 }\nserver: { execute: p2 }",
            vec![],
        );
        let def = definition("name: base:c@1\nparents: [ \"base:p1@1\", \"base:p2@1\" ]");
        let parents = vec![first, second];
        let chain = TemplateChain::new(&def, &parents);

        let names: Vec<String> = chain
            .nodes()
            .iter()
            .filter_map(|node| node.get("name").and_then(scalar_string))
            .collect();
        assert_eq!(names, ["base:c@1", "base:p1@1", "base:gp@1", "base:p2@1"]);

        let tags = chain.collect_tags().unwrap();
        assert_eq!(tags["motd"].default_value.as_deref(), Some("gp"));
        assert_eq!(tags["seed"].default_value.as_deref(), Some("gp"));
        assert_eq!(tags["level"].default_value.as_deref(), Some("p2"));
        assert_eq!(chain.first_string(&["server", "execute"]).as_deref(), Some("p1"));
    }

    #[test]
    fn test_files_are_deduplicated_union() {
        let root = base(
            r#"
name: base:root@1
templates:
  static: [ "a.txt", "b.txt" ]
  dynamic: [ "server.properties" ]
"#,
            vec![],
        );
        let child = base(
            r#"
name: base:child@1
templates:
  static: [ "c.txt", "a.txt" ]
"#,
            vec![root],
        );

        let statics: Vec<_> = child
            .files(TemplateFileClass::Static)
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        assert_eq!(statics, vec!["c.txt", "a.txt", "b.txt"]);
        assert_eq!(child.files(TemplateFileClass::Dynamic).len(), 1);
    }

    #[test]
    fn test_file_entries_cannot_escape_the_tree() {
        for entry in ["../secret", "/etc/passwd", "a/../../b"] {
            let def = definition(&format!("name: base:escape@1\ntemplates:\n  static: [ \"{}\" ]\n", entry));
            let chain = TemplateChain::new(&def, &[]);
            assert!(Template::new(chain, Value::Null, TemplateKind::Base).is_err(), "{}", entry);
        }
        assert_eq!(relative_file("./config/a.yml"), Some(PathBuf::from("config/a.yml")));
    }

    #[test]
    fn test_illegal_file_class_is_rejected() {
        let def = definition(
            r#"
name: base:broken@1
templates:
  sometimes: [ "a.txt" ]
"#,
        );
        let chain = TemplateChain::new(&def, &[]);
        let err = Template::new(chain, Value::Null, TemplateKind::Base).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidTemplate(_)));
    }

    #[test]
    fn test_chain_lookup_prefers_self_then_parents() {
        let root = base(
            r#"
name: base:root@1
server: { execute: "java -jar server.jar", stop: { wait: 10 } }
"#,
            vec![],
        );
        let def = definition(
            r#"
name: base:child@1
server: { stop: { wait: 3 } }
"#,
        );
        let parents = vec![root];
        let chain = TemplateChain::new(&def, &parents);
        assert_eq!(chain.first_u64(&["server", "stop", "wait"]).unwrap(), Some(3));
        assert_eq!(
            chain.require_string(&["server", "execute"]).unwrap(),
            "java -jar server.jar"
        );
        assert!(chain.require_string(&["vanilla", "version"]).is_err());
    }
}
