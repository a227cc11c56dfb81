// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Template Resolver
//!
//! Turns template names into resolved [`Template`]s: finds definitions
//! through the registered loaders, resolves their parents, merges the
//! configuration documents and hands the chain to the factory registered
//! for the template's type.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Inheritance resolution, type dispatch and the instance cache
//!
//! Resolved templates are cached by full name as weak references, so an
//! unused template is dropped and rebuilt identically on the next request.
//! Parent cycles are detected per resolution with the chain of names being
//! constructed; concurrent resolutions never block each other.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::domain::template::{
    Template, TemplateChain, TemplateClass, TemplateDefinition, TemplateError, TemplateFactory,
    TemplateLoader,
};
use crate::infrastructure::manifest_parser::merge_documents;

#[derive(Default)]
pub struct TemplateResolver {
    types: RwLock<BTreeMap<String, TemplateFactory>>,
    loaders: RwLock<BTreeMap<String, Arc<dyn TemplateLoader>>>,
    instances: DashMap<String, Weak<Template>>,
}

impl TemplateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers the factory for templates whose type starts with `prefix`.
    /// The longest registered prefix of a type wins.
    pub fn register_type(&self, prefix: impl Into<String>, factory: TemplateFactory) {
        self.types.write().insert(prefix.into(), factory);
    }

    pub fn register_loader(&self, name: impl Into<String>, loader: Arc<dyn TemplateLoader>) {
        self.loaders.write().insert(name.into(), loader);
    }

    fn loaders(&self) -> Vec<Arc<dyn TemplateLoader>> {
        self.loaders.read().values().cloned().collect()
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Definitions matching `partial` across every loader.
    pub async fn find_by_name(
        &self,
        partial: &str,
    ) -> Result<Vec<Arc<TemplateDefinition>>, TemplateError> {
        let mut found = Vec::new();
        for loader in self.loaders() {
            found.extend(loader.find_by_name(partial).await?);
        }
        Ok(found)
    }

    /// Every known definition, one per full name, sorted by full name.
    pub async fn list_templates(&self) -> Result<Vec<Arc<TemplateDefinition>>, TemplateError> {
        let mut by_name: BTreeMap<String, Arc<TemplateDefinition>> = BTreeMap::new();
        for loader in self.loaders() {
            for definition in loader.definitions().await? {
                by_name.entry(definition.name.full()).or_insert(definition);
            }
        }
        Ok(by_name.into_values().collect())
    }

    /// Resolves every known definition of `class`. Definitions that fail to
    /// resolve are logged and skipped.
    pub async fn templates(&self, class: TemplateClass) -> Result<Vec<Arc<Template>>, TemplateError> {
        let mut resolved = Vec::new();
        for definition in self.list_templates().await? {
            match self.instantiate(Arc::clone(&definition)).await {
                Ok(template) if template.is(class) => resolved.push(template),
                Ok(_) => {}
                Err(e) => warn!("Skipping template {}: {}", definition.name, e),
            }
        }
        self.purge();
        Ok(resolved)
    }

    /// Cached template for `full_name`, if one is still alive.
    pub fn cached(&self, full_name: &str) -> Option<Arc<Template>> {
        self.instances.get(full_name).and_then(|weak| weak.upgrade())
    }

    /// Drops cache entries whose templates are gone.
    pub fn purge(&self) {
        self.instances.retain(|_, weak| weak.strong_count() > 0);
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolves `name` (full or partial) to a template of `class`.
    ///
    /// When several versions match, the highest wins.
    pub async fn resolve(&self, name: &str, class: TemplateClass) -> Result<Arc<Template>, TemplateError> {
        let mut chain = Vec::new();
        let template = self.resolve_with(name, &mut chain).await?;
        if !template.is(class) {
            return Err(TemplateError::InvalidTemplate(format!(
                "{} is not a {}",
                template.full_name(),
                class
            )));
        }
        Ok(template)
    }

    /// Resolves a specific definition.
    pub async fn instantiate(&self, definition: Arc<TemplateDefinition>) -> Result<Arc<Template>, TemplateError> {
        let mut chain = Vec::new();
        self.instantiate_with(definition, &mut chain).await
    }

    fn resolve_with<'a>(
        &'a self,
        name: &'a str,
        chain: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<Arc<Template>, TemplateError>> {
        async move {
            if let Some(template) = self.cached(name) {
                return Ok(template);
            }
            let best = self
                .find_by_name(name)
                .await?
                .into_iter()
                .max_by(|a, b| a.name.version.cmp(&b.name.version))
                .ok_or_else(|| TemplateError::NoSuchTemplate(name.to_string()))?;
            self.instantiate_with(best, chain).await
        }
        .boxed()
    }

    fn instantiate_with<'a>(
        &'a self,
        definition: Arc<TemplateDefinition>,
        chain: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<Arc<Template>, TemplateError>> {
        async move {
            let full_name = definition.name.full();
            if let Some(template) = self.cached(&full_name) {
                return Ok(template);
            }
            if chain.contains(&full_name) {
                return Err(TemplateError::InvalidTemplate(format!(
                    "Cyclic template dependency: {} -> {}",
                    chain.join(" -> "),
                    full_name
                )));
            }

            chain.push(full_name.clone());
            let mut parents = Vec::with_capacity(definition.parents.len());
            let mut failure = None;
            for parent in &definition.parents {
                match self.resolve_with(parent, chain).await {
                    Ok(template) => parents.push(template),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            chain.pop();
            if let Some(e) = failure {
                return Err(e);
            }

            let template = Arc::new(self.construct(&definition, &parents)?);
            debug!("Resolved template {}", full_name);
            Ok(self.remember(&full_name, template))
        }
        .boxed()
    }

    fn construct(
        &self,
        definition: &Arc<TemplateDefinition>,
        parents: &[Arc<Template>],
    ) -> Result<Template, TemplateError> {
        let factory = self.factory_for(&definition.name.kind)?;
        // Declaration order: a later parent overrides an earlier one.
        let inherited = parents
            .iter()
            .fold(Value::Null, |acc, parent| merge_documents(&acc, parent.config()));
        let config = merge_documents(&inherited, &definition.document);

        let chain = TemplateChain::new(definition, parents);
        let kind = factory(&chain)?;
        Template::new(chain, config, kind)
    }

    /// Factory of the longest registered prefix of `kind`.
    fn factory_for(&self, kind: &str) -> Result<TemplateFactory, TemplateError> {
        let types = self.types.read();
        let mut prefix = kind;
        loop {
            if let Some(factory) = types.get(prefix) {
                return Ok(Arc::clone(factory));
            }
            let mut chars = prefix.chars();
            if chars.next_back().is_none() {
                break;
            }
            prefix = chars.as_str();
        }
        Err(TemplateError::InvalidTemplate(format!(
            "No registered type matches {}",
            kind
        )))
    }

    /// Caches `template` unless another resolution got there first, in
    /// which case that one is returned.
    fn remember(&self, full_name: &str, template: Arc<Template>) -> Arc<Template> {
        match self.instances.entry(full_name.to_string()) {
            Entry::Occupied(mut slot) => {
                if let Some(existing) = slot.get().upgrade() {
                    return existing;
                }
                slot.insert(Arc::downgrade(&template));
                template
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(&template));
                template
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::server_template::{ServerSettings, ServerTemplate};
    use crate::domain::template::{lookup, TemplateKind};
    use crate::infrastructure::manifest_parser::ManifestParser;
    use async_trait::async_trait;
    use std::path::Path;

    struct StaticLoader(Vec<Arc<TemplateDefinition>>);

    #[async_trait]
    impl TemplateLoader for StaticLoader {
        async fn definitions(&self) -> Result<Vec<Arc<TemplateDefinition>>, TemplateError> {
            Ok(self.0.clone())
        }
    }

    fn resolver(manifests: &[&str]) -> TemplateResolver {
        let definitions = manifests
            .iter()
            .map(|yaml| Arc::new(ManifestParser::parse_template_yaml(yaml, Path::new("/templates/x")).unwrap()))
            .collect();
        let resolver = TemplateResolver::new();
        resolver.register_loader("static", Arc::new(StaticLoader(definitions)));
        resolver.register_type("base", Arc::new(base_factory));
        resolver.register_type("server/vanilla", Arc::new(server_factory));
        resolver
    }

    fn base_factory(_: &TemplateChain<'_>) -> Result<TemplateKind, TemplateError> {
        Ok(TemplateKind::Base)
    }

    fn server_factory(chain: &TemplateChain<'_>) -> Result<TemplateKind, TemplateError> {
        let settings = ServerSettings::from_chain(chain)?;
        Ok(TemplateKind::Server(ServerTemplate::new(settings, None)))
    }

    #[tokio::test]
    async fn test_nearest_tag_and_config_win() {
        let resolver = resolver(&[
            r#"
name: base:common@1
tags:
  motd: { default: parent }
  difficulty: { type: choice, choices: [easy, hard], default: easy }
server:
  execute: "sh parent.sh"
  stop: { wait: 5 }
"#,
            r#"
name: server/vanilla:lobby@1
parents: [ "base:common@1" ]
tags:
  motd: { default: child }
server:
  execute: "sh child.sh"
"#,
        ]);

        let template = resolver.resolve("lobby", TemplateClass::Server).await.unwrap();
        assert_eq!(template.tag("motd").unwrap().default_value.as_deref(), Some("child"));
        assert_eq!(template.tag("difficulty").unwrap().default_value.as_deref(), Some("easy"));
        assert_eq!(
            lookup(template.config(), &["server", "execute"]).and_then(Value::as_str),
            Some("sh child.sh")
        );
        assert_eq!(
            lookup(template.config(), &["server", "stop", "wait"]).and_then(Value::as_u64),
            Some(5)
        );
        let settings = template.server().unwrap().settings();
        assert_eq!(settings.execute.as_deref(), Some("sh child.sh"));
        assert_eq!(settings.stop_wait.as_secs(), 5);
        assert_eq!(template.lineage().len(), 2);
    }

    #[tokio::test]
    async fn test_multiple_parents() {
        let resolver = resolver(&[
            r#"
name: base:root@1
tags:
  motd: { default: root }
  seed: { default: root }
x: from-root
y: from-root
"#,
            r#"
name: base:a@1
parents: [ "base:root@1" ]
tags:
  level: { default: a }
x: from-a
"#,
            r#"
name: base:b@1
tags:
  motd: { default: b }
  level: { default: b }
  extra: { default: b }
x: from-b
y: from-b
"#,
            r#"
name: base:c@1
parents: [ "base:a@1", "base:b@1" ]
tags:
  seed: { default: c }
"#,
        ]);

        let template = resolver.resolve("c", TemplateClass::Any).await.unwrap();
        let default = |name: &str| template.tag(name).unwrap().default_value.clone().unwrap();

        // Tags: first definition in a depth-first walk (c, a, root, b) wins.
        assert_eq!(default("seed"), "c");
        assert_eq!(default("level"), "a");
        assert_eq!(default("motd"), "root");
        assert_eq!(default("extra"), "b");

        // Config: parents merged in declaration order, so the later parent wins.
        let value = |key: &str| {
            lookup(template.config(), &[key])
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        assert_eq!(value("x").as_deref(), Some("from-b"));
        assert_eq!(value("y").as_deref(), Some("from-b"));

        let lineage: Vec<String> = template.lineage().iter().map(|t| t.full_name()).collect();
        assert_eq!(lineage, ["base:c@1", "base:a@1", "base:root@1", "base:b@1"]);
    }

    #[tokio::test]
    async fn test_cycle_fails_without_hanging() {
        let resolver = resolver(&[
            "name: base:a@1\nparents: [ \"base:b@1\" ]",
            "name: base:b@1\nparents: [ \"base:a@1\" ]",
            "name: base:c@1",
        ]);

        for _ in 0..2 {
            let err = resolver.resolve("base:a@1", TemplateClass::Any).await.unwrap_err();
            assert!(matches!(err, TemplateError::InvalidTemplate(ref m) if m.contains("Cyclic")));
        }
        assert!(resolver.resolve("base:c@1", TemplateClass::Any).await.is_ok());
    }

    #[tokio::test]
    async fn test_versioned_type_matches_registered_prefix() {
        let resolver = resolver(&["name: server/vanilla/1.0:test@1.0\nserver: { execute: \"sh run.sh\" }"]);
        let template = resolver
            .resolve("server/vanilla/1.0:test@1.0", TemplateClass::Server)
            .await
            .unwrap();
        assert!(template.server().is_some());
    }

    #[tokio::test]
    async fn test_unknown_type_and_wrong_class() {
        let resolver = resolver(&["name: proxy:edge@1", "name: base:plain@1"]);
        assert!(matches!(
            resolver.resolve("edge", TemplateClass::Any).await,
            Err(TemplateError::InvalidTemplate(_))
        ));
        assert!(matches!(
            resolver.resolve("plain", TemplateClass::Server).await,
            Err(TemplateError::InvalidTemplate(_))
        ));
        assert!(matches!(
            resolver.resolve("missing", TemplateClass::Any).await,
            Err(TemplateError::NoSuchTemplate(_))
        ));
    }

    #[tokio::test]
    async fn test_highest_version_wins() {
        let resolver = resolver(&["name: base:a@1.2", "name: base:a@1.10", "name: base:a@1.9-rc1"]);
        let template = resolver.resolve("base:a", TemplateClass::Any).await.unwrap();
        assert_eq!(template.full_name(), "base:a@1.10");
    }

    #[tokio::test]
    async fn test_cache_returns_live_instance() {
        let resolver = resolver(&["name: base:a@1"]);
        let first = resolver.resolve("base:a@1", TemplateClass::Any).await.unwrap();
        let second = resolver.resolve("base:a@1", TemplateClass::Any).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        drop(first);
        drop(second);
        resolver.purge();
        assert!(resolver.cached("base:a@1").is_none());
    }

    #[tokio::test]
    async fn test_list_and_filter_templates() {
        let resolver = resolver(&[
            "name: base:common@1",
            "name: server/vanilla:lobby@1\nparents: [ common ]",
            "name: proxy:edge@1",
        ]);
        assert_eq!(resolver.list_templates().await.unwrap().len(), 3);

        let servers = resolver.templates(TemplateClass::Server).await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].full_name(), "server/vanilla:lobby@1");
    }
}
