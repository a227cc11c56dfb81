// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for a MyServer node:
// - Kubernetes-style envelope (apiVersion/kind)
// - Storage folders for templates, instances and the build cache
// - Registrar port pool and listen address
// - Supervision timings (readiness probe, build timeout, scan depths)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "myserver.dev/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// API version (must be "myserver.dev/v1")
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub folders: FolderConfig,

    #[serde(default)]
    pub registrar: RegistrarConfig,

    #[serde(default)]
    pub supervision: SupervisionConfig,
}

/// Storage roots. Relative paths are resolved against the directory of the
/// configuration file they were loaded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderConfig {
    #[serde(default = "default_templates_path")]
    pub templates: PathBuf,

    #[serde(default = "default_servers_path")]
    pub servers: PathBuf,

    #[serde(default = "default_cache_path")]
    pub cache: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrarConfig {
    /// Address workers listen on and are announced with
    #[serde(default = "default_ip_listen")]
    pub ip_listen: String,

    /// First port of the reservable range
    #[serde(default = "default_port_start")]
    pub port_start: u16,

    /// Size of the reservable range
    #[serde(default = "default_port_amount")]
    pub port_amount: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// Delay between readiness probes while a worker is STARTING
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Connect timeout of a single readiness probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound for a single external build tool run
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,

    #[serde(default = "default_template_scan_depth")]
    pub template_scan_depth: usize,

    #[serde(default = "default_server_scan_depth")]
    pub server_scan_depth: usize,

    /// Follow symbolic links while scanning storage
    #[serde(default = "default_true")]
    pub follow_links: bool,
}

impl SupervisionConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

fn default_templates_path() -> PathBuf {
    PathBuf::from("templates")
}

fn default_servers_path() -> PathBuf {
    PathBuf::from("servers")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("cache")
}

fn default_ip_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port_start() -> u16 {
    20000
}

fn default_port_amount() -> u16 {
    1000
}

fn default_probe_interval_ms() -> u64 {
    2000
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_build_timeout_secs() -> u64 {
    600
}

fn default_template_scan_depth() -> usize {
    10
}

fn default_server_scan_depth() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            templates: default_templates_path(),
            servers: default_servers_path(),
            cache: default_cache_path(),
        }
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            ip_listen: default_ip_listen(),
            port_start: default_port_start(),
            port_amount: default_port_amount(),
        }
    }
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            build_timeout_secs: default_build_timeout_secs(),
            template_scan_depth: default_template_scan_depth(),
            server_scan_depth: default_server_scan_depth(),
            follow_links: default_true(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            folders: FolderConfig::default(),
            registrar: RegistrarConfig::default(),
            supervision: SupervisionConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Default configuration with every folder placed under `root`.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.resolve_relative_to(root.as_ref());
        config
    }

    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for folder in [
            &mut self.folders.templates,
            &mut self.folders.servers,
            &mut self.folders.cache,
        ] {
            if folder.is_relative() {
                *folder = base.join(&*folder);
            }
        }
    }

    /// Discover configuration file using precedence order
    /// 1. MYSERVER_CONFIG_PATH environment variable
    /// 2. ./myserver-config.yaml (working directory)
    /// 3. ~/.myserver/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("MYSERVER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./myserver-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".myserver").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (Env -> Cwd -> Home)
        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        let overrides = [
            ("MYSERVER_TEMPLATES_PATH", &mut self.folders.templates),
            ("MYSERVER_SERVERS_PATH", &mut self.folders.servers),
            ("MYSERVER_CACHE_PATH", &mut self.folders.cache),
        ];
        for (var, folder) in overrides {
            if let Ok(val) = std::env::var(var) {
                if val.trim().is_empty() {
                    tracing::warn!("Ignoring empty value for {}", var);
                    continue;
                }
                tracing::info!("Environment override: {}={}", var, val);
                *folder = PathBuf::from(val);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.registrar.ip_listen.trim().is_empty() {
            anyhow::bail!("registrar.ip_listen cannot be empty");
        }

        if self.registrar.port_amount == 0 {
            anyhow::bail!("registrar.port_amount must be at least 1");
        }

        if u32::from(self.registrar.port_start) + u32::from(self.registrar.port_amount) > 65536 {
            anyhow::bail!(
                "registrar port range {}+{} exceeds 65535",
                self.registrar.port_start,
                self.registrar.port_amount
            );
        }

        if self.supervision.probe_interval_ms == 0 {
            anyhow::bail!("supervision.probe_interval_ms must be greater than 0");
        }

        if self.supervision.build_timeout_secs == 0 {
            anyhow::bail!("supervision.build_timeout_secs must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert_eq!(config.registrar.port_start, 20000);
        assert_eq!(config.registrar.port_amount, 1000);
        assert_eq!(config.registrar.ip_listen, "127.0.0.1");
        assert_eq!(config.supervision.probe_interval(), Duration::from_secs(2));
        assert_eq!(config.supervision.template_scan_depth, 10);
        assert_eq!(config.supervision.server_scan_depth, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = NodeConfig::from_yaml_str(
            r#"
registrar:
  port_start: 30000
supervision:
  probe_interval_ms: 250
"#,
        )
        .unwrap();
        assert_eq!(config.registrar.port_start, 30000);
        assert_eq!(config.registrar.port_amount, 1000);
        assert_eq!(config.supervision.probe_interval_ms, 250);
        assert_eq!(config.supervision.build_timeout_secs, 600);
        assert_eq!(config.folders.templates, PathBuf::from("templates"));
    }

    #[test]
    fn test_relative_folders_resolve_against_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myserver-config.yaml");
        std::fs::write(
            &path,
            "folders:\n  templates: tpl\n  servers: /srv/myserver\n",
        )
        .unwrap();

        let config = NodeConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.folders.templates, dir.path().join("tpl"));
        assert_eq!(config.folders.servers, PathBuf::from("/srv/myserver"));
        assert_eq!(config.folders.cache, dir.path().join("cache"));
    }

    #[test]
    fn test_validation() {
        let mut config = NodeConfig::default();
        assert!(config.validate().is_ok());

        config.kind = "Other".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.registrar.port_start = 65000;
        config.registrar.port_amount = 1000;
        assert!(config.validate().is_err());
        config.registrar.port_start = 20000;

        config.registrar.port_amount = 0;
        assert!(config.validate().is_err());
    }
}
