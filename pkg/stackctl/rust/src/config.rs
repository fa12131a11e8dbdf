// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::supervisor::SupervisorKind;
use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/stackctl/services.yaml";
const CONFIG_ENV: &str = "STACKCTL_CONFIG";

/// Settings for every managed service. Built once and shared read-only.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub data_store: DataStoreConfig,
    pub proxy: ProxyConfig,
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataStoreConfig {
    /// `host:port` the ping utility connects to.
    pub address: String,
    pub password: Option<String>,
    pub unit: String,
    pub binary: PathBuf,
    pub config: PathBuf,
    pub cli: String,
    pub log_file: PathBuf,
    /// Prefix mutating service-manager commands with `sudo`.
    pub sudo: bool,
    pub backend: SupervisorKind,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            address: "localhost:6379".to_string(),
            password: None,
            unit: "redis-server".to_string(),
            binary: PathBuf::from("/usr/bin/redis-server"),
            config: PathBuf::from("/etc/redis/redis.conf"),
            cli: "redis-cli".to_string(),
            log_file: PathBuf::from("/var/log/redis/redis-server.log"),
            sudo: true,
            backend: SupervisorKind::Systemd,
        }
    }
}

impl DataStoreConfig {
    /// Host and port of `address`. A missing port falls back to 6379.
    pub fn host_port(&self) -> Result<(String, u16)> {
        match self.address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .with_context(|| format!("invalid data store port in {:?}", self.address))?;
                if host.is_empty() {
                    bail!("missing data store host in {:?}", self.address);
                }
                Ok((host.to_string(), port))
            }
            None => Ok((self.address.clone(), 6379)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    pub working_dir: PathBuf,
    pub binary: PathBuf,
    pub config: PathBuf,
    pub log_file: PathBuf,
    pub session: String,
    pub ports: Vec<u16>,
    pub backend: SupervisorKind,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/opt/stack/proxy"),
            binary: PathBuf::from("proxy"),
            config: PathBuf::from("config.toml"),
            log_file: PathBuf::from("proxy.log"),
            session: "proxy".to_string(),
            ports: vec![80, 443],
            backend: SupervisorKind::Session,
        }
    }
}

impl ProxyConfig {
    pub fn binary_path(&self) -> PathBuf {
        resolve(&self.working_dir, &self.binary)
    }

    pub fn config_path(&self) -> PathBuf {
        resolve(&self.working_dir, &self.config)
    }

    pub fn log_path(&self) -> PathBuf {
        resolve(&self.working_dir, &self.log_file)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutomationConfig {
    pub working_dir: PathBuf,
    /// Entry point that must exist before launching.
    pub binary: PathBuf,
    pub config: PathBuf,
    pub log_file: PathBuf,
    pub session: String,
    pub command: Vec<String>,
    pub api_port: u16,
    pub health_path: String,
    pub backend: SupervisorKind,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/opt/stack/automation"),
            binary: PathBuf::from("worker.js"),
            config: PathBuf::from("config.toml"),
            log_file: PathBuf::from("logs/startup.log"),
            session: "automation".to_string(),
            command: vec!["npm".to_string(), "start".to_string()],
            api_port: 3000,
            health_path: "/health".to_string(),
            backend: SupervisorKind::Session,
        }
    }
}

impl AutomationConfig {
    pub fn binary_path(&self) -> PathBuf {
        resolve(&self.working_dir, &self.binary)
    }

    pub fn config_path(&self) -> PathBuf {
        resolve(&self.working_dir, &self.config)
    }

    pub fn log_path(&self) -> PathBuf {
        resolve(&self.working_dir, &self.log_file)
    }

    pub fn health_url(&self) -> String {
        let path = if self.health_path.starts_with('/') {
            self.health_path.clone()
        } else {
            format!("/{}", self.health_path)
        };
        format!("http://127.0.0.1:{}{path}", self.api_port)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Configuration file to load: `explicit` if given, then `$STACKCTL_CONFIG`,
/// then the system-wide file when it exists. `None` means built-in defaults.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV)
        && !path.is_empty()
    {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    default.exists().then_some(default)
}

pub fn load_config(path: &Path) -> Result<ServiceConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: ServiceConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    config
        .data_store
        .host_port()
        .with_context(|| format!("validating {}", path.display()))?;
    debug!("loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve and load the configuration, falling back to defaults.
pub fn load(explicit: Option<&Path>) -> Result<ServiceConfig> {
    match config_path(explicit) {
        Some(path) => load_config(&path),
        None => {
            info!("no configuration file found, using defaults");
            Ok(ServiceConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.data_store.address, "localhost:6379");
        assert_eq!(config.data_store.backend, SupervisorKind::Systemd);
        assert!(config.data_store.sudo);
        assert_eq!(config.proxy.ports, vec![80, 443]);
        assert_eq!(config.proxy.backend, SupervisorKind::Session);
        assert_eq!(config.automation.command, vec!["npm", "start"]);
        assert_eq!(config.automation.health_url(), "http://127.0.0.1:3000/health");
    }

    #[test]
    fn test_relative_paths_resolve_against_working_dir() {
        let config = ServiceConfig::default();
        assert_eq!(
            config.proxy.log_path(),
            PathBuf::from("/opt/stack/proxy/proxy.log")
        );
        assert_eq!(
            config.automation.log_path(),
            PathBuf::from("/opt/stack/automation/logs/startup.log")
        );

        let mut proxy = config.proxy.clone();
        proxy.config = PathBuf::from("/etc/proxy/config.toml");
        assert_eq!(proxy.config_path(), PathBuf::from("/etc/proxy/config.toml"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.yaml");
        let yaml = r#"
data_store:
  address: 10.0.0.5:6380
  password: hunter2
  sudo: false
proxy:
  working_dir: /srv/proxy
  ports: [8080]
automation:
  api_port: 3100
  health_path: ready
"#;
        fs::write(&path, yaml).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.data_store.host_port().unwrap(),
            ("10.0.0.5".to_string(), 6380)
        );
        assert_eq!(config.data_store.password.as_deref(), Some("hunter2"));
        assert!(!config.data_store.sudo);
        assert_eq!(config.data_store.unit, "redis-server");
        assert_eq!(config.proxy.ports, vec![8080]);
        assert_eq!(config.proxy.binary_path(), PathBuf::from("/srv/proxy/proxy"));
        assert_eq!(config.proxy.session, "proxy");
        assert_eq!(config.automation.health_url(), "http://127.0.0.1:3100/ready");
    }

    #[test]
    fn test_backend_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.yaml");
        fs::write(&path, "data_store:\n  backend: container\n  unit: redis\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.data_store.backend, SupervisorKind::Container);
        assert_eq!(config.data_store.unit, "redis");
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.yaml");
        fs::write(&path, "proxy: [not: valid").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }

    #[test]
    fn test_invalid_address_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.yaml");
        fs::write(&path, "data_store:\n  address: localhost:redis\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(load_config(Path::new("/nonexistent/services.yaml")).is_err());
    }

    #[test]
    fn test_address_without_port() {
        let config = DataStoreConfig {
            address: "cache.internal".to_string(),
            ..DataStoreConfig::default()
        };
        assert_eq!(
            config.host_port().unwrap(),
            ("cache.internal".to_string(), 6379)
        );
    }

    #[test]
    fn test_config_path_explicit_wins() {
        temp_env::with_var(CONFIG_ENV, Some("/from/env.yaml"), || {
            assert_eq!(
                config_path(Some(Path::new("/from/flag.yaml"))),
                Some(PathBuf::from("/from/flag.yaml"))
            );
        });
    }

    #[test]
    fn test_config_path_from_env() {
        temp_env::with_var(CONFIG_ENV, Some("/from/env.yaml"), || {
            assert_eq!(config_path(None), Some(PathBuf::from("/from/env.yaml")));
        });
    }

    #[test]
    fn test_load_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.yaml");
        fs::write(&path, "proxy:\n  session: edge\n").unwrap();
        temp_env::with_var(CONFIG_ENV, Some(path.to_str().unwrap()), || {
            let config = load(None).unwrap();
            assert_eq!(config.proxy.session, "edge");
        });
    }
}
