use std::{collections::BTreeMap, path::Path};

use async_trait::async_trait;
use serde::Deserialize;
use stencil_common::{
    config::{KNOWN_KEYS, NamespaceConfig, SystemConfig},
    error::Error,
};
use tracing::{debug, error, info};

/// Namespace entry used when a namespace has no entry of its own.
pub const DEFAULT_NAMESPACE_KEY: &str = "default";

/// Configuration resolved for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub system: SystemConfig,
    pub namespace: NamespaceConfig,
}

/// Supplies configuration already resolved from the cluster.
#[async_trait]
pub trait ConfigSource: Send + Sync + std::fmt::Debug + 'static {
    async fn resolve(&self, namespace: &str) -> Result<ResolvedConfig, Error>;
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    system: BTreeMap<String, String>,
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceConfig>,
}

/// Configuration loaded once from a YAML file.
#[derive(Debug, Clone, Default)]
pub struct FileConfigSource {
    system: SystemConfig,
    namespaces: BTreeMap<String, NamespaceConfig>,
}

impl FileConfigSource {
    pub fn new(system: SystemConfig, namespaces: BTreeMap<String, NamespaceConfig>) -> Self {
        Self { system, namespaces }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, Error> {
        let file: ConfigFile = serde_yaml::from_str(yaml).map_err(|e| Error::ConfigParse {
            key: "config file".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            system: SystemConfig::new(file.system),
            namespaces: file.namespaces,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            error!("Failed to read config at {}: {}", path.display(), e);

            Error::Internal(format!("Failed to read config at {}: {}", path.display(), e))
        })?;

        let source = Self::from_yaml_str(&yaml)?;
        info!(
            path = %path.display(),
            namespaces = source.namespaces.len(),
            "Loaded configuration"
        );

        Ok(source)
    }

    /// Overrides system keys with environment variables of the same name.
    /// Only recognised keys are read.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for key in KNOWN_KEYS {
            if let Some(value) = lookup(key) {
                debug!(key, "system config overridden");
                self.system = self.system.with_value(key, value);
            }
        }
        self
    }

    pub fn system(&self) -> &SystemConfig {
        &self.system
    }

    pub fn namespace_config(&self, namespace: &str) -> NamespaceConfig {
        self.namespaces
            .get(namespace)
            .or_else(|| self.namespaces.get(DEFAULT_NAMESPACE_KEY))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn resolve(&self, namespace: &str) -> Result<ResolvedConfig, Error> {
        Ok(ResolvedConfig {
            system: self.system.clone(),
            namespace: self.namespace_config(namespace),
        })
    }
}
