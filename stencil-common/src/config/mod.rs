use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;

mod artifact;
mod node_pool;

pub use artifact::{
    ArtifactRepositoryConfig, ArtifactRepositoryS3Config, NamespaceConfig, POD_NAME_PLACEHOLDER,
    SecretKeySelector, WORKFLOW_NAME_PLACEHOLDER, WORKFLOW_NAMESPACE_PLACEHOLDER, format_key,
};
pub use node_pool::{NodePoolOption, ParameterOption, Quantity, ResourceRequirements};

pub const DOMAIN_KEY: &str = "ONEPANEL_DOMAIN";
pub const API_URL_KEY: &str = "ONEPANEL_API_URL";
pub const FQDN_KEY: &str = "ONEPANEL_FQDN";
pub const NODE_POOL_LABEL_KEY: &str = "applicationNodePoolLabel";
pub const NODE_POOL_OPTIONS_KEY: &str = "applicationNodePoolOptions";
pub const DATABASE_DRIVER_NAME_KEY: &str = "databaseDriverName";

/// Every key the system configuration recognises.
pub const KNOWN_KEYS: [&str; 6] = [
    DOMAIN_KEY,
    API_URL_KEY,
    FQDN_KEY,
    NODE_POOL_LABEL_KEY,
    NODE_POOL_OPTIONS_KEY,
    DATABASE_DRIVER_NAME_KEY,
];

const HTTPS_PROTOCOL: &str = "https://";
const HTTP_PROTOCOL: &str = "http://";

/// Deployment scoped configuration, resolved ahead of time from the cluster.
/// ---
/// An immutable string keyed view. Absent keys are reported as `None`
/// and logged; callers decide whether absence is fatal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemConfig(BTreeMap<String, String>);

impl SystemConfig {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    /// Returns the raw value for `key`, or `None` if it does not exist.
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = self.0.get(key).map(String::as_str);

        if value.is_none() {
            debug!(key, "system config value does not exist");
        }

        value
    }

    pub fn domain(&self) -> Option<&str> {
        self.get(DOMAIN_KEY)
    }

    pub fn api_url(&self) -> Option<&str> {
        self.get(API_URL_KEY)
    }

    /// Either `https://` or `http://`, derived from the API URL.
    /// Anything not starting with `https://` is treated as `http://`.
    pub fn api_protocol(&self) -> Option<&'static str> {
        let url = self.api_url()?;

        if url.starts_with(HTTPS_PROTOCOL) {
            Some(HTTPS_PROTOCOL)
        } else {
            Some(HTTP_PROTOCOL)
        }
    }

    pub fn fqdn(&self) -> Option<&str> {
        self.get(FQDN_KEY)
    }

    pub fn node_pool_label(&self) -> Option<&str> {
        self.get(NODE_POOL_LABEL_KEY)
    }

    pub fn database_driver_name(&self) -> Option<&str> {
        self.get(DATABASE_DRIVER_NAME_KEY)
    }

    /// Parses the node pool options list.
    /// ---
    /// Unlike the plain accessors this fails when the key is absent,
    /// since there is nothing meaningful to return.
    pub fn node_pool_options(&self) -> Result<Vec<NodePoolOption>, Error> {
        let data = self.get(NODE_POOL_OPTIONS_KEY).ok_or_else(|| Error::ConfigParse {
            key: NODE_POOL_OPTIONS_KEY.to_string(),
            message: "no node pool options in config".to_string(),
        })?;

        if data.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_yaml::from_str::<Vec<NodePoolOption>>(data).map_err(|e| Error::ConfigParse {
            key: NODE_POOL_OPTIONS_KEY.to_string(),
            message: e.to_string(),
        })
    }

    /// First option whose `value` matches, in list order.
    pub fn node_pool_option_by_value(&self, value: &str) -> Result<Option<NodePoolOption>, Error> {
        Ok(self
            .node_pool_options()?
            .into_iter()
            .find(|opt| opt.value == value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = self.0.clone();
        values.insert(key.into(), value.into());
        Self(values)
    }
}

impl<K, V> FromIterator<(K, V)> for SystemConfig
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
