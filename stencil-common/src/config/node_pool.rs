use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::common::scalar;

/// A selectable `value`/`label` pair shown to users for a parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterOption {
    #[serde(deserialize_with = "scalar::string")]
    pub value: String,

    #[serde(alias = "name", default, deserialize_with = "scalar::string")]
    pub label: String,
}

/// A resource quantity such as `2`, `500m` or `8Gi`, kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Quantity(String);

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        scalar::string(deserializer).map(Quantity)
    }
}

impl Quantity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Compute requests and limits, keyed by resource name (`cpu`, `memory`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

impl ResourceRequirements {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }

    pub fn cpu_request(&self) -> Option<&Quantity> {
        self.requests.get("cpu")
    }

    pub fn memory_request(&self) -> Option<&Quantity> {
        self.requests.get("memory")
    }

    pub fn cpu_limit(&self) -> Option<&Quantity> {
        self.limits.get("cpu")
    }

    pub fn memory_limit(&self) -> Option<&Quantity> {
        self.limits.get("memory")
    }
}

/// A named compute profile a manifest may select.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolOption {
    #[serde(flatten)]
    pub option: ParameterOption,

    #[serde(default)]
    pub resources: ResourceRequirements,
}

impl std::ops::Deref for NodePoolOption {
    type Target = ParameterOption;

    fn deref(&self) -> &Self::Target {
        &self.option
    }
}
