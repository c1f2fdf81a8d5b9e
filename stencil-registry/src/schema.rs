//! Typed view of a workflow manifest.
//!
//! Only the parts generation touches are modelled; every other key is
//! kept in an `extra` mapping and written back unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use stencil_common::{
    common::scalar,
    config::{ResourceRequirements, SecretKeySelector},
    template::Parameter,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,

    #[serde(default)]
    pub templates: Vec<StepTemplate>,

    #[serde(flatten)]
    pub extra: Mapping,
}

impl Manifest {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.arguments.parameters.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    #[serde(flatten)]
    pub extra: Mapping,
}

impl Arguments {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.extra.is_empty()
    }
}

/// One entry of the manifest's `templates` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTemplate {
    pub name: String,

    /// Node pool reference; replaced by a node selector during generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pool: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "scalar::string_map"
    )]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,

    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(flatten)]
    pub extra: Mapping,
}

impl Container {
    pub fn has_resources(&self) -> bool {
        self.resources.as_ref().is_some_and(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Artifact>,

    #[serde(flatten)]
    pub extra: Mapping,
}

/// S3 location of an artifact; unset fields come from the namespace config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_secret: Option<SecretKeySelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_secret: Option<SecretKeySelector>,
}
