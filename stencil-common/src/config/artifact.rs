use serde::{Deserialize, Serialize};

pub const WORKFLOW_NAMESPACE_PLACEHOLDER: &str = "{{workflow.namespace}}";
pub const WORKFLOW_NAME_PLACEHOLDER: &str = "{{workflow.name}}";
pub const POD_NAME_PLACEHOLDER: &str = "{{pod.name}}";

/// Replaces every occurrence of the recognised key placeholders.
/// ---
/// Substitution is literal and happens in a fixed order: namespace,
/// then workflow name, then pod name. Unrecognised placeholders are
/// left untouched.
pub fn format_key(key_format: &str, namespace: &str, workflow_name: &str, pod_name: &str) -> String {
    key_format
        .replace(WORKFLOW_NAMESPACE_PLACEHOLDER, namespace)
        .replace(WORKFLOW_NAME_PLACEHOLDER, workflow_name)
        .replace(POD_NAME_PLACEHOLDER, pod_name)
}

/// Reference to a single key inside a secret.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRepositoryS3Config {
    pub key_format: String,
    pub bucket: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_secret: Option<SecretKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_secret: Option<SecretKeySelector>,
    #[serde(default, skip_serializing)]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret_key: Option<String>,
}

impl ArtifactRepositoryS3Config {
    pub fn format_key(&self, namespace: &str, workflow_name: &str, pod_name: &str) -> String {
        format_key(&self.key_format, namespace, workflow_name, pod_name)
    }

    pub fn has_inline_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRepositoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<ArtifactRepositoryS3Config>,
}

/// Configuration effective for a single namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceConfig {
    #[serde(default)]
    pub artifact_repository: ArtifactRepositoryConfig,
}
