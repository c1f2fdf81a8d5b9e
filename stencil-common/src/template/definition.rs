use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Parameter, TemplateState};

/// Identity and lifecycle of a template, shared by all of its versions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub id: Uuid,
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub state: TemplateState,
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl TemplateInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            uid: uid_from_name(&name),
            name,
            namespace: namespace.into(),
            state: TemplateState::Active,
            labels: BTreeMap::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }
}

/// Raw manifest plus everything generation derived from it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionContent {
    pub manifest: String,
    pub generated_manifest: String,
    pub parameters: Vec<Parameter>,
}

/// An immutable snapshot of a template's content.
/// ---
/// `template_id` is a lookup key only; versions are owned by the
/// template's append log, never the other way around.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub id: Uuid,
    pub template_id: Uuid,
    pub version: u32,
    pub content: VersionContent,
    pub created_at: DateTime<Utc>,
}

impl TemplateVersion {
    pub fn new(template_id: Uuid, version: u32, content: VersionContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_id,
            version,
            content,
            created_at: Utc::now(),
        }
    }

    /// Copies this version under another template, with a fresh id.
    pub fn copy_to(&self, template_id: Uuid, version: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_id,
            version,
            content: self.content.clone(),
            created_at: Utc::now(),
        }
    }
}

/// A template as seen through one of its versions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub info: TemplateInfo,
    pub version: TemplateVersion,
}

impl WorkflowTemplate {
    pub fn new(info: TemplateInfo, version: TemplateVersion) -> Self {
        Self { info, version }
    }

    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn version_number(&self) -> u32 {
        self.version.version
    }

    pub fn manifest(&self) -> &str {
        &self.version.content.manifest
    }

    pub fn generated_manifest(&self) -> &str {
        &self.version.content.generated_manifest
    }

    pub fn is_archived(&self) -> bool {
        self.info.state.is_archived()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFilter {
    pub include_archived: bool,
}

impl TemplateFilter {
    pub fn admits(&self, info: &TemplateInfo) -> bool {
        self.include_archived || !info.state.is_archived()
    }
}

/// Lowercase slug of a template name, used as its stable external uid.
pub fn uid_from_name(name: &str) -> String {
    let mut uid = String::with_capacity(name.len());

    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            uid.push(c.to_ascii_lowercase());
        } else if !uid.ends_with('-') {
            uid.push('-');
        }
    }

    uid.trim_matches('-').to_string()
}
