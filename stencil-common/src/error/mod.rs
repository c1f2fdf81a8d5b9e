use std::fmt::Debug;

use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Resource Not Found: {resource_type} with ID {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("Resource Already Exists: {resource_type} {resource_id}")]
    AlreadyExists {
        resource_type: String,
        resource_id: String,
    },

    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    #[error("Template {template_id} is archived and cannot be modified")]
    TemplateArchived { template_id: Uuid },

    #[error("Invalid Manifest: {0}")]
    InvalidManifest(String),

    #[error("Unknown Node Pool: no option with value '{value}'")]
    UnknownNodePool { value: String },

    #[error("Configuration Parse Error for key '{key}': {message}")]
    ConfigParse { key: String, message: String },

    #[error("Missing Configuration: '{key}' is required")]
    MissingConfig { key: String },

    #[error("Conflict Error: {0}")]
    Conflict(String),

    #[error("Operation Cancelled")]
    Cancelled,

    #[error("Operation Timed Out")]
    Timeout,

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl Error {
    pub fn template_not_found(template_id: Uuid) -> Self {
        Error::NotFound {
            resource_type: "WorkflowTemplate".to_string(),
            resource_id: template_id.to_string(),
        }
    }

    pub fn version_not_found(template_id: Uuid, version: u32) -> Self {
        Error::NotFound {
            resource_type: "WorkflowTemplateVersion".to_string(),
            resource_id: format!("{template_id}@{version}"),
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Timeout)
    }
}
