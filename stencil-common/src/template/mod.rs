mod definition;
mod parameter;
mod projection;
mod state;

pub use definition::{
    TemplateFilter, TemplateInfo, TemplateVersion, VersionContent, WorkflowTemplate, uid_from_name,
};
pub use parameter::{NODE_POOL_PARAMETER_NAME, NODE_POOL_PARAMETER_TYPE, Parameter};
pub use projection::{FieldSelector, TemplateField};
pub use state::TemplateState;
