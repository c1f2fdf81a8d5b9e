use serde::{Deserialize, Serialize};

use crate::{common::scalar, config::ParameterOption};

/// Parameter type whose options come from the configured node pools.
pub const NODE_POOL_PARAMETER_TYPE: &str = "select.nodepool";

/// Workflow level parameter holding the default node pool.
pub const NODE_POOL_PARAMETER_NAME: &str = "sys-node-pool";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,

    #[serde(
        default,
        deserialize_with = "scalar::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParameterOption>,
}

impl Parameter {
    pub fn is_node_pool(&self) -> bool {
        self.param_type.as_deref() == Some(NODE_POOL_PARAMETER_TYPE)
    }
}
