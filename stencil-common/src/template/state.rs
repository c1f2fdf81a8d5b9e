use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::error::Error;

/// Lifecycle of a workflow template.
/// ---
/// `Active --archive--> Archived`; nothing leaves `Archived`.
/// Archived templates stay readable but accept no new versions.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TemplateState {
    #[default]
    Active,
    Archived,
}

impl TemplateState {
    pub fn is_archived(&self) -> bool {
        matches!(self, TemplateState::Archived)
    }

    /// Guards every write against the template.
    pub fn ensure_writable(&self, template_id: Uuid) -> Result<(), Error> {
        match self {
            TemplateState::Active => Ok(()),
            TemplateState::Archived => Err(Error::TemplateArchived { template_id }),
        }
    }

    /// Applies the archive transition.
    /// Returns the new state, or `None` if the template was already archived.
    pub fn archive(&self) -> Option<TemplateState> {
        match self {
            TemplateState::Active => Some(TemplateState::Archived),
            TemplateState::Archived => None,
        }
    }
}
