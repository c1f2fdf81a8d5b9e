use std::str::FromStr;

use serde_json::{Map, Value};
use strum_macros::{Display, EnumString};

use crate::error::Error;

use super::WorkflowTemplate;

/// An attribute that can be requested in a field projected listing.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "camelCase")]
pub enum TemplateField {
    Id,
    Uid,
    Name,
    Namespace,
    Version,
    CreatedAt,
    ModifiedAt,
    Archived,
    Labels,
}

impl TemplateField {
    pub fn extract(&self, template: &WorkflowTemplate) -> Value {
        let info = &template.info;

        match self {
            TemplateField::Id => Value::String(info.id.to_string()),
            TemplateField::Uid => Value::String(info.uid.clone()),
            TemplateField::Name => Value::String(info.name.clone()),
            TemplateField::Namespace => Value::String(info.namespace.clone()),
            TemplateField::Version => Value::from(template.version.version),
            TemplateField::CreatedAt => Value::String(info.created_at.to_rfc3339()),
            TemplateField::ModifiedAt => Value::String(info.modified_at.to_rfc3339()),
            TemplateField::Archived => Value::Bool(info.state.is_archived()),
            TemplateField::Labels => Value::Object(
                info.labels
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }
}

/// De-duplicated set of requested fields.
/// Projected records keep the order in which fields were first requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSelector(Vec<TemplateField>);

impl FieldSelector {
    pub fn new(fields: Vec<TemplateField>) -> Self {
        let mut unique = Vec::with_capacity(fields.len());
        for field in fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        Self(unique)
    }

    pub fn fields(&self) -> &[TemplateField] {
        &self.0
    }

    pub fn project(&self, template: &WorkflowTemplate) -> Map<String, Value> {
        self.0
            .iter()
            .map(|field| (field.to_string(), field.extract(template)))
            .collect()
    }
}

impl FromStr for FieldSelector {
    type Err = Error;

    /// Parses a comma separated list such as `name,version`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| {
                TemplateField::from_str(f)
                    .map_err(|_| Error::InvalidInput(format!("unknown template field '{f}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if fields.is_empty() {
            return Err(Error::InvalidInput(
                "field selector must name at least one field".to_string(),
            ));
        }

        Ok(Self::new(fields))
    }
}
