use std::collections::HashSet;

use stencil_common::error::Error;

use crate::schema::Manifest;

/// Parses and validates raw manifest content.
/// ---
/// Fails with `InvalidManifest` on malformed YAML, on a manifest without
/// templates, on duplicate template names, or on an entrypoint that names
/// no template.
pub fn parse_manifest(raw: &str) -> Result<Manifest, Error> {
    if raw.trim().is_empty() {
        return Err(Error::InvalidManifest("manifest is empty".to_string()));
    }

    let manifest: Manifest = serde_yaml::from_str(raw).map_err(|e| {
        let err = if let Some(location) = e.location() {
            ParseError::InvalidYaml {
                line: location.line(),
                column: location.column(),
                message: e.to_string(),
            }
        } else {
            ParseError::InvalidYamlNoLocation {
                message: e.to_string(),
            }
        };
        Error::InvalidManifest(err.to_string())
    })?;

    validate(&manifest).map_err(|e| Error::InvalidManifest(e.to_string()))?;

    Ok(manifest)
}

fn validate(manifest: &Manifest) -> Result<(), ParseError> {
    if manifest.templates.is_empty() {
        return Err(ParseError::NoTemplates);
    }

    let mut seen = HashSet::new();
    for template in &manifest.templates {
        if template.name.trim().is_empty() {
            return Err(ParseError::UnnamedTemplate);
        }
        if !seen.insert(template.name.as_str()) {
            return Err(ParseError::DuplicateTemplate(template.name.clone()));
        }
    }

    if let Some(entrypoint) = &manifest.entrypoint {
        if !seen.contains(entrypoint.as_str()) {
            return Err(ParseError::UnknownEntrypoint(entrypoint.clone()));
        }
    }

    let mut params = HashSet::new();
    for param in &manifest.arguments.parameters {
        if !params.insert(param.name.as_str()) {
            return Err(ParseError::DuplicateParameter(param.name.clone()));
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid YAML manifest at line {line}, column {column}: {message}")]
    InvalidYaml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid YAML manifest: {message}")]
    InvalidYamlNoLocation { message: String },

    #[error("manifest declares no templates")]
    NoTemplates,

    #[error("every template needs a name")]
    UnnamedTemplate,

    #[error("template '{0}' is declared more than once")]
    DuplicateTemplate(String),

    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),

    #[error("entrypoint '{0}' does not name a template")]
    UnknownEntrypoint(String),
}
