use stencil_common::{
    config::{
        NODE_POOL_LABEL_KEY, NamespaceConfig, NodePoolOption, POD_NAME_PLACEHOLDER, SystemConfig,
        WORKFLOW_NAME_PLACEHOLDER, format_key,
    },
    error::Error,
    template::{NODE_POOL_PARAMETER_NAME, Parameter, VersionContent},
};
use tracing::debug;

use crate::{
    parser::parse_manifest,
    schema::{Artifact, Manifest, StepTemplate},
};

/// Runtime reference to the workflow level node pool parameter.
pub const NODE_POOL_PARAMETER_REF: &str = "{{workflow.parameters.sys-node-pool}}";

/// Values substituted into artifact keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationContext {
    pub namespace: String,
    pub workflow_name: String,
    pub pod_name: String,
}

impl GenerationContext {
    pub fn new(
        namespace: impl Into<String>,
        workflow_name: impl Into<String>,
        pod_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workflow_name: workflow_name.into(),
            pod_name: pod_name.into(),
        }
    }

    /// Context for stored templates: the namespace is known, workflow and
    /// pod names are only known once the workflow runs, so their
    /// placeholders are kept.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self::new(namespace, WORKFLOW_NAME_PLACEHOLDER, POD_NAME_PLACEHOLDER)
    }

    pub fn with_workflow_name(mut self, workflow_name: impl Into<String>) -> Self {
        self.workflow_name = workflow_name.into();
        self
    }

    pub fn format_key(&self, key_format: &str) -> String {
        format_key(
            key_format,
            &self.namespace,
            &self.workflow_name,
            &self.pod_name,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTemplate {
    /// Materialized manifest.
    pub manifest: String,
    pub parameters: Vec<Parameter>,
}

impl GeneratedTemplate {
    /// Pairs the generated artifact with the raw content it came from.
    pub fn into_content(self, raw: &str) -> VersionContent {
        VersionContent {
            manifest: raw.to_string(),
            generated_manifest: self.manifest,
            parameters: self.parameters,
        }
    }
}

/// Turns raw manifests into materialized ones for one namespace.
/// ---
/// Generation is a pure function of its inputs: the same manifest,
/// configuration and context always yield the same output.
#[derive(Debug, Clone, Copy)]
pub struct TemplateGenerator<'a> {
    system: &'a SystemConfig,
    namespace: &'a NamespaceConfig,
}

impl<'a> TemplateGenerator<'a> {
    pub fn new(system: &'a SystemConfig, namespace: &'a NamespaceConfig) -> Self {
        Self { system, namespace }
    }

    pub fn generate(&self, raw: &str, ctx: &GenerationContext) -> Result<GeneratedTemplate, Error> {
        let mut manifest = parse_manifest(raw)?;

        self.resolve_parameters(&mut manifest)?;

        let has_pool_parameter = manifest.parameter(NODE_POOL_PARAMETER_NAME).is_some();
        for step in manifest.templates.iter_mut() {
            self.resolve_node_pool(step, has_pool_parameter)?;
            self.resolve_artifacts(step, ctx)?;
        }

        if manifest.entrypoint.is_none() {
            manifest.entrypoint = manifest.templates.first().map(|t| t.name.clone());
        }

        let generated = serde_yaml::to_string(&manifest)
            .map_err(|e| Error::Internal(format!("Failed to serialize manifest: {e}")))?;

        Ok(GeneratedTemplate {
            manifest: generated,
            parameters: manifest.arguments.parameters,
        })
    }

    fn lookup_node_pool(&self, value: &str) -> Result<NodePoolOption, Error> {
        self.system
            .node_pool_option_by_value(value)?
            .ok_or_else(|| Error::UnknownNodePool {
                value: value.to_string(),
            })
    }

    fn node_pool_label(&self) -> Result<&'a str, Error> {
        self.system
            .node_pool_label()
            .ok_or_else(|| Error::MissingConfig {
                key: NODE_POOL_LABEL_KEY.to_string(),
            })
    }

    /// Fills node pool parameter options and defaults from the config.
    fn resolve_parameters(&self, manifest: &mut Manifest) -> Result<(), Error> {
        for param in manifest
            .arguments
            .parameters
            .iter_mut()
            .filter(|p| p.is_node_pool())
        {
            if param.options.is_empty() {
                param.options = self
                    .system
                    .node_pool_options()?
                    .into_iter()
                    .map(|opt| opt.option)
                    .collect();
            }

            match &param.value {
                Some(value) => {
                    self.lookup_node_pool(value)?;
                }
                None => {
                    param.value = param.options.first().map(|o| o.value.clone());
                    debug!(parameter = %param.name, value = ?param.value, "defaulted node pool");
                }
            }
        }

        Ok(())
    }

    /// Replaces a step's node pool reference with a node selector.
    /// ---
    /// Pod steps without a reference or selector fall back to the workflow
    /// node pool parameter when the manifest declares one.
    fn resolve_node_pool(&self, step: &mut StepTemplate, has_pool_parameter: bool) -> Result<(), Error> {
        let reference = match step.node_pool.take() {
            Some(reference) => reference,
            None if has_pool_parameter
                && step.container.is_some()
                && step.node_selector.is_empty() =>
            {
                NODE_POOL_PARAMETER_REF.to_string()
            }
            None => return Ok(()),
        };

        if reference == NODE_POOL_PARAMETER_REF {
            if !has_pool_parameter {
                return Err(Error::InvalidManifest(format!(
                    "template '{}' references {} but the manifest declares no '{}' parameter",
                    step.name, NODE_POOL_PARAMETER_REF, NODE_POOL_PARAMETER_NAME
                )));
            }

            let label = self.node_pool_label()?;
            step.node_selector
                .entry(label.to_string())
                .or_insert(reference);

            return Ok(());
        }

        let option = self.lookup_node_pool(&reference)?;
        let label = self.node_pool_label()?;

        step.node_selector
            .entry(label.to_string())
            .or_insert(reference);

        if let Some(container) = step.container.as_mut() {
            if !container.has_resources() && !option.resources.is_empty() {
                container.resources = Some(option.resources.clone());
            }
        }

        Ok(())
    }

    /// Formats artifact keys and fills unset S3 fields from the namespace config.
    fn resolve_artifacts(&self, step: &mut StepTemplate, ctx: &GenerationContext) -> Result<(), Error> {
        let Some(outputs) = step.outputs.as_mut() else {
            return Ok(());
        };

        let repo = self.namespace.artifact_repository.s3.as_ref();

        for Artifact { name, s3, .. } in outputs.artifacts.iter_mut() {
            let Some(s3) = s3.as_mut() else {
                continue;
            };

            let key = match s3.key.take() {
                Some(key) => ctx.format_key(&key),
                None => {
                    let repo = repo.ok_or_else(missing_s3_config)?;
                    let base = ctx.format_key(&repo.key_format);
                    format!("{}/{}", base.trim_end_matches('/'), name)
                }
            };
            s3.key = Some(key);

            let Some(repo) = repo else {
                if s3.bucket.is_none() {
                    return Err(missing_s3_config());
                }
                continue;
            };

            s3.bucket.get_or_insert_with(|| repo.bucket.clone());
            if !repo.endpoint.is_empty() {
                s3.endpoint.get_or_insert_with(|| repo.endpoint.clone());
            }
            if !repo.region.is_empty() {
                s3.region.get_or_insert_with(|| repo.region.clone());
            }
            s3.insecure.get_or_insert(repo.insecure);
            if s3.access_key_secret.is_none() {
                s3.access_key_secret = repo.access_key_secret.clone();
            }
            if s3.secret_key_secret.is_none() {
                s3.secret_key_secret = repo.secret_key_secret.clone();
            }
        }

        Ok(())
    }
}

fn missing_s3_config() -> Error {
    Error::MissingConfig {
        key: "artifactRepository.s3".to_string(),
    }
}
