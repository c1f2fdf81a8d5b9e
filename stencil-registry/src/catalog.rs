use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use serde_json::{Map, Value};
use stencil_common::{
    common::{Page, Pagination, VersionPageRequest},
    context::OperationContext,
    error::Error,
    template::{
        FieldSelector, TemplateFilter, TemplateInfo, TemplateState, TemplateVersion,
        WorkflowTemplate, uid_from_name,
    },
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    config::ConfigSource,
    generator::{GeneratedTemplate, GenerationContext, TemplateGenerator},
    ledger::VersionLedger,
};

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub namespace: String,
    pub name: String,
    pub manifest: String,
    pub labels: BTreeMap<String, String>,
}

/// Entry point for every template operation.
/// ---
/// Generation runs before anything is written, so an invalid manifest
/// never leaves a trace in the ledger.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    ledger: VersionLedger,
    config: Arc<dyn ConfigSource>,
}

impl TemplateCatalog {
    pub fn new(ledger: VersionLedger, config: Arc<dyn ConfigSource>) -> Self {
        Self { ledger, config }
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    async fn generate(&self, namespace: &str, manifest: &str) -> Result<GeneratedTemplate, Error> {
        let resolved = self.config.resolve(namespace).await?;

        TemplateGenerator::new(&resolved.system, &resolved.namespace)
            .generate(manifest, &GenerationContext::for_namespace(namespace))
    }

    /// Generates a template without persisting it.
    /// ---
    /// The returned template has nil ids and version `0`.
    #[instrument(skip(self, ctx, manifest))]
    pub async fn generate_workflow_template(
        &self,
        ctx: &OperationContext,
        namespace: &str,
        name: Option<&str>,
        manifest: &str,
    ) -> Result<WorkflowTemplate, Error> {
        ctx.run(async {
            let generated = self.generate(namespace, manifest).await?;
            let now = Utc::now();
            let name = name.unwrap_or_default().to_string();

            let info = TemplateInfo {
                id: Uuid::nil(),
                uid: uid_from_name(&name),
                name,
                namespace: namespace.to_string(),
                state: TemplateState::Active,
                labels: BTreeMap::new(),
                created_at: now,
                modified_at: now,
            };

            let version = TemplateVersion {
                id: Uuid::nil(),
                template_id: Uuid::nil(),
                version: 0,
                content: generated.into_content(manifest),
                created_at: now,
            };

            Ok(WorkflowTemplate::new(info, version))
        })
        .await
    }

    #[instrument(skip(self, ctx, request), fields(namespace = %request.namespace, name = %request.name))]
    pub async fn create_workflow_template(
        &self,
        ctx: &OperationContext,
        request: NewTemplate,
    ) -> Result<WorkflowTemplate, Error> {
        ctx.run(async {
            let generated = self.generate(&request.namespace, &request.manifest).await?;
            let info = TemplateInfo::new(request.namespace.clone(), request.name.clone())
                .with_labels(request.labels.clone());

            self.ledger
                .create_template(info, generated.into_content(&request.manifest))
                .await
        })
        .await
    }

    #[instrument(skip(self, ctx, manifest))]
    pub async fn create_workflow_template_version(
        &self,
        ctx: &OperationContext,
        template_id: Uuid,
        manifest: &str,
    ) -> Result<WorkflowTemplate, Error> {
        ctx.run(async {
            let info = self.ledger.template(template_id).await?;
            info.state.ensure_writable(template_id)?;

            let generated = self.generate(&info.namespace, manifest).await?;

            self.ledger
                .create_version(template_id, generated.into_content(manifest))
                .await
        })
        .await
    }

    /// Gets `version`, or the latest version when `None`.
    #[instrument(skip(self, ctx))]
    pub async fn get_workflow_template(
        &self,
        ctx: &OperationContext,
        template_id: Uuid,
        version: Option<u32>,
    ) -> Result<WorkflowTemplate, Error> {
        ctx.run(async {
            let info = self.ledger.template(template_id).await?;
            let version = match version {
                Some(number) => self.ledger.version(template_id, number).await?,
                None => self.ledger.latest(template_id).await?,
            };

            Ok(WorkflowTemplate::new(info, version))
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_workflow_template_versions(
        &self,
        ctx: &OperationContext,
        template_id: Uuid,
        page: &VersionPageRequest,
    ) -> Result<Page<WorkflowTemplate>, Error> {
        ctx.run(async {
            let versions = self.ledger.versions(template_id, page).await?;
            let info = self.ledger.template(template_id).await?;

            Ok(Page {
                items: versions
                    .items
                    .into_iter()
                    .map(|v| WorkflowTemplate::new(info.clone(), v))
                    .collect(),
                next_cursor: versions.next_cursor,
            })
        })
        .await
    }

    /// Latest version of each template in `namespace`, with the total count.
    #[instrument(skip(self, ctx))]
    pub async fn list_workflow_templates(
        &self,
        ctx: &OperationContext,
        namespace: &str,
        pagination: &Pagination,
        filter: &TemplateFilter,
    ) -> Result<(Vec<WorkflowTemplate>, u64), Error> {
        ctx.run(async {
            let (infos, total) = self.ledger.templates(namespace, filter, pagination).await?;

            let mut templates = Vec::with_capacity(infos.len());
            for info in infos {
                let latest = self.ledger.latest(info.id).await?;
                templates.push(WorkflowTemplate::new(info, latest));
            }

            Ok((templates, total))
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    pub async fn clone_workflow_template(
        &self,
        ctx: &OperationContext,
        template_id: Uuid,
        name: Option<String>,
        full_history: bool,
    ) -> Result<WorkflowTemplate, Error> {
        ctx.run(self.ledger.clone_template(template_id, name, full_history))
            .await
    }

    #[instrument(skip(self, ctx))]
    pub async fn archive_workflow_template(
        &self,
        ctx: &OperationContext,
        template_id: Uuid,
    ) -> Result<WorkflowTemplate, Error> {
        ctx.run(self.ledger.archive(template_id)).await
    }

    /// Projects every matching template onto the selected fields.
    #[instrument(skip(self, ctx))]
    pub async fn list_workflow_templates_field(
        &self,
        ctx: &OperationContext,
        namespace: &str,
        field_selector: &str,
        filter: &TemplateFilter,
    ) -> Result<Vec<Map<String, Value>>, Error> {
        let selector: FieldSelector = field_selector.parse()?;

        ctx.run(async {
            let mut records = Vec::new();
            let mut pagination = Pagination::default();

            loop {
                let (infos, total) = self.ledger.templates(namespace, filter, &pagination).await?;
                let fetched = infos.len() as u64;

                for info in infos {
                    let latest = self.ledger.latest(info.id).await?;
                    records.push(selector.project(&WorkflowTemplate::new(info, latest)));
                }

                pagination.offset += fetched;
                if fetched == 0 || pagination.offset >= total {
                    break;
                }
            }

            Ok(records)
        })
        .await
    }
}
