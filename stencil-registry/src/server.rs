use std::{collections::BTreeMap, sync::Arc, time::Duration};

use stencil_common::{
    common::{Pagination, SortDirection, VersionPageRequest},
    context::OperationContext,
    template::TemplateFilter,
};
use stencil_protobuf::{
    json_map_to_prost_struct,
    v1::{
        ArchiveWorkflowTemplateRequest, ArchiveWorkflowTemplateResponse,
        CloneWorkflowTemplateRequest, CreateWorkflowTemplateRequest,
        GenerateWorkflowTemplateRequest, GetWorkflowTemplateRequest,
        ListWorkflowTemplateVersionsRequest, ListWorkflowTemplateVersionsResponse,
        ListWorkflowTemplatesFieldRequest, ListWorkflowTemplatesFieldResponse,
        ListWorkflowTemplatesRequest, ListWorkflowTemplatesResponse, WorkflowTemplate,
        workflow_template_service_server::{
            WorkflowTemplateService, WorkflowTemplateServiceServer,
        },
    },
};
use tonic::{Request, Response, Status};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    catalog::{NewTemplate, TemplateCatalog},
    mapping::{error_to_status, parse_id, template_to_proto},
};

/// `stencil.v1.WorkflowTemplateService` backed by a [TemplateCatalog].
#[derive(Debug, Clone)]
pub struct GrpcWorkflowTemplateService {
    catalog: Arc<TemplateCatalog>,
    request_timeout: Option<Duration>,
}

impl GrpcWorkflowTemplateService {
    pub fn new(catalog: Arc<TemplateCatalog>) -> Self {
        Self {
            catalog,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn into_server(self) -> WorkflowTemplateServiceServer<Self> {
        WorkflowTemplateServiceServer::new(self)
    }

    fn context(&self) -> OperationContext {
        match self.request_timeout {
            Some(timeout) => OperationContext::background().with_timeout(timeout),
            None => OperationContext::background(),
        }
    }

    /// Rejects requests addressing a template through the wrong namespace.
    async fn scoped_id(&self, namespace: &str, id: &str) -> Result<Uuid, Status> {
        let template_id = parse_id(id)?;

        if !namespace.is_empty() {
            let info = self
                .catalog
                .ledger()
                .template(template_id)
                .await
                .map_err(error_to_status)?;

            if info.namespace != namespace {
                return Err(Status::not_found(format!(
                    "Resource Not Found: WorkflowTemplate with ID {template_id}"
                )));
            }
        }

        Ok(template_id)
    }
}

fn require_namespace(namespace: &str) -> Result<(), Status> {
    if namespace.trim().is_empty() {
        return Err(Status::invalid_argument("namespace is required"));
    }
    Ok(())
}

fn page_token(cursor: Option<u32>) -> String {
    cursor.map(|c| c.to_string()).unwrap_or_default()
}

fn parse_page_token(token: &str) -> Result<Option<u32>, Status> {
    if token.is_empty() {
        return Ok(None);
    }

    token
        .parse::<u32>()
        .map(Some)
        .map_err(|_| Status::invalid_argument(format!("invalid page token '{token}'")))
}

#[tonic::async_trait]
impl WorkflowTemplateService for GrpcWorkflowTemplateService {
    #[instrument(skip(self, request))]
    async fn generate_workflow_template(
        &self,
        request: Request<GenerateWorkflowTemplateRequest>,
    ) -> Result<Response<WorkflowTemplate>, Status> {
        let req = request.into_inner();
        require_namespace(&req.namespace)?;

        let name = (!req.name.is_empty()).then_some(req.name.as_str());
        let template = self
            .catalog
            .generate_workflow_template(&self.context(), &req.namespace, name, &req.manifest)
            .await
            .map_err(error_to_status)?;

        Ok(Response::new(template_to_proto(template)))
    }

    #[instrument(skip(self, request))]
    async fn create_workflow_template(
        &self,
        request: Request<CreateWorkflowTemplateRequest>,
    ) -> Result<Response<WorkflowTemplate>, Status> {
        let req = request.into_inner();
        require_namespace(&req.namespace)?;

        let template = req
            .workflow_template
            .ok_or_else(|| Status::invalid_argument("workflow_template is required"))?;

        let created = self
            .catalog
            .create_workflow_template(
                &self.context(),
                NewTemplate {
                    namespace: req.namespace,
                    name: template.name,
                    manifest: template.manifest,
                    labels: template.labels.into_iter().collect::<BTreeMap<_, _>>(),
                },
            )
            .await
            .map_err(error_to_status)?;

        info!(id = %created.id(), "CreateWorkflowTemplate");

        Ok(Response::new(template_to_proto(created)))
    }

    #[instrument(skip(self, request))]
    async fn create_workflow_template_version(
        &self,
        request: Request<CreateWorkflowTemplateRequest>,
    ) -> Result<Response<WorkflowTemplate>, Status> {
        let req = request.into_inner();

        let template = req
            .workflow_template
            .ok_or_else(|| Status::invalid_argument("workflow_template is required"))?;
        let template_id = self.scoped_id(&req.namespace, &template.id).await?;

        let created = self
            .catalog
            .create_workflow_template_version(&self.context(), template_id, &template.manifest)
            .await
            .map_err(error_to_status)?;

        info!(
            id = %template_id,
            version = created.version_number(),
            "CreateWorkflowTemplateVersion"
        );

        Ok(Response::new(template_to_proto(created)))
    }

    #[instrument(skip(self, request))]
    async fn get_workflow_template(
        &self,
        request: Request<GetWorkflowTemplateRequest>,
    ) -> Result<Response<WorkflowTemplate>, Status> {
        let req = request.into_inner();
        let template_id = self.scoped_id(&req.namespace, &req.id).await?;
        let version = (req.version > 0).then_some(req.version);

        let template = self
            .catalog
            .get_workflow_template(&self.context(), template_id, version)
            .await
            .map_err(error_to_status)?;

        Ok(Response::new(template_to_proto(template)))
    }

    #[instrument(skip(self, request))]
    async fn list_workflow_template_versions(
        &self,
        request: Request<ListWorkflowTemplateVersionsRequest>,
    ) -> Result<Response<ListWorkflowTemplateVersionsResponse>, Status> {
        let req = request.into_inner();
        let template_id = self.scoped_id(&req.namespace, &req.id).await?;

        let direction = if req.descending {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        let page = VersionPageRequest {
            cursor: parse_page_token(&req.page_token)?,
            limit: req.page_size as u64,
            direction,
        };

        let versions = self
            .catalog
            .list_workflow_template_versions(&self.context(), template_id, &page)
            .await
            .map_err(error_to_status)?;

        let workflow_templates: Vec<WorkflowTemplate> =
            versions.items.into_iter().map(template_to_proto).collect();

        Ok(Response::new(ListWorkflowTemplateVersionsResponse {
            count: workflow_templates.len() as u32,
            workflow_templates,
            next_page_token: page_token(versions.next_cursor),
        }))
    }

    #[instrument(skip(self, request))]
    async fn list_workflow_templates(
        &self,
        request: Request<ListWorkflowTemplatesRequest>,
    ) -> Result<Response<ListWorkflowTemplatesResponse>, Status> {
        let req = request.into_inner();
        require_namespace(&req.namespace)?;

        let pagination = Pagination::from_page(req.page as u64, req.page_size as u64);
        let filter = TemplateFilter {
            include_archived: req.include_archived,
        };

        let (templates, total) = self
            .catalog
            .list_workflow_templates(&self.context(), &req.namespace, &pagination, &filter)
            .await
            .map_err(error_to_status)?;

        let workflow_templates: Vec<WorkflowTemplate> =
            templates.into_iter().map(template_to_proto).collect();

        Ok(Response::new(ListWorkflowTemplatesResponse {
            count: workflow_templates.len() as u32,
            workflow_templates,
            page: (pagination.offset / pagination.limit + 1) as u32,
            pages: total.div_ceil(pagination.limit) as u32,
            total_count: total as u32,
        }))
    }

    #[instrument(skip(self, request))]
    async fn clone_workflow_template(
        &self,
        request: Request<CloneWorkflowTemplateRequest>,
    ) -> Result<Response<WorkflowTemplate>, Status> {
        let req = request.into_inner();
        let template_id = self.scoped_id(&req.namespace, &req.id).await?;
        let name = (!req.name.is_empty()).then_some(req.name);

        let cloned = self
            .catalog
            .clone_workflow_template(&self.context(), template_id, name, req.full_history)
            .await
            .map_err(error_to_status)?;

        info!(source = %template_id, id = %cloned.id(), "CloneWorkflowTemplate");

        Ok(Response::new(template_to_proto(cloned)))
    }

    #[instrument(skip(self, request))]
    async fn archive_workflow_template(
        &self,
        request: Request<ArchiveWorkflowTemplateRequest>,
    ) -> Result<Response<ArchiveWorkflowTemplateResponse>, Status> {
        let req = request.into_inner();
        let template_id = self.scoped_id(&req.namespace, &req.id).await?;
        let archived = self
            .catalog
            .archive_workflow_template(&self.context(), template_id)
            .await
            .map_err(error_to_status)?;

        info!(id = %template_id, "ArchiveWorkflowTemplate");

        Ok(Response::new(ArchiveWorkflowTemplateResponse {
            workflow_template: Some(template_to_proto(archived)),
        }))
    }

    #[instrument(skip(self, request))]
    async fn list_workflow_templates_field(
        &self,
        request: Request<ListWorkflowTemplatesFieldRequest>,
    ) -> Result<Response<ListWorkflowTemplatesFieldResponse>, Status> {
        let req = request.into_inner();
        require_namespace(&req.namespace)?;

        let filter = TemplateFilter {
            include_archived: req.include_archived,
        };

        let records = self
            .catalog
            .list_workflow_templates_field(
                &self.context(),
                &req.namespace,
                &req.field_selector,
                &filter,
            )
            .await
            .map_err(error_to_status)?;

        Ok(Response::new(ListWorkflowTemplatesFieldResponse {
            records: records.into_iter().map(json_map_to_prost_struct).collect(),
        }))
    }
}
