use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::{Pagination, VersionPageRequest},
    error::Error,
    template::{TemplateFilter, TemplateInfo, TemplateVersion, WorkflowTemplate},
};

use super::base::BaseDbTrait;

/// Storage for templates and their append-only version logs.
/// ---
/// Implementations must commit every mutation atomically:
/// a version is either fully recorded, event included, or not at all.
#[async_trait]
pub trait TemplateDbTrait: BaseDbTrait {
    //// --- READs --- ////

    /// Gets a template by `template_id`
    async fn get_template(&self, template_id: Uuid) -> Result<Option<TemplateInfo>, Error>;

    /// Gets a specific version of a template
    async fn get_version(
        &self,
        template_id: Uuid,
        version: u32,
    ) -> Result<Option<TemplateVersion>, Error>;

    /// Gets the version with the highest number
    async fn get_latest_version(&self, template_id: Uuid)
    -> Result<Option<TemplateVersion>, Error>;

    /// Gets every version of a template, ascending.
    /// ---
    /// Returns `None` if the template does not exist.
    async fn get_all_versions(
        &self,
        template_id: Uuid,
    ) -> Result<Option<Vec<TemplateVersion>>, Error>;

    /// Lists one page of versions strictly after the request cursor.
    /// ---
    /// Returns `None` if the template does not exist.
    async fn list_versions(
        &self,
        template_id: Uuid,
        page: &VersionPageRequest,
    ) -> Result<Option<Vec<TemplateVersion>>, Error>;

    /// Lists templates of a namespace, oldest first
    /// ---
    /// Returns the requested window and the total matching count.
    async fn list_templates(
        &self,
        namespace: &str,
        filter: &TemplateFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<TemplateInfo>, u64), Error>;

    //// --- WRITEs --- ////

    /// Inserts a template together with its initial versions
    /// ---
    /// Fails with `AlreadyExists` if the namespace already holds a
    /// template with the same name. `versions` must be numbered 1..N.
    /// `cloned_from` names the source template when this is a clone.
    async fn insert_template(
        &self,
        info: TemplateInfo,
        versions: Vec<TemplateVersion>,
        cloned_from: Option<Uuid>,
    ) -> Result<(), Error>;

    /// Appends a version if the current latest number is still `expected_latest`
    /// ---
    /// Compare-and-swap on the latest version number: exactly one caller
    /// wins a slot, the rest observe `Conflict`.
    /// Fails with `TemplateArchived` if the template was archived meanwhile.
    /// Returns the template as committed together with the new version.
    async fn append_version(
        &self,
        template_id: Uuid,
        expected_latest: u32,
        version: TemplateVersion,
    ) -> Result<TemplateInfo, Error>;

    /// Archives a template
    /// ---
    /// Idempotent: `changed` is `false` if it was already archived.
    async fn archive_template(&self, template_id: Uuid) -> Result<ArchiveOutcome, Error>;
}

/// Template state read under the same lock as the archive transition.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveOutcome {
    pub template: WorkflowTemplate,
    pub changed: bool,
}
