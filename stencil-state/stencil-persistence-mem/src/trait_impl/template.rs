use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use stencil_common::{
    common::{Pagination, SortDirection, VersionPageRequest},
    error::Error,
    event::EventType,
    state::{ArchiveOutcome, TemplateDbTrait},
    template::{TemplateFilter, TemplateInfo, TemplateVersion},
};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::{InMemoryStateDb, TemplateEntry, TemplateSlot},
    event_logging::log_event_in_txn,
};

impl InMemoryStateDb {
    async fn find_slot(&self, template_id: Uuid) -> Option<Arc<TemplateSlot>> {
        self.catalog.read().await.slot(template_id)
    }
}

#[async_trait]
impl TemplateDbTrait for InMemoryStateDb {
    async fn get_template(&self, template_id: Uuid) -> Result<Option<TemplateInfo>, Error> {
        let Some(slot) = self.find_slot(template_id).await else {
            return Ok(None);
        };

        let entry = slot.entry.lock().await;
        Ok(Some(entry.info.clone()))
    }

    async fn get_version(
        &self,
        template_id: Uuid,
        version: u32,
    ) -> Result<Option<TemplateVersion>, Error> {
        let Some(slot) = self.find_slot(template_id).await else {
            return Ok(None);
        };

        let entry = slot.entry.lock().await;

        // numbers are dense from 1, so the number doubles as an index
        Ok(version
            .checked_sub(1)
            .and_then(|idx| entry.versions.get(idx as usize))
            .map(|v| v.as_ref().clone()))
    }

    async fn get_latest_version(
        &self,
        template_id: Uuid,
    ) -> Result<Option<TemplateVersion>, Error> {
        let Some(slot) = self.find_slot(template_id).await else {
            return Ok(None);
        };

        let entry = slot.entry.lock().await;
        Ok(entry.versions.last().map(|v| v.as_ref().clone()))
    }

    async fn get_all_versions(
        &self,
        template_id: Uuid,
    ) -> Result<Option<Vec<TemplateVersion>>, Error> {
        let Some(slot) = self.find_slot(template_id).await else {
            return Ok(None);
        };

        let snapshot = slot.entry.lock().await.versions.clone();
        Ok(Some(snapshot.iter().map(|v| v.as_ref().clone()).collect()))
    }

    async fn list_versions(
        &self,
        template_id: Uuid,
        page: &VersionPageRequest,
    ) -> Result<Option<Vec<TemplateVersion>>, Error> {
        let Some(slot) = self.find_slot(template_id).await else {
            return Ok(None);
        };

        // cheap Arc snapshot, the lock is not held while paging
        let snapshot = slot.entry.lock().await.versions.clone();
        let limit = page.effective_limit();

        let admitted = snapshot.iter().filter(|v| page.admits(v.version));
        let items: Vec<TemplateVersion> = match page.direction {
            SortDirection::Ascending => admitted.take(limit).map(|v| v.as_ref().clone()).collect(),
            SortDirection::Descending => admitted
                .rev()
                .take(limit)
                .map(|v| v.as_ref().clone())
                .collect(),
        };

        Ok(Some(items))
    }

    async fn list_templates(
        &self,
        namespace: &str,
        filter: &TemplateFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<TemplateInfo>, u64), Error> {
        let slots: Vec<Arc<TemplateSlot>> = {
            let catalog = self.catalog.read().await;
            catalog
                .order
                .iter()
                .filter_map(|id| catalog.slot(*id))
                .collect()
        };

        let mut matching = Vec::new();
        for slot in slots {
            let entry = slot.entry.lock().await;
            if entry.info.namespace == namespace && filter.admits(&entry.info) {
                matching.push(entry.info.clone());
            }
        }

        let total_count = matching.len() as u64;
        let window = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok((window, total_count))
    }

    async fn insert_template(
        &self,
        info: TemplateInfo,
        versions: Vec<TemplateVersion>,
        cloned_from: Option<Uuid>,
    ) -> Result<(), Error> {
        if versions.is_empty() {
            return Err(Error::InvalidInput(format!(
                "template {} must be inserted with at least one version",
                info.id
            )));
        }

        for (idx, version) in versions.iter().enumerate() {
            if version.version as usize != idx + 1 || version.template_id != info.id {
                return Err(Error::InvalidInput(format!(
                    "versions of template {} must be numbered 1..N under its id",
                    info.id
                )));
            }
        }

        let mut catalog = self.catalog.write().await;
        let mut events = self.events.lock().await;

        let name_key = (info.namespace.clone(), info.name.clone());
        if catalog.names.contains_key(&name_key) {
            debug!(namespace = %info.namespace, name = %info.name, "template name taken");
            return Err(Error::AlreadyExists {
                resource_type: "WorkflowTemplate".to_string(),
                resource_id: format!("{}/{}", info.namespace, info.name),
            });
        }

        if catalog.slots.contains_key(&info.id) {
            return Err(Error::AlreadyExists {
                resource_type: "WorkflowTemplate".to_string(),
                resource_id: info.id.to_string(),
            });
        }

        let template_id = info.id;
        let latest = versions.len() as u32;

        let (event_type, message, metadata) = match cloned_from {
            Some(source) => (
                EventType::TemplateCloned,
                format!(
                    "Cloned template {} from {} with {} versions",
                    template_id, source, latest
                ),
                Some(serde_json::json!({ "source_template_id": source.to_string() })),
            ),
            None => (
                EventType::TemplateCreated,
                format!("Created template {} ({})", template_id, info.name),
                None,
            ),
        };

        catalog.names.insert(name_key, template_id);
        catalog.order.push(template_id);
        catalog.slots.insert(
            template_id,
            Arc::new(TemplateSlot {
                entry: Mutex::new(TemplateEntry {
                    info,
                    versions: versions.into_iter().map(Arc::new).collect(),
                }),
            }),
        );

        log_event_in_txn(
            &mut events,
            Some(template_id),
            Some(latest),
            event_type,
            Some(message),
            metadata,
        );

        Ok(())
    }

    async fn append_version(
        &self,
        template_id: Uuid,
        expected_latest: u32,
        version: TemplateVersion,
    ) -> Result<TemplateInfo, Error> {
        let slot = self
            .find_slot(template_id)
            .await
            .ok_or_else(|| Error::template_not_found(template_id))?;

        let mut entry = slot.entry.lock().await;
        let mut events = self.events.lock().await;

        entry.info.state.ensure_writable(template_id)?;

        let latest = entry.latest_number();
        if latest != expected_latest {
            debug!(%template_id, latest, expected_latest, "version slot already taken");
            return Err(Error::Conflict(format!(
                "template {} is at version {}, expected {}",
                template_id, latest, expected_latest
            )));
        }

        if version.version != latest + 1 || version.template_id != template_id {
            return Err(Error::InvalidInput(format!(
                "next version of template {} must be {}",
                template_id,
                latest + 1
            )));
        }

        let number = version.version;
        entry.info.modified_at = Utc::now();
        entry.versions.push(Arc::new(version));

        log_event_in_txn(
            &mut events,
            Some(template_id),
            Some(number),
            EventType::VersionCreated,
            None,
            None,
        );

        Ok(entry.info.clone())
    }

    async fn archive_template(&self, template_id: Uuid) -> Result<ArchiveOutcome, Error> {
        let slot = self
            .find_slot(template_id)
            .await
            .ok_or_else(|| Error::template_not_found(template_id))?;

        let mut entry = slot.entry.lock().await;
        let mut events = self.events.lock().await;

        let Some(next) = entry.info.state.archive() else {
            return entry.snapshot(false);
        };

        entry.info.state = next;
        entry.info.modified_at = Utc::now();

        log_event_in_txn(
            &mut events,
            Some(template_id),
            None,
            EventType::TemplateArchived,
            None,
            None,
        );

        entry.snapshot(true)
    }
}
