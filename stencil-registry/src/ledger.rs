use std::sync::Arc;

use stencil_common::{
    common::{Page, Pagination, VersionPageRequest},
    error::Error,
    state::DatabaseTrait,
    template::{
        TemplateFilter, TemplateInfo, TemplateVersion, VersionContent, WorkflowTemplate,
        uid_from_name,
    },
};
use tracing::{info, warn};
use uuid::Uuid;

/// How many times a lost version slot is retried before giving up.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Version bookkeeping on top of the template store.
/// ---
/// Numbers are dense and start at 1. `latest` is always derived from
/// the stored sequence, never stored on its own.
#[derive(Debug, Clone)]
pub struct VersionLedger {
    db: Arc<dyn DatabaseTrait>,
    max_retries: usize,
}

impl VersionLedger {
    pub fn new(db: Arc<dyn DatabaseTrait>) -> Self {
        Self {
            db,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn db(&self) -> &Arc<dyn DatabaseTrait> {
        &self.db
    }

    pub async fn template(&self, template_id: Uuid) -> Result<TemplateInfo, Error> {
        self.db
            .get_template(template_id)
            .await?
            .ok_or_else(|| Error::template_not_found(template_id))
    }

    /// Creates a template whose history starts with `content` as version 1.
    pub async fn create_template(
        &self,
        info: TemplateInfo,
        content: VersionContent,
    ) -> Result<WorkflowTemplate, Error> {
        if info.name.trim().is_empty() {
            return Err(Error::InvalidInput("template name must not be empty".to_string()));
        }

        let version = TemplateVersion::new(info.id, 1, content);
        self.db
            .insert_template(info.clone(), vec![version.clone()], None)
            .await?;

        info!(template_id = %info.id, name = %info.name, "Created workflow template");

        Ok(WorkflowTemplate::new(info, version))
    }

    /// Appends `content` as the next version.
    /// ---
    /// Losing the slot to a concurrent writer is retried against the new
    /// latest number, up to the retry bound, then surfaced as `Conflict`.
    pub async fn create_version(
        &self,
        template_id: Uuid,
        content: VersionContent,
    ) -> Result<WorkflowTemplate, Error> {
        for attempt in 0..=self.max_retries {
            let info = self.template(template_id).await?;
            info.state.ensure_writable(template_id)?;

            let latest = self.latest(template_id).await?.version;
            let version = TemplateVersion::new(template_id, latest + 1, content.clone());

            match self
                .db
                .append_version(template_id, latest, version.clone())
                .await
            {
                // committed: nothing below may await
                Ok(info) => {
                    info!(
                        template_id = %template_id,
                        version = version.version,
                        "Created workflow template version"
                    );

                    return Ok(WorkflowTemplate::new(info, version));
                }
                Err(e) if e.is_retryable() => {
                    warn!(template_id = %template_id, attempt, "Lost version slot: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Conflict(format!(
            "template {} kept changing, gave up after {} retries",
            template_id, self.max_retries
        )))
    }

    pub async fn latest(&self, template_id: Uuid) -> Result<TemplateVersion, Error> {
        self.db
            .get_latest_version(template_id)
            .await?
            .ok_or_else(|| Error::template_not_found(template_id))
    }

    pub async fn version(&self, template_id: Uuid, version: u32) -> Result<TemplateVersion, Error> {
        match self.db.get_version(template_id, version).await? {
            Some(v) => Ok(v),
            None => {
                // distinguish an unknown template from an unknown version
                self.template(template_id).await?;
                Err(Error::version_not_found(template_id, version))
            }
        }
    }

    pub async fn versions(
        &self,
        template_id: Uuid,
        page: &VersionPageRequest,
    ) -> Result<Page<TemplateVersion>, Error> {
        let items = self
            .db
            .list_versions(template_id, page)
            .await?
            .ok_or_else(|| Error::template_not_found(template_id))?;

        let next_cursor = if items.len() == page.effective_limit() {
            items.last().map(|v| v.version)
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    pub async fn templates(
        &self,
        namespace: &str,
        filter: &TemplateFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<TemplateInfo>, u64), Error> {
        self.db.list_templates(namespace, filter, pagination).await
    }

    /// Copies a template under a new identity.
    /// ---
    /// With `full_history` every version is copied, keeping its number and
    /// content but getting a fresh id. Otherwise only the latest content
    /// is copied, as version 1. The clone starts out active.
    pub async fn clone_template(
        &self,
        source_id: Uuid,
        name: Option<String>,
        full_history: bool,
    ) -> Result<WorkflowTemplate, Error> {
        let source = self.template(source_id).await?;

        let mut info = TemplateInfo::new(source.namespace.clone(), String::new())
            .with_labels(source.labels.clone());
        info.name = match name {
            Some(name) if !name.trim().is_empty() => name,
            _ => format!("{}-clone-{}", source.name, &info.id.simple().to_string()[..8]),
        };
        info.uid = uid_from_name(&info.name);

        let versions = if full_history {
            self.db
                .get_all_versions(source_id)
                .await?
                .ok_or_else(|| Error::template_not_found(source_id))?
                .iter()
                .map(|v| v.copy_to(info.id, v.version))
                .collect::<Vec<_>>()
        } else {
            vec![self.latest(source_id).await?.copy_to(info.id, 1)]
        };

        let latest = versions
            .last()
            .cloned()
            .ok_or_else(|| Error::Internal(format!("template {source_id} has no versions")))?;

        self.db
            .insert_template(info.clone(), versions, Some(source_id))
            .await?;

        info!(
            source_id = %source_id,
            template_id = %info.id,
            full_history,
            "Cloned workflow template"
        );

        Ok(WorkflowTemplate::new(info, latest))
    }

    /// Archives a template and returns it with its latest version.
    /// Archiving twice is not an error.
    pub async fn archive(&self, template_id: Uuid) -> Result<WorkflowTemplate, Error> {
        let outcome = self.db.archive_template(template_id).await?;

        if outcome.changed {
            info!(template_id = %template_id, "Archived workflow template");
        }

        Ok(outcome.template)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use stencil_common::{
        common::SortDirection,
        context::OperationContext,
        event::EventLogRecord,
        state::{ArchiveOutcome, BaseDbTrait, TemplateDbTrait},
        template::TemplateState,
    };
    use stencil_persistence_mem::InMemoryStateDb;

    use super::*;

    /// Store wrapper that can refuse every append or stall reads once
    /// something has been committed.
    #[derive(Debug, Default)]
    struct ScriptedDb {
        inner: InMemoryStateDb,
        always_conflict: bool,
        stall_after_commit: Option<Duration>,
        appends: AtomicUsize,
        committed: AtomicBool,
    }

    impl ScriptedDb {
        async fn stall(&self) {
            if let Some(delay) = self.stall_after_commit {
                if self.committed.load(Ordering::SeqCst) {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    #[async_trait]
    impl BaseDbTrait for ScriptedDb {
        async fn log_system_event(&self, message: String) -> Result<(), Error> {
            self.inner.log_system_event(message).await
        }

        async fn list_events(&self, template_id: Option<Uuid>) -> Result<Vec<EventLogRecord>, Error> {
            self.inner.list_events(template_id).await
        }
    }

    #[async_trait]
    impl TemplateDbTrait for ScriptedDb {
        async fn get_template(&self, template_id: Uuid) -> Result<Option<TemplateInfo>, Error> {
            self.stall().await;
            self.inner.get_template(template_id).await
        }

        async fn get_version(
            &self,
            template_id: Uuid,
            version: u32,
        ) -> Result<Option<TemplateVersion>, Error> {
            self.stall().await;
            self.inner.get_version(template_id, version).await
        }

        async fn get_latest_version(
            &self,
            template_id: Uuid,
        ) -> Result<Option<TemplateVersion>, Error> {
            self.stall().await;
            self.inner.get_latest_version(template_id).await
        }

        async fn get_all_versions(
            &self,
            template_id: Uuid,
        ) -> Result<Option<Vec<TemplateVersion>>, Error> {
            self.inner.get_all_versions(template_id).await
        }

        async fn list_versions(
            &self,
            template_id: Uuid,
            page: &VersionPageRequest,
        ) -> Result<Option<Vec<TemplateVersion>>, Error> {
            self.inner.list_versions(template_id, page).await
        }

        async fn list_templates(
            &self,
            namespace: &str,
            filter: &TemplateFilter,
            pagination: &Pagination,
        ) -> Result<(Vec<TemplateInfo>, u64), Error> {
            self.inner.list_templates(namespace, filter, pagination).await
        }

        async fn insert_template(
            &self,
            info: TemplateInfo,
            versions: Vec<TemplateVersion>,
            cloned_from: Option<Uuid>,
        ) -> Result<(), Error> {
            self.inner.insert_template(info, versions, cloned_from).await
        }

        async fn append_version(
            &self,
            template_id: Uuid,
            expected_latest: u32,
            version: TemplateVersion,
        ) -> Result<TemplateInfo, Error> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            if self.always_conflict {
                return Err(Error::Conflict(format!("slot {} taken", version.version)));
            }

            let info = self
                .inner
                .append_version(template_id, expected_latest, version)
                .await?;
            self.committed.store(true, Ordering::SeqCst);
            Ok(info)
        }

        async fn archive_template(&self, template_id: Uuid) -> Result<ArchiveOutcome, Error> {
            let outcome = self.inner.archive_template(template_id).await?;
            self.committed.store(true, Ordering::SeqCst);
            Ok(outcome)
        }
    }

    impl DatabaseTrait for ScriptedDb {}

    fn ledger() -> VersionLedger {
        VersionLedger::new(Arc::new(InMemoryStateDb::new()))
    }

    fn content(tag: &str) -> VersionContent {
        VersionContent {
            manifest: tag.to_string(),
            generated_manifest: format!("generated {tag}"),
            parameters: Vec::new(),
        }
    }

    async fn template_with(ledger: &VersionLedger, versions: u32) -> WorkflowTemplate {
        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "ml".to_string());

        let created = ledger
            .create_template(TemplateInfo::new("ns", "train").with_labels(labels), content("v1"))
            .await
            .unwrap();

        for n in 2..=versions {
            ledger
                .create_version(created.id(), content(&format!("v{n}")))
                .await
                .unwrap();
        }

        created
    }

    #[tokio::test]
    async fn numbers_are_dense_from_one() {
        let ledger = ledger();
        let t = template_with(&ledger, 4).await;

        let page = ledger
            .versions(t.id(), &VersionPageRequest::new(10, SortDirection::Ascending))
            .await
            .unwrap();
        assert_eq!(
            page.items.iter().map(|v| v.version).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(page.next_cursor, None);
        assert_eq!(ledger.latest(t.id()).await.unwrap().content.manifest, "v4");
    }

    #[tokio::test]
    async fn full_pages_hand_out_a_cursor() {
        let ledger = ledger();
        let t = template_with(&ledger, 5).await;

        let req = VersionPageRequest::new(2, SortDirection::Descending);
        let first = ledger.versions(t.id(), &req).await.unwrap();
        assert_eq!(first.next_cursor, Some(4));

        let second = ledger
            .versions(t.id(), &req.clone().after(4))
            .await
            .unwrap();
        assert_eq!(
            second.items.iter().map(|v| v.version).collect::<Vec<_>>(),
            vec![3, 2]
        );
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let ledger = ledger();
        let id = Uuid::new_v4();

        assert!(matches!(
            ledger.create_version(id, content("x")).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(ledger.latest(id).await, Err(Error::NotFound { .. })));
        assert!(matches!(ledger.archive(id).await, Err(Error::NotFound { .. })));
        assert!(matches!(
            ledger.clone_template(id, None, true).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            ledger.versions(id, &VersionPageRequest::default()).await,
            Err(Error::NotFound { .. })
        ));

        let t = template_with(&ledger, 1).await;
        match ledger.version(t.id(), 9).await {
            Err(Error::NotFound { resource_type, .. }) => {
                assert_eq!(resource_type, "WorkflowTemplateVersion")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn archive_blocks_new_versions_and_is_idempotent() {
        let ledger = ledger();
        let t = template_with(&ledger, 2).await;

        let first = ledger.archive(t.id()).await.unwrap();
        assert_eq!(first.info.state, TemplateState::Archived);
        assert_eq!(first.version_number(), 2);

        let second = ledger.archive(t.id()).await.unwrap();
        assert_eq!(second.info.state, TemplateState::Archived);
        assert_eq!(second.info.modified_at, first.info.modified_at);

        assert!(matches!(
            ledger.create_version(t.id(), content("v3")).await,
            Err(Error::TemplateArchived { template_id }) if template_id == t.id()
        ));

        assert_eq!(ledger.version(t.id(), 2).await.unwrap().content.manifest, "v2");
    }

    #[tokio::test]
    async fn full_clone_copies_history() {
        let ledger = ledger();
        let t = template_with(&ledger, 3).await;

        let clone = ledger
            .clone_template(t.id(), Some("train copy".to_string()), true)
            .await
            .unwrap();

        assert_ne!(clone.id(), t.id());
        assert_eq!(clone.info.uid, uid_from_name("train copy"));
        assert_eq!(clone.info.labels.get("team").map(String::as_str), Some("ml"));
        assert_eq!(clone.version_number(), 3);

        let source = ledger
            .versions(t.id(), &VersionPageRequest::default())
            .await
            .unwrap()
            .items;
        let copied = ledger
            .versions(clone.id(), &VersionPageRequest::default())
            .await
            .unwrap()
            .items;

        assert_eq!(source.len(), copied.len());
        for (a, b) in source.iter().zip(copied.iter()) {
            assert_eq!(a.version, b.version);
            assert_eq!(a.content, b.content);
            assert_ne!(a.id, b.id);
            assert_eq!(b.template_id, clone.id());
        }

        // the clone evolves independently
        ledger.create_version(clone.id(), content("v4")).await.unwrap();
        assert_eq!(ledger.latest(t.id()).await.unwrap().version, 3);
    }

    #[tokio::test]
    async fn collapsed_clone_keeps_latest_only() {
        let ledger = ledger();
        let t = template_with(&ledger, 3).await;
        ledger.archive(t.id()).await.unwrap();

        let clone = ledger.clone_template(t.id(), None, false).await.unwrap();
        assert!(clone.info.name.starts_with("train-clone-"));
        assert_eq!(clone.info.state, TemplateState::Active);

        let versions = ledger
            .versions(clone.id(), &VersionPageRequest::default())
            .await
            .unwrap()
            .items;
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 1);
        assert_eq!(versions[0].content.manifest, "v3");
    }

    #[tokio::test]
    async fn clone_name_must_be_free() {
        let ledger = ledger();
        let t = template_with(&ledger, 1).await;

        assert!(matches!(
            ledger.clone_template(t.id(), Some("train".to_string()), false).await,
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_versions_never_share_a_number() {
        let ledger = ledger();
        let t = template_with(&ledger, 1).await;

        let writers: Vec<_> = (0..6)
            .map(|i| {
                let ledger = ledger.clone();
                let id = t.id();
                tokio::spawn(async move {
                    ledger.create_version(id, content(&format!("w{i}"))).await
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for writer in writers {
            match writer.await.unwrap() {
                Ok(created) => numbers.push(created.version_number()),
                Err(e) => assert!(matches!(e, Error::Conflict(_)), "unexpected {e:?}"),
            }
        }

        let mut unique = numbers.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), numbers.len());

        let stored = ledger
            .versions(t.id(), &VersionPageRequest::new(50, SortDirection::Ascending))
            .await
            .unwrap()
            .items;
        let expected: Vec<u32> = (1..=stored.len() as u32).collect();
        assert_eq!(
            stored.iter().map(|v| v.version).collect::<Vec<_>>(),
            expected
        );
        assert_eq!(stored.len(), numbers.len() + 1);
    }

    #[tokio::test]
    async fn rejects_blank_names() {
        let ledger = ledger();
        let res = ledger
            .create_template(TemplateInfo::new("ns", "  "), content("v1"))
            .await;
        assert!(matches!(res, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn lost_slots_are_retried_a_bounded_number_of_times() {
        let db = Arc::new(ScriptedDb {
            always_conflict: true,
            ..Default::default()
        });
        let ledger = VersionLedger::new(db.clone()).with_max_retries(2);
        let t = template_with(&ledger, 1).await;

        let res = ledger.create_version(t.id(), content("v2")).await;
        assert!(matches!(res, Err(Error::Conflict(_))));
        assert_eq!(db.appends.load(Ordering::SeqCst), 3);

        let db = Arc::new(ScriptedDb {
            always_conflict: true,
            ..Default::default()
        });
        let ledger = VersionLedger::new(db.clone());
        let t = template_with(&ledger, 1).await;

        assert!(ledger.create_version(t.id(), content("v2")).await.is_err());
        assert_eq!(db.appends.load(Ordering::SeqCst), DEFAULT_MAX_RETRIES + 1);
        assert_eq!(ledger.latest(t.id()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn committed_writes_are_not_reported_as_timeouts() {
        let db = Arc::new(ScriptedDb {
            stall_after_commit: Some(Duration::from_millis(300)),
            ..Default::default()
        });
        let ledger = VersionLedger::new(db.clone());
        let t = template_with(&ledger, 1).await;
        let ctx = OperationContext::background().with_timeout(Duration::from_millis(100));

        let created = ctx
            .run(ledger.create_version(t.id(), content("v2")))
            .await
            .unwrap();
        assert_eq!(created.version_number(), 2);
        assert_eq!(created.info.id, t.id());

        let archived = ctx.run(ledger.archive(t.id())).await.unwrap();
        assert!(archived.is_archived());
        assert_eq!(archived.version_number(), 2);

        let stored = db.inner.get_latest_version(t.id()).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }
}
