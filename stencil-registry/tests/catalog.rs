use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use stencil_common::{
    common::{Pagination, SortDirection, VersionPageRequest},
    context::OperationContext,
    error::Error,
    event::EventType,
    state::BaseDbTrait,
    template::TemplateFilter,
};
use stencil_persistence_mem::InMemoryStateDb;
use stencil_registry::{
    TemplateCatalog, VersionLedger,
    catalog::NewTemplate,
    config::{ConfigSource, FileConfigSource, ResolvedConfig},
};
use tokio::sync::watch;
use uuid::Uuid;

const CONFIG: &str = r#"
system:
  ONEPANEL_API_URL: https://api.onepanel.site
  applicationNodePoolLabel: node.kubernetes.io/instance-type
  applicationNodePoolOptions: |
    - value: Standard_D4s_v3
      name: "CPU: 4, RAM: 16GB"
      resources:
        requests: {cpu: 4, memory: 16Gi}
    - value: Standard_NC6
      name: "GPU: 1xK80"
      resources:
        limits:
          nvidia.com/gpu: 1
namespaces:
  default:
    artifactRepository:
      s3:
        keyFormat: "artifacts/{{workflow.namespace}}/{{workflow.name}}/{{pod.name}}"
        bucket: shared
        endpoint: s3.amazonaws.com
        region: us-west-2
"#;

const MANIFEST: &str = r#"
entrypoint: main
arguments:
  parameters:
    - name: sys-node-pool
      value: Standard_NC6
      type: select.nodepool
templates:
  - name: main
    container:
      image: busybox
    outputs:
      artifacts:
        - name: model
          path: /tmp/model
          s3: {}
"#;

const PINNED_MANIFEST: &str = r#"
templates:
  - name: main
    nodePool: Standard_D4s_v3
    container:
      image: busybox
"#;

struct Harness {
    db: Arc<InMemoryStateDb>,
    catalog: TemplateCatalog,
}

fn harness() -> Harness {
    harness_with(Arc::new(FileConfigSource::from_yaml_str(CONFIG).unwrap()))
}

fn harness_with(config: Arc<dyn ConfigSource>) -> Harness {
    let db = Arc::new(InMemoryStateDb::new());
    let catalog = TemplateCatalog::new(VersionLedger::new(db.clone()), config);
    Harness { db, catalog }
}

fn new_template(name: &str, manifest: &str) -> NewTemplate {
    NewTemplate {
        namespace: "ns1".to_string(),
        name: name.to_string(),
        manifest: manifest.to_string(),
        labels: BTreeMap::new(),
    }
}

fn ctx() -> OperationContext {
    OperationContext::background()
}

#[derive(Debug)]
struct SlowConfigSource {
    inner: FileConfigSource,
    delay: Duration,
}

#[async_trait]
impl ConfigSource for SlowConfigSource {
    async fn resolve(&self, namespace: &str) -> Result<ResolvedConfig, Error> {
        tokio::time::sleep(self.delay).await;
        self.inner.resolve(namespace).await
    }
}

fn slow_harness() -> Harness {
    harness_with(Arc::new(SlowConfigSource {
        inner: FileConfigSource::from_yaml_str(CONFIG).unwrap(),
        delay: Duration::from_millis(200),
    }))
}

#[tokio::test]
async fn create_then_get_returns_generated_version() {
    let h = harness();

    let created = h
        .catalog
        .create_workflow_template(&ctx(), new_template("Train Model", MANIFEST))
        .await
        .unwrap();

    assert_eq!(created.version_number(), 1);
    assert_eq!(created.info.uid, "train-model");
    assert_eq!(created.manifest(), MANIFEST);

    let generated: serde_yaml::Value = serde_yaml::from_str(created.generated_manifest()).unwrap();
    let step = &generated["templates"][0];
    assert_eq!(
        step["nodeSelector"]["node.kubernetes.io/instance-type"],
        "{{workflow.parameters.sys-node-pool}}"
    );
    assert_eq!(
        step["outputs"]["artifacts"][0]["s3"]["key"],
        "artifacts/ns1/{{workflow.name}}/{{pod.name}}/model"
    );

    let pool = &created.version.content.parameters[0];
    assert_eq!(pool.options.len(), 2);

    let fetched = h
        .catalog
        .get_workflow_template(&ctx(), created.id(), None)
        .await
        .unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn versions_are_appended_densely() {
    let h = harness();
    let created = h
        .catalog
        .create_workflow_template(&ctx(), new_template("pipeline", MANIFEST))
        .await
        .unwrap();

    let v2 = h
        .catalog
        .create_workflow_template_version(&ctx(), created.id(), PINNED_MANIFEST)
        .await
        .unwrap();
    assert_eq!(v2.version_number(), 2);

    let first = h
        .catalog
        .get_workflow_template(&ctx(), created.id(), Some(1))
        .await
        .unwrap();
    assert_eq!(first.manifest(), MANIFEST);

    let latest = h
        .catalog
        .get_workflow_template(&ctx(), created.id(), None)
        .await
        .unwrap();
    assert_eq!(latest.manifest(), PINNED_MANIFEST);

    let missing = h
        .catalog
        .get_workflow_template(&ctx(), created.id(), Some(3))
        .await;
    assert!(matches!(missing, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn invalid_manifest_leaves_no_trace() {
    let h = harness();

    let res = h
        .catalog
        .create_workflow_template(&ctx(), new_template("broken", "templates: [oops"))
        .await;
    assert!(matches!(res, Err(Error::InvalidManifest(_))));

    let unknown_pool = h
        .catalog
        .create_workflow_template(
            &ctx(),
            new_template("bad-pool", "templates:\n  - name: main\n    nodePool: tpu\n"),
        )
        .await;
    assert!(matches!(unknown_pool, Err(Error::UnknownNodePool { .. })));

    let (templates, total) = h
        .catalog
        .list_workflow_templates(&ctx(), "ns1", &Pagination::default(), &TemplateFilter::default())
        .await
        .unwrap();
    assert!(templates.is_empty());
    assert_eq!(total, 0);
    assert!(h.db.list_events(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_version_keeps_history_intact() {
    let h = harness();
    let created = h
        .catalog
        .create_workflow_template(&ctx(), new_template("pipeline", MANIFEST))
        .await
        .unwrap();

    let res = h
        .catalog
        .create_workflow_template_version(&ctx(), created.id(), "")
        .await;
    assert!(matches!(res, Err(Error::InvalidManifest(_))));

    let latest = h
        .catalog
        .get_workflow_template(&ctx(), created.id(), None)
        .await
        .unwrap();
    assert_eq!(latest.version_number(), 1);
}

#[tokio::test]
async fn preview_is_not_persisted() {
    let h = harness();

    let preview = h
        .catalog
        .generate_workflow_template(&ctx(), "ns1", Some("preview"), PINNED_MANIFEST)
        .await
        .unwrap();

    assert_eq!(preview.id(), Uuid::nil());
    assert_eq!(preview.version_number(), 0);
    assert!(preview.generated_manifest().contains("Standard_D4s_v3"));

    let (_, total) = h
        .catalog
        .list_workflow_templates(&ctx(), "ns1", &Pagination::default(), &TemplateFilter::default())
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn listing_hides_archived_unless_asked() {
    let h = harness();
    let keep = h
        .catalog
        .create_workflow_template(&ctx(), new_template("keep", MANIFEST))
        .await
        .unwrap();
    let gone = h
        .catalog
        .create_workflow_template(&ctx(), new_template("gone", MANIFEST))
        .await
        .unwrap();

    let archived = h
        .catalog
        .archive_workflow_template(&ctx(), gone.id())
        .await
        .unwrap();
    assert!(archived.is_archived());

    let (active, total) = h
        .catalog
        .list_workflow_templates(&ctx(), "ns1", &Pagination::default(), &TemplateFilter::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(active[0].id(), keep.id());

    let all = TemplateFilter {
        include_archived: true,
    };
    let (everything, total) = h
        .catalog
        .list_workflow_templates(&ctx(), "ns1", &Pagination::default(), &all)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert!(everything.iter().any(|t| t.is_archived()));

    let (other_ns, _) = h
        .catalog
        .list_workflow_templates(&ctx(), "ns2", &Pagination::default(), &all)
        .await
        .unwrap();
    assert!(other_ns.is_empty());
}

#[tokio::test]
async fn archived_templates_reject_new_versions() {
    let h = harness();
    let created = h
        .catalog
        .create_workflow_template(&ctx(), new_template("pipeline", MANIFEST))
        .await
        .unwrap();

    h.catalog
        .archive_workflow_template(&ctx(), created.id())
        .await
        .unwrap();
    // archiving again is a no-op
    h.catalog
        .archive_workflow_template(&ctx(), created.id())
        .await
        .unwrap();

    let res = h
        .catalog
        .create_workflow_template_version(&ctx(), created.id(), PINNED_MANIFEST)
        .await;
    assert!(matches!(res, Err(Error::TemplateArchived { template_id }) if template_id == created.id()));

    let archive_events = h
        .db
        .list_events(Some(created.id()))
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::TemplateArchived)
        .count();
    assert_eq!(archive_events, 1);
}

#[tokio::test]
async fn field_projection_lists_selected_fields() {
    let h = harness();
    for name in ["alpha", "beta"] {
        h.catalog
            .create_workflow_template(&ctx(), new_template(name, MANIFEST))
            .await
            .unwrap();
    }

    let records = h
        .catalog
        .list_workflow_templates_field(&ctx(), "ns1", "name,version", &TemplateFilter::default())
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.len() == 2));
    assert_eq!(records[0]["name"], "alpha");
    assert_eq!(records[1]["version"], 1);

    let bad = h
        .catalog
        .list_workflow_templates_field(&ctx(), "ns1", "name,color", &TemplateFilter::default())
        .await;
    assert!(matches!(bad, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn clone_copies_latest_or_full_history() {
    let h = harness();
    let source = h
        .catalog
        .create_workflow_template(&ctx(), new_template("pipeline", MANIFEST))
        .await
        .unwrap();
    h.catalog
        .create_workflow_template_version(&ctx(), source.id(), PINNED_MANIFEST)
        .await
        .unwrap();

    let latest_only = h
        .catalog
        .clone_workflow_template(&ctx(), source.id(), Some("copy".to_string()), false)
        .await
        .unwrap();
    assert_ne!(latest_only.id(), source.id());
    assert_eq!(latest_only.version_number(), 1);
    assert_eq!(latest_only.manifest(), PINNED_MANIFEST);

    let full = h
        .catalog
        .clone_workflow_template(&ctx(), source.id(), None, true)
        .await
        .unwrap();
    assert!(full.name().starts_with("pipeline-clone-"));
    assert_eq!(full.version_number(), 2);

    let page = h
        .catalog
        .list_workflow_template_versions(
            &ctx(),
            full.id(),
            &VersionPageRequest::new(10, SortDirection::Ascending),
        )
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].manifest(), MANIFEST);

    let taken = h
        .catalog
        .clone_workflow_template(&ctx(), source.id(), Some("copy".to_string()), false)
        .await;
    assert!(matches!(taken, Err(Error::AlreadyExists { .. })));
}

#[tokio::test]
async fn version_pages_follow_cursor() {
    let h = harness();
    let created = h
        .catalog
        .create_workflow_template(&ctx(), new_template("pipeline", MANIFEST))
        .await
        .unwrap();
    for _ in 0..4 {
        h.catalog
            .create_workflow_template_version(&ctx(), created.id(), PINNED_MANIFEST)
            .await
            .unwrap();
    }

    let first = h
        .catalog
        .list_workflow_template_versions(
            &ctx(),
            created.id(),
            &VersionPageRequest::new(2, SortDirection::Descending),
        )
        .await
        .unwrap();
    let numbers: Vec<u32> = first.items.iter().map(|t| t.version_number()).collect();
    assert_eq!(numbers, vec![5, 4]);

    let cursor = first.next_cursor.unwrap();
    let second = h
        .catalog
        .list_workflow_template_versions(
            &ctx(),
            created.id(),
            &VersionPageRequest::new(2, SortDirection::Descending).after(cursor),
        )
        .await
        .unwrap();
    let numbers: Vec<u32> = second.items.iter().map(|t| t.version_number()).collect();
    assert_eq!(numbers, vec![3, 2]);
}

#[tokio::test]
async fn timeout_aborts_without_writing() {
    let h = slow_harness();
    let ctx = OperationContext::background().with_timeout(Duration::from_millis(10));

    let res = h
        .catalog
        .create_workflow_template(&ctx, new_template("slow", MANIFEST))
        .await;
    assert!(matches!(res, Err(Error::Timeout)));
    assert!(h.db.list_events(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_aborts_without_writing() {
    let h = slow_harness();
    let (tx, rx) = watch::channel(false);
    let ctx = OperationContext::background().with_cancellation(rx);

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = tx.send(true);
    });

    let res = h
        .catalog
        .create_workflow_template(&ctx, new_template("slow", MANIFEST))
        .await;
    cancel.await.unwrap();

    assert!(matches!(res, Err(Error::Cancelled)));
    assert!(h.db.list_events(None).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_versions_get_distinct_numbers() {
    let h = harness();
    let created = h
        .catalog
        .create_workflow_template(&ctx(), new_template("pipeline", MANIFEST))
        .await
        .unwrap();

    let catalog = Arc::new(h.catalog);
    let mut handles = Vec::new();
    for _ in 0..4 {
        let catalog = catalog.clone();
        let id = created.id();
        handles.push(tokio::spawn(async move {
            catalog
                .create_workflow_template_version(&OperationContext::background(), id, PINNED_MANIFEST)
                .await
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(template) => numbers.push(template.version_number()),
            Err(e) => assert!(matches!(e, Error::Conflict(_)), "unexpected error: {e}"),
        }
    }

    numbers.sort_unstable();
    numbers.dedup();
    assert!(!numbers.is_empty());

    let page = catalog
        .list_workflow_template_versions(
            &ctx(),
            created.id(),
            &VersionPageRequest::new(10, SortDirection::Ascending),
        )
        .await
        .unwrap();
    let stored: Vec<u32> = page.items.iter().map(|t| t.version_number()).collect();
    let expected: Vec<u32> = (1..=stored.len() as u32).collect();
    assert_eq!(stored, expected);
    assert_eq!(stored.len(), numbers.len() + 1);
}
