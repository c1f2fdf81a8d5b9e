use std::{collections::HashMap, sync::Arc};

use stencil_common::{
    error::Error,
    event::EventLogRecord,
    state::{ArchiveOutcome, DatabaseTrait},
    template::{TemplateInfo, TemplateVersion, WorkflowTemplate},
};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Transactional in-memory template store.
/// ---
/// Locks are always taken in the order `catalog -> slot -> events`.
/// Every mutation happens after the last lock is acquired, with no
/// further await points, so a dropped future never commits halfway.
#[derive(Debug, Default)]
pub struct InMemoryStateDb {
    pub(crate) catalog: RwLock<Catalog>,
    pub(crate) events: Mutex<EventLog>,
}

impl InMemoryStateDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Catalog {
    pub(crate) slots: HashMap<Uuid, Arc<TemplateSlot>>,
    pub(crate) names: HashMap<(String, String), Uuid>,
    /// Template ids in insertion order.
    pub(crate) order: Vec<Uuid>,
}

impl Catalog {
    pub(crate) fn slot(&self, template_id: Uuid) -> Option<Arc<TemplateSlot>> {
        self.slots.get(&template_id).cloned()
    }
}

/// Per-template critical section.
#[derive(Debug)]
pub(crate) struct TemplateSlot {
    pub(crate) entry: Mutex<TemplateEntry>,
}

#[derive(Debug)]
pub(crate) struct TemplateEntry {
    pub(crate) info: TemplateInfo,
    /// Append-only, ordered by version number.
    pub(crate) versions: Vec<Arc<TemplateVersion>>,
}

impl TemplateEntry {
    pub(crate) fn latest_number(&self) -> u32 {
        self.versions.last().map(|v| v.version).unwrap_or(0)
    }

    /// Current info and latest version, read while the slot is held.
    pub(crate) fn snapshot(&self, changed: bool) -> Result<ArchiveOutcome, Error> {
        let latest = self
            .versions
            .last()
            .ok_or_else(|| Error::Internal(format!("template {} has no versions", self.info.id)))?;

        Ok(ArchiveOutcome {
            template: WorkflowTemplate::new(self.info.clone(), latest.as_ref().clone()),
            changed,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct EventLog {
    pub(crate) records: Vec<EventLogRecord>,
    pub(crate) next_id: i64,
}

/// Implements the [DatabaseTrait] for [InMemoryStateDb]
impl DatabaseTrait for InMemoryStateDb {}
