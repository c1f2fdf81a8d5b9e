use async_trait::async_trait;
use stencil_common::{
    error::Error,
    event::{EventLogRecord, EventType},
    state::BaseDbTrait,
};
use uuid::Uuid;

use crate::{db::InMemoryStateDb, event_logging::log_event_in_txn};

#[async_trait]
impl BaseDbTrait for InMemoryStateDb {
    async fn log_system_event(&self, message: String) -> Result<(), Error> {
        let mut events = self.events.lock().await;
        log_event_in_txn(
            &mut events,
            None,
            None,
            EventType::EngineEvent,
            Some(message),
            None,
        );
        Ok(())
    }

    async fn list_events(&self, template_id: Option<Uuid>) -> Result<Vec<EventLogRecord>, Error> {
        let events = self.events.lock().await;

        Ok(events
            .records
            .iter()
            .filter(|e| template_id.is_none() || e.template_id == template_id)
            .cloned()
            .collect())
    }
}
