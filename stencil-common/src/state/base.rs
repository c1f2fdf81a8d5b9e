use async_trait::async_trait;
use std::fmt::Debug;
use uuid::Uuid;

use crate::{error::Error, event::EventLogRecord};

#[async_trait]
pub trait BaseDbTrait: Send + Sync + Debug + 'static {
    /// Logs a generic system event not tied to specific state updates.
    /// ---
    /// Should be used sparingly.
    /// Lifecycle events are recorded as part of every mutating call,
    /// inside the same commit as the mutation itself.
    async fn log_system_event(&self, message: String) -> Result<(), Error>;

    /// Lists recorded events, oldest first.
    /// ---
    /// Can optionally filter by `template_id`
    async fn list_events(&self, template_id: Option<Uuid>) -> Result<Vec<EventLogRecord>, Error>;
}
