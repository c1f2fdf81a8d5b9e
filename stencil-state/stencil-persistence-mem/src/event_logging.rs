use chrono::Utc;
use stencil_common::event::{EventLogRecord, EventType};
use uuid::Uuid;

use crate::db::EventLog;

/// Records an event inside an already held event log guard,
/// as part of the caller's commit.
pub(crate) fn log_event_in_txn(
    log: &mut EventLog,
    template_id: Option<Uuid>,
    version: Option<u32>,
    event_type: EventType,
    message: Option<String>,
    metadata: Option<serde_json::Value>,
) {
    log.next_id += 1;

    log.records.push(EventLogRecord {
        event_id: log.next_id,
        template_id,
        version,
        timestamp: Utc::now(),
        event_type,
        message,
        metadata,
    });
}
