use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

// It is used by strum to convert the enum to a string
// but the compiler complains that it is unused
#[allow(unused_imports)]
use std::str::FromStr;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogRecord {
    pub event_id: i64,
    pub template_id: Option<Uuid>,
    pub version: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum EventType {
    // Template lifecycle
    TemplateCreated,
    TemplateCloned,
    TemplateArchived,

    // Version lifecycle
    VersionCreated,

    // Engine/system events
    EngineEvent,
}
