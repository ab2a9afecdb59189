use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A detected state transition. Multiple events may fire from one poll
/// cycle; each is dispatched independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewOrder,
    DriverAssigned,
    DriverUnassigned,
    StatusChange,
    IntervalUpdate,
    DriverNearby,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewOrder => "new_order",
            EventKind::DriverAssigned => "driver_assigned",
            EventKind::DriverUnassigned => "driver_unassigned",
            EventKind::StatusChange => "status_change",
            EventKind::IntervalUpdate => "interval_update",
            EventKind::DriverNearby => "driver_nearby",
        }
    }
}

/// Raw detector output, before a message has been rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub order_id: String,
}

/// An event plus its rendered notification message. Transient; never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub kind: EventKind,
    pub order_id: String,
    pub message: String,
}

/// What actually goes out to sinks and websocket subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub account_id: Uuid,
    pub account_name: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: EventRecord,
}
