use crate::live::JoinRecord;
use serde::Serialize;

/// Refresh hints emitted after a deferred drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MappingEvent {
    MappingChanged { target_type: String },
    SubtreeChanged,
}

/// Join lifecycle notifications emitted by the live selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "join", rename_all = "snake_case")]
pub enum JoinEvent {
    Created(JoinRecord),
    Destroyed(JoinRecord),
}

/// Capacity of the broadcast channels carrying events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
