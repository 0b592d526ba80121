use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::dispatches::{self, AGGREGATE_TYPE};

/// Persisted event as published to downstream consumers.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct DomainEvent {
    pub id: String,
    pub aggregate_type: String,
    pub sequence: usize,
    pub event_type: String,
    pub event_version: String,
    /// JSON-encoded event body
    pub payload: String,
    /// JSON-encoded command metadata
    pub metadata: String,
}

impl DomainEvent {
    pub fn is_dispatch(&self) -> bool {
        self.aggregate_type == AGGREGATE_TYPE
    }

    /// Decodes the payload of a dispatch event.
    pub fn dispatch_event(&self) -> Result<dispatches::Event, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}
