use chrono::{DateTime, Utc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use super::aggregate::{DispatchType, PrescriptionRecord};
use super::incidents::Incident;
use super::inputs::DispatchChanges;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    DispatchCreated {
        id: String,
        created_at: DateTime<Utc>,
        dispatch_type: DispatchType,
        origin_pharmacy_id: String,
        secondary_pharmacy_id: Option<String>,
        delivery_address: String,
        order_code: Option<String>,
        original_dispatch_id: Option<String>,
        notes: Option<String>,
        created_by: Option<String>,
        prescription: Option<PrescriptionRecord>,
    },

    DispatchAssigned {
        id: String,
        rider_id: String,
        vehicle_id: String,
        updated_at: DateTime<Utc>,
    },

    DeliveryStarted {
        id: String,
        updated_at: DateTime<Utc>,
    },

    DispatchFinalized {
        id: String,
        finished_at: DateTime<Utc>,
    },

    DispatchCancelled {
        id: String,
        reason: String,
        updated_at: DateTime<Utc>,
    },

    DispatchFailed {
        id: String,
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    },

    DispatchModified {
        id: String,
        changes: DispatchChanges,
        updated_at: DateTime<Utc>,
    },

    PrescriptionDocumentAttached {
        id: String,
        document_path: String,
        updated_at: DateTime<Utc>,
    },

    IncidentReported {
        id: String,
        incident: Incident,
    },

    IncidentResolved {
        id: String,
        incident_id: u32,
        updated_at: DateTime<Utc>,
    },
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::DispatchCreated { .. } => "Dispatch:Created".to_string(),
            Event::DispatchAssigned { .. } => "Dispatch:Assigned".to_string(),
            Event::DeliveryStarted { .. } => "Dispatch:DeliveryStarted".to_string(),
            Event::DispatchFinalized { .. } => "Dispatch:Finalized".to_string(),
            Event::DispatchCancelled { .. } => "Dispatch:Cancelled".to_string(),
            Event::DispatchFailed { .. } => "Dispatch:Failed".to_string(),
            Event::DispatchModified { .. } => "Dispatch:Modified".to_string(),
            Event::PrescriptionDocumentAttached { .. } => {
                "Dispatch:PrescriptionDocumentAttached".to_string()
            }
            Event::IncidentReported { .. } => "Dispatch:IncidentReported".to_string(),
            Event::IncidentResolved { .. } => "Dispatch:IncidentResolved".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
