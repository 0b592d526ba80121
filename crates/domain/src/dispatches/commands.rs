use serde::{Deserialize, Serialize};

use crate::roles::Actor;

use super::incidents::IncidentCategory;
use super::inputs::{CreationRequest, DispatchChanges};

/// Every command names the acting user; authorization happens in the aggregate.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Create a dispatch through one of the creation strategies
    CreateDispatch {
        id: String,
        actor: Actor,
        request: CreationRequest,
    },

    /// Rider picked up the order
    StartDelivery {
        actor: Actor,
    },

    /// Delivered
    FinalizeDispatch {
        actor: Actor,
    },

    /// Manager-only; the reason is appended to the notes
    CancelDispatch {
        actor: Actor,
        reason: String,
    },

    FailDispatch {
        actor: Actor,
        reason: Option<String>,
    },

    /// Edit rider, vehicle, address or notes of an open dispatch
    ModifyDispatch {
        actor: Actor,
        changes: DispatchChanges,
    },

    /// Record where the scanned prescription was stored
    AttachPrescriptionDocument {
        actor: Actor,
        document_path: String,
    },

    ReportIncident {
        actor: Actor,
        category: IncidentCategory,
        description: String,
    },

    ResolveIncident {
        actor: Actor,
        incident_id: u32,
    },
}

impl Command {
    /// Creation command whose dispatch id is the aggregate id it runs under.
    pub fn create(aggregate_id: &str, actor: Actor, request: CreationRequest) -> Self {
        Command::CreateDispatch {
            id: aggregate_id.to_string(),
            actor,
            request,
        }
    }

    pub fn actor(&self) -> &Actor {
        match self {
            Command::CreateDispatch { actor, .. }
            | Command::StartDelivery { actor }
            | Command::FinalizeDispatch { actor }
            | Command::CancelDispatch { actor, .. }
            | Command::FailDispatch { actor, .. }
            | Command::ModifyDispatch { actor, .. }
            | Command::AttachPrescriptionDocument { actor, .. }
            | Command::ReportIncident { actor, .. }
            | Command::ResolveIncident { actor, .. } => actor,
        }
    }
}
