use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::roles::{authorize, Actor, Operation};

use super::creation::{self, required, MAX_ADDRESS_LEN, MAX_REFERENCE_LEN};
use super::incidents::{self, Incident, IncidentCategory};
use super::inputs::{CreationRequest, DispatchChanges};
use super::transitions::{self, Transition};
use super::{Command, Event, Services};

/// Dispatch lifecycle status
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    /// Recorded, no rider yet
    #[default]
    Created,
    /// Rider and vehicle assigned
    Assigned,
    /// Rider is on the way
    InProgress,
    /// Delivered
    Finished,
    /// Called off by a manager
    Cancelled,
    /// Delivery attempt failed, may be resent
    Failed,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchType {
    #[default]
    Direct,
    Prescription,
    /// Stock split across two pharmacies
    Transfer,
    /// Retry of a failed dispatch
    Resend,
}

/// Prescription backing a PRESCRIPTION dispatch. Only ever stored inside its dispatch.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PrescriptionRecord {
    pub number: String,
    pub physician_name: String,
    pub issued_on: NaiveDate,
    pub notes: Option<String>,
    pub document_path: Option<String>,
}

/// Dispatch aggregate
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Dispatch {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dispatch_type: DispatchType,
    pub status: DispatchStatus,

    // Routing
    pub origin_pharmacy_id: String,
    pub secondary_pharmacy_id: Option<String>,
    pub rider_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub delivery_address: String,
    pub order_code: Option<String>,

    /// Set on RESEND dispatches only
    pub original_dispatch_id: Option<String>,
    /// Set once, on entering FINISHED
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Acting user at creation; `None` on legacy records
    pub created_by: Option<String>,

    pub prescription: Option<PrescriptionRecord>,
    pub incidents: Vec<Incident>,
}

pub const AGGREGATE_TYPE: &str = "Dispatch";

#[async_trait]
impl Aggregate for Dispatch {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::CreateDispatch { id, actor, request } => {
                self.create(&id, &actor, request, services).await
            }

            Command::StartDelivery { actor } => {
                self.transition(&actor, Transition::Start)?;

                Ok(vec![Event::DeliveryStarted {
                    id: self.id.clone(),
                    updated_at: Utc::now(),
                }])
            }

            Command::FinalizeDispatch { actor } => {
                self.transition(&actor, Transition::Finalize)?;

                Ok(vec![Event::DispatchFinalized {
                    id: self.id.clone(),
                    finished_at: Utc::now(),
                }])
            }

            Command::CancelDispatch { actor, reason } => {
                self.transition(&actor, Transition::Cancel)?;
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(Error::validation("A cancellation reason is required"));
                }

                Ok(vec![Event::DispatchCancelled {
                    id: self.id.clone(),
                    reason: reason.to_string(),
                    updated_at: Utc::now(),
                }])
            }

            Command::FailDispatch { actor, reason } => {
                self.transition(&actor, Transition::Fail)?;

                Ok(vec![Event::DispatchFailed {
                    id: self.id.clone(),
                    reason: reason
                        .map(|reason| reason.trim().to_string())
                        .filter(|reason| !reason.is_empty()),
                    updated_at: Utc::now(),
                }])
            }

            Command::ModifyDispatch { actor, changes } => {
                self.validate_existing()?;
                transitions::ensure_open(self.status)?;
                self.authorize_modify(&actor)?;
                let changes = validate_changes(changes)?;
                services.ensure_assignment_exists(&changes).await?;

                Ok(vec![Event::DispatchModified {
                    id: self.id.clone(),
                    changes,
                    updated_at: Utc::now(),
                }])
            }

            Command::AttachPrescriptionDocument {
                actor,
                document_path,
            } => {
                self.validate_existing()?;
                transitions::ensure_open(self.status)?;
                self.authorize_modify(&actor)?;
                if self.prescription.is_none() {
                    return Err(Error::validation(
                        "Only prescription dispatches hold a prescription document",
                    ));
                }

                Ok(vec![Event::PrescriptionDocumentAttached {
                    id: self.id.clone(),
                    document_path: required("document path", &document_path, 255)?,
                    updated_at: Utc::now(),
                }])
            }

            Command::ReportIncident {
                actor,
                category,
                description,
            } => self.report_incident(&actor, category, &description),

            Command::ResolveIncident { actor, incident_id } => {
                self.validate_existing()?;
                self.authorize_modify(&actor)?;

                let incident = self
                    .incidents
                    .iter()
                    .find(|incident| incident.id == incident_id)
                    .ok_or_else(|| Error::not_found("Incident", &incident_id.to_string()))?;

                if incident.resolved {
                    return Ok(vec![]);
                }

                Ok(vec![Event::IncidentResolved {
                    id: self.id.clone(),
                    incident_id,
                    updated_at: Utc::now(),
                }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::DispatchCreated {
                id,
                created_at,
                dispatch_type,
                origin_pharmacy_id,
                secondary_pharmacy_id,
                delivery_address,
                order_code,
                original_dispatch_id,
                notes,
                created_by,
                prescription,
            } => {
                self.id = id;
                self.created_at = created_at;
                self.updated_at = created_at;
                self.dispatch_type = dispatch_type;
                self.status = DispatchStatus::Created;
                self.origin_pharmacy_id = origin_pharmacy_id;
                self.secondary_pharmacy_id = secondary_pharmacy_id;
                self.delivery_address = delivery_address;
                self.order_code = order_code;
                self.original_dispatch_id = original_dispatch_id;
                self.notes = notes;
                self.created_by = created_by;
                self.prescription = prescription;
            }

            Event::DispatchAssigned {
                rider_id,
                vehicle_id,
                updated_at,
                ..
            } => {
                self.rider_id = Some(rider_id);
                self.vehicle_id = Some(vehicle_id);
                self.status = DispatchStatus::Assigned;
                self.updated_at = updated_at;
            }

            Event::DeliveryStarted { updated_at, .. } => {
                self.status = DispatchStatus::InProgress;
                self.updated_at = updated_at;
            }

            Event::DispatchFinalized { finished_at, .. } => {
                self.status = DispatchStatus::Finished;
                self.finished_at.get_or_insert(finished_at);
                self.updated_at = finished_at;
            }

            Event::DispatchCancelled {
                reason, updated_at, ..
            } => {
                self.status = DispatchStatus::Cancelled;
                self.append_note(&format!("CANCELLED: {reason}"));
                self.updated_at = updated_at;
            }

            Event::DispatchFailed {
                reason, updated_at, ..
            } => {
                self.status = DispatchStatus::Failed;
                if let Some(reason) = reason {
                    self.append_note(&format!("FAILED: {reason}"));
                }
                self.updated_at = updated_at;
            }

            Event::DispatchModified {
                changes,
                updated_at,
                ..
            } => {
                if let Some(rider_id) = changes.rider_id {
                    self.rider_id = Some(rider_id);
                }
                if let Some(vehicle_id) = changes.vehicle_id {
                    self.vehicle_id = Some(vehicle_id);
                }
                if let Some(delivery_address) = changes.delivery_address {
                    self.delivery_address = delivery_address;
                }
                if let Some(notes) = changes.notes {
                    self.notes = Some(notes).filter(|notes| !notes.is_empty());
                }
                self.updated_at = updated_at;
            }

            Event::PrescriptionDocumentAttached {
                document_path,
                updated_at,
                ..
            } => {
                if let Some(prescription) = self.prescription.as_mut() {
                    prescription.document_path = Some(document_path);
                }
                self.updated_at = updated_at;
            }

            Event::IncidentReported { incident, .. } => {
                self.incidents.push(incident);
            }

            Event::IncidentResolved { incident_id, .. } => {
                if let Some(incident) = self
                    .incidents
                    .iter_mut()
                    .find(|incident| incident.id == incident_id)
                {
                    incident.resolve();
                }
            }
        }
    }
}

impl Dispatch {
    pub fn incident(&self, incident_id: u32) -> Option<&Incident> {
        self.incidents
            .iter()
            .find(|incident| incident.id == incident_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    async fn create(
        &self,
        id: &str,
        actor: &Actor,
        request: CreationRequest,
        services: &Services,
    ) -> Result<Vec<Event>, Error> {
        self.validate_new()?;
        authorize(actor, &Operation::CreateDispatch).map_err(|err| {
            tracing::warn!(user_id = %actor.user_id, "Dispatch creation denied: {}", err);
            err
        })?;

        let now = Utc::now();
        let result = match request {
            CreationRequest::Direct(input) => creation::create_direct(id, actor, now, input)?,
            CreationRequest::Prescription(input) => {
                creation::create_prescription(id, actor, now, input)?
            }
            CreationRequest::Transfer(input) => creation::create_transfer(id, actor, now, input)?,
            CreationRequest::Resend(input) => {
                let original = services
                    .dispatches
                    .load_dispatch(&input.original_dispatch_id)
                    .await?
                    .ok_or_else(|| Error::not_found(AGGREGATE_TYPE, &input.original_dispatch_id))?;
                creation::create_resend(id, actor, now, &original, input)?
            }
        };

        services.ensure_references_exist(result.dispatch()).await?;

        tracing::info!(
            dispatch_id = %id,
            user_id = %actor.user_id,
            dispatch_type = ?result.dispatch().dispatch_type,
            "Dispatch created"
        );

        Ok(result.into_events())
    }

    /// Terminal state wins over authorization so closed dispatches always report a conflict.
    fn transition(&self, actor: &Actor, transition: Transition) -> Result<(), Error> {
        self.validate_existing()?;
        let target = transitions::plan(self.status, transition)?;

        match transition {
            Transition::Cancel => authorize(actor, &Operation::CancelDispatch).map_err(|err| {
                tracing::warn!(dispatch_id = %self.id, user_id = %actor.user_id, "{}", err);
                err
            })?,
            _ => self.authorize_modify(actor)?,
        }

        tracing::info!(
            dispatch_id = %self.id,
            user_id = %actor.user_id,
            "Dispatch {} -> {}",
            self.status.as_str(),
            target.as_str()
        );
        Ok(())
    }

    fn report_incident(
        &self,
        actor: &Actor,
        category: IncidentCategory,
        description: &str,
    ) -> Result<Vec<Event>, Error> {
        self.validate_existing()?;
        self.authorize_modify(actor)?;

        let incident = incidents::attach(self, category, description, Utc::now())?;
        tracing::info!(
            dispatch_id = %self.id,
            incident_id = incident.id,
            category = ?category,
            "Incident reported"
        );

        Ok(vec![Event::IncidentReported {
            id: self.id.clone(),
            incident,
        }])
    }

    fn authorize_modify(&self, actor: &Actor) -> Result<(), Error> {
        let operation = Operation::ModifyDispatch {
            creator: self.created_by.as_deref(),
            acting_user: &actor.user_id,
        };

        authorize(actor, &operation).map_err(|err| {
            tracing::warn!(dispatch_id = %self.id, user_id = %actor.user_id, "{}", err);
            err
        })
    }

    fn append_note(&mut self, line: &str) {
        self.notes = Some(match self.notes.take() {
            Some(notes) if !notes.is_empty() => format!("{notes}\n{line}"),
            _ => line.to_string(),
        });
    }

    fn validate_new(&self) -> Result<(), Error> {
        if !self.id.is_empty() {
            return Err(Error::Uniqueness {
                field: "id".to_string(),
            });
        }
        Ok(())
    }

    fn validate_existing(&self) -> Result<(), Error> {
        if self.id.is_empty() {
            return Err(Error::NotFound {
                entity: AGGREGATE_TYPE.to_string(),
            });
        }
        Ok(())
    }
}

fn validate_changes(changes: DispatchChanges) -> Result<DispatchChanges, Error> {
    if changes.is_empty() {
        return Err(Error::validation("No changes given"));
    }

    Ok(DispatchChanges {
        rider_id: changes
            .rider_id
            .map(|rider| required("rider", &rider, MAX_REFERENCE_LEN))
            .transpose()?,
        vehicle_id: changes
            .vehicle_id
            .map(|vehicle| required("vehicle", &vehicle, MAX_REFERENCE_LEN))
            .transpose()?,
        delivery_address: changes
            .delivery_address
            .map(|address| required("delivery address", &address, MAX_ADDRESS_LEN))
            .transpose()?,
        notes: changes.notes.map(|notes| notes.trim().to_string()),
    })
}
