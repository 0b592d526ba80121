//! Creation strategies.
//!
//! Each strategy validates its variant's input and builds a dispatch that is
//! already ASSIGNED, since rider and vehicle are mandatory at creation. The
//! strategies are pure; reference lookups happen in the aggregate.

use chrono::{DateTime, Utc};

use crate::errors::Error;
use crate::roles::Actor;

use super::aggregate::{Dispatch, DispatchStatus, DispatchType, PrescriptionRecord};
use super::events::Event;
use super::inputs::{
    CreateDirectInput, CreatePrescriptionInput, CreateResendInput, CreateTransferInput,
    DeliveryDetails, PrescriptionDetails,
};

pub(crate) const MAX_ADDRESS_LEN: usize = 200;
const MAX_ORDER_CODE_LEN: usize = 50;
const MAX_PRESCRIPTION_NUMBER_LEN: usize = 50;
const MAX_PHYSICIAN_NAME_LEN: usize = 100;
pub(crate) const MAX_REFERENCE_LEN: usize = 64;

/// Outcome of a creation strategy, tagged by variant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispatchCreationResult {
    Direct {
        dispatch: Dispatch,
    },
    Prescription {
        dispatch: Dispatch,
        prescription: PrescriptionRecord,
    },
    Transfer {
        dispatch: Dispatch,
    },
    Resend {
        dispatch: Dispatch,
        original_dispatch_id: String,
    },
}

impl DispatchCreationResult {
    pub fn dispatch(&self) -> &Dispatch {
        match self {
            DispatchCreationResult::Direct { dispatch }
            | DispatchCreationResult::Prescription { dispatch, .. }
            | DispatchCreationResult::Transfer { dispatch }
            | DispatchCreationResult::Resend { dispatch, .. } => dispatch,
        }
    }

    /// Creation is recorded as CREATED followed by the assignment, in one commit.
    pub fn into_events(self) -> Vec<Event> {
        let dispatch = match self {
            DispatchCreationResult::Direct { dispatch }
            | DispatchCreationResult::Prescription { dispatch, .. }
            | DispatchCreationResult::Transfer { dispatch }
            | DispatchCreationResult::Resend { dispatch, .. } => dispatch,
        };

        vec![
            Event::DispatchCreated {
                id: dispatch.id.clone(),
                created_at: dispatch.created_at,
                dispatch_type: dispatch.dispatch_type,
                origin_pharmacy_id: dispatch.origin_pharmacy_id,
                secondary_pharmacy_id: dispatch.secondary_pharmacy_id,
                delivery_address: dispatch.delivery_address,
                order_code: dispatch.order_code,
                original_dispatch_id: dispatch.original_dispatch_id,
                notes: dispatch.notes,
                created_by: dispatch.created_by,
                prescription: dispatch.prescription,
            },
            Event::DispatchAssigned {
                id: dispatch.id,
                rider_id: dispatch.rider_id.unwrap_or_default(),
                vehicle_id: dispatch.vehicle_id.unwrap_or_default(),
                updated_at: dispatch.created_at,
            },
        ]
    }
}

pub fn create_direct(
    id: &str,
    actor: &Actor,
    created_at: DateTime<Utc>,
    input: CreateDirectInput,
) -> Result<DispatchCreationResult, Error> {
    let dispatch = routed(id, actor, created_at, DispatchType::Direct, input.delivery)?;
    Ok(DispatchCreationResult::Direct { dispatch })
}

pub fn create_prescription(
    id: &str,
    actor: &Actor,
    created_at: DateTime<Utc>,
    input: CreatePrescriptionInput,
) -> Result<DispatchCreationResult, Error> {
    let prescription = prescription_record(input.prescription, created_at)?;
    let mut dispatch = routed(id, actor, created_at, DispatchType::Prescription, input.delivery)?;
    dispatch.prescription = Some(prescription.clone());

    Ok(DispatchCreationResult::Prescription {
        dispatch,
        prescription,
    })
}

pub fn create_transfer(
    id: &str,
    actor: &Actor,
    created_at: DateTime<Utc>,
    input: CreateTransferInput,
) -> Result<DispatchCreationResult, Error> {
    let secondary = required(
        "secondary pharmacy",
        &input.secondary_pharmacy_id,
        MAX_REFERENCE_LEN,
    )?;
    let mut dispatch = routed(id, actor, created_at, DispatchType::Transfer, input.delivery)?;

    if secondary == dispatch.origin_pharmacy_id {
        return Err(Error::validation(
            "Secondary pharmacy must differ from the origin pharmacy",
        ));
    }
    dispatch.secondary_pharmacy_id = Some(secondary);

    Ok(DispatchCreationResult::Transfer { dispatch })
}

/// Retries `original`, which must have FAILED and been loaded under
/// `input.original_dispatch_id`.
pub fn create_resend(
    id: &str,
    actor: &Actor,
    created_at: DateTime<Utc>,
    original: &Dispatch,
    input: CreateResendInput,
) -> Result<DispatchCreationResult, Error> {
    if original.id != input.original_dispatch_id {
        return Err(Error::Storage {
            message: format!(
                "Dispatch stored under {} carries id {}",
                input.original_dispatch_id, original.id
            ),
        });
    }
    if original.status != DispatchStatus::Failed {
        return Err(Error::validation(format!(
            "Only FAILED dispatches can be resent, dispatch {} is {}",
            original.id,
            original.status.as_str()
        )));
    }

    let original_dispatch_id = input.original_dispatch_id;
    let delivery = DeliveryDetails {
        origin_pharmacy_id: original.origin_pharmacy_id.clone(),
        rider_id: input.rider_id,
        vehicle_id: input.vehicle_id,
        delivery_address: input.delivery_address,
        order_code: original.order_code.clone(),
        notes: input.notes,
    };
    let mut dispatch = routed(id, actor, created_at, DispatchType::Resend, delivery)?;
    dispatch.secondary_pharmacy_id = original.secondary_pharmacy_id.clone();
    dispatch.original_dispatch_id = Some(original_dispatch_id.clone());

    Ok(DispatchCreationResult::Resend {
        dispatch,
        original_dispatch_id,
    })
}

fn routed(
    id: &str,
    actor: &Actor,
    created_at: DateTime<Utc>,
    dispatch_type: DispatchType,
    delivery: DeliveryDetails,
) -> Result<Dispatch, Error> {
    Ok(Dispatch {
        id: id.to_string(),
        created_at,
        updated_at: created_at,
        dispatch_type,
        status: DispatchStatus::Assigned,
        origin_pharmacy_id: required(
            "origin pharmacy",
            &delivery.origin_pharmacy_id,
            MAX_REFERENCE_LEN,
        )?,
        rider_id: Some(required("rider", &delivery.rider_id, MAX_REFERENCE_LEN)?),
        vehicle_id: Some(required("vehicle", &delivery.vehicle_id, MAX_REFERENCE_LEN)?),
        delivery_address: required(
            "delivery address",
            &delivery.delivery_address,
            MAX_ADDRESS_LEN,
        )?,
        order_code: optional("order code", delivery.order_code, MAX_ORDER_CODE_LEN)?,
        notes: optional("notes", delivery.notes, usize::MAX)?,
        created_by: Some(actor.user_id.clone()),
        ..Default::default()
    })
}

fn prescription_record(
    details: PrescriptionDetails,
    created_at: DateTime<Utc>,
) -> Result<PrescriptionRecord, Error> {
    if details.issued_on > created_at.date_naive() {
        return Err(Error::validation(
            "Prescription issue date cannot be in the future",
        ));
    }

    Ok(PrescriptionRecord {
        number: required(
            "prescription number",
            &details.number,
            MAX_PRESCRIPTION_NUMBER_LEN,
        )?,
        physician_name: required(
            "physician name",
            &details.physician_name,
            MAX_PHYSICIAN_NAME_LEN,
        )?,
        issued_on: details.issued_on,
        notes: optional("prescription notes", details.notes, usize::MAX)?,
        document_path: None,
    })
}

pub(crate) fn required(field: &str, value: &str, max_len: usize) -> Result<String, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(Error::validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(value.to_string())
}

fn optional(field: &str, value: Option<String>, max_len: usize) -> Result<Option<String>, Error> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => required(field, value, max_len).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use cqrs_es::Aggregate;

    use super::*;
    use crate::errors::ErrorKind;
    use crate::roles::Role;

    fn operator() -> Actor {
        Actor::new("op-1".to_string(), Some(Role::Operator))
    }

    fn delivery() -> DeliveryDetails {
        DeliveryDetails {
            origin_pharmacy_id: "PH-1".to_string(),
            rider_id: "R-1".to_string(),
            vehicle_id: "V-1".to_string(),
            delivery_address: "Calle 1".to_string(),
            order_code: Some("ORD-77".to_string()),
            notes: None,
        }
    }

    fn failed_original() -> Dispatch {
        Dispatch {
            id: "D3".to_string(),
            status: DispatchStatus::Failed,
            dispatch_type: DispatchType::Transfer,
            origin_pharmacy_id: "PH-1".to_string(),
            secondary_pharmacy_id: Some("PH-2".to_string()),
            order_code: Some("ORD-3".to_string()),
            delivery_address: "Calle 3".to_string(),
            ..Default::default()
        }
    }

    fn resend_input(original: &str) -> CreateResendInput {
        CreateResendInput {
            original_dispatch_id: original.to_string(),
            rider_id: "R-2".to_string(),
            vehicle_id: "V-2".to_string(),
            delivery_address: "Calle 3 depto 4".to_string(),
            notes: Some("second attempt".to_string()),
        }
    }

    #[test]
    fn direct_dispatch_is_assigned_and_owned() {
        let result = create_direct(
            "D1",
            &operator(),
            Utc::now(),
            CreateDirectInput {
                delivery: delivery(),
            },
        )
        .unwrap();

        let dispatch = result.dispatch();
        assert_eq!(dispatch.status, DispatchStatus::Assigned);
        assert_eq!(dispatch.dispatch_type, DispatchType::Direct);
        assert_eq!(dispatch.created_by.as_deref(), Some("op-1"));
        assert_eq!(dispatch.rider_id.as_deref(), Some("R-1"));
        assert!(dispatch.finished_at.is_none());
    }

    #[test]
    fn blank_and_oversized_fields_are_rejected() {
        let mut input = delivery();
        input.rider_id = "  ".to_string();
        let err = create_direct("D1", &operator(), Utc::now(), CreateDirectInput { delivery: input })
            .unwrap_err();
        assert_eq!(err, Error::validation("rider is required"));

        let mut input = delivery();
        input.delivery_address = "x".repeat(201);
        let err = create_direct("D1", &operator(), Utc::now(), CreateDirectInput { delivery: input })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn prescription_dispatch_carries_its_record() {
        let result = create_prescription(
            "D2",
            &operator(),
            Utc::now(),
            CreatePrescriptionInput {
                delivery: delivery(),
                prescription: PrescriptionDetails {
                    number: "RX-100".to_string(),
                    physician_name: "Dra. Soto".to_string(),
                    issued_on: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                    notes: None,
                },
            },
        )
        .unwrap();

        let DispatchCreationResult::Prescription {
            dispatch,
            prescription,
        } = result
        else {
            panic!("expected a prescription result");
        };
        assert_eq!(prescription.number, "RX-100");
        assert_eq!(dispatch.prescription, Some(prescription));
    }

    #[test]
    fn prescription_from_the_future_is_rejected() {
        let created_at = Utc::now();
        let err = create_prescription(
            "D2",
            &operator(),
            created_at,
            CreatePrescriptionInput {
                delivery: delivery(),
                prescription: PrescriptionDetails {
                    number: "RX-100".to_string(),
                    physician_name: "Dra. Soto".to_string(),
                    issued_on: created_at.date_naive() + chrono::Days::new(3),
                    notes: None,
                },
            },
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn transfer_needs_a_different_secondary_pharmacy() {
        let same = CreateTransferInput {
            delivery: delivery(),
            secondary_pharmacy_id: " PH-1 ".to_string(),
        };
        let err = create_transfer("D5", &operator(), Utc::now(), same).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let other = CreateTransferInput {
            delivery: delivery(),
            secondary_pharmacy_id: "PH-2".to_string(),
        };
        let result = create_transfer("D5", &operator(), Utc::now(), other).unwrap();
        assert_eq!(
            result.dispatch().secondary_pharmacy_id.as_deref(),
            Some("PH-2")
        );
    }

    #[test]
    fn resend_copies_the_failed_original() {
        let original = failed_original();

        let result =
            create_resend("D4", &operator(), Utc::now(), &original, resend_input("D3")).unwrap();

        let dispatch = result.dispatch();
        assert_eq!(dispatch.dispatch_type, DispatchType::Resend);
        assert_eq!(dispatch.original_dispatch_id.as_deref(), Some("D3"));
        assert_eq!(dispatch.origin_pharmacy_id, "PH-1");
        assert_eq!(dispatch.secondary_pharmacy_id.as_deref(), Some("PH-2"));
        assert_eq!(dispatch.order_code.as_deref(), Some("ORD-3"));
        assert_eq!(dispatch.rider_id.as_deref(), Some("R-2"));
        assert_eq!(dispatch.delivery_address, "Calle 3 depto 4");
    }

    #[test]
    fn resend_of_a_live_dispatch_is_rejected() {
        for status in [
            DispatchStatus::Created,
            DispatchStatus::Assigned,
            DispatchStatus::InProgress,
            DispatchStatus::Finished,
            DispatchStatus::Cancelled,
        ] {
            let original = Dispatch {
                status,
                ..failed_original()
            };
            let err = create_resend("D4", &operator(), Utc::now(), &original, resend_input("D3"))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn resend_refuses_an_original_stored_under_another_key() {
        let original = Dispatch {
            id: "OTHER".to_string(),
            ..failed_original()
        };

        let err = create_resend("D4", &operator(), Utc::now(), &original, resend_input("D3"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn replaying_creation_events_rebuilds_the_dispatch() {
        let result = create_transfer(
            "D5",
            &operator(),
            Utc::now(),
            CreateTransferInput {
                delivery: delivery(),
                secondary_pharmacy_id: "PH-2".to_string(),
            },
        )
        .unwrap();
        let expected = result.dispatch().clone();

        let mut replayed = Dispatch::default();
        for event in result.into_events() {
            replayed.apply(event);
        }

        assert_eq!(replayed, expected);
    }
}
