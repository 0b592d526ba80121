//! Incident log: delivery problems recorded against a dispatch.
//!
//! Incidents are append-only and independent of the dispatch lifecycle, so a
//! problem discovered after finalization can still be logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::aggregate::Dispatch;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentCategory {
    AbsentCustomer,
    WrongAddress,
    CustomerRefused,
    Accident,
    VehicleFailure,
    WrongProduct,
    TrafficDelay,
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Incident {
    /// Sequence number within the owning dispatch, starting at 1.
    pub id: u32,
    pub category: IncidentCategory,
    pub description: String,
    pub reported_at: DateTime<Utc>,
    pub resolved: bool,
}

impl Incident {
    /// Marks the incident resolved. Resolving twice is a no-op.
    pub fn resolve(&mut self) {
        self.resolved = true;
    }
}

/// Builds the next incident for `dispatch` without touching it.
pub fn attach(
    dispatch: &Dispatch,
    category: IncidentCategory,
    description: &str,
    reported_at: DateTime<Utc>,
) -> Result<Incident, Error> {
    let description = description.trim();
    if description.is_empty() {
        return Err(Error::validation("Incident description is required"));
    }

    Ok(Incident {
        id: next_incident_id(dispatch),
        category,
        description: description.to_string(),
        reported_at,
        resolved: false,
    })
}

fn next_incident_id(dispatch: &Dispatch) -> u32 {
    dispatch
        .incidents
        .iter()
        .map(|incident| incident.id)
        .max()
        .unwrap_or(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatches::DispatchStatus;

    fn finished_dispatch() -> Dispatch {
        Dispatch {
            id: "D1".to_string(),
            status: DispatchStatus::Finished,
            finished_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    #[test]
    fn attaches_to_terminal_dispatch() {
        let dispatch = finished_dispatch();

        let incident = attach(
            &dispatch,
            IncidentCategory::WrongProduct,
            "  customer received ibuprofen instead of paracetamol ",
            Utc::now(),
        )
        .unwrap();

        assert_eq!(incident.id, 1);
        assert!(!incident.resolved);
        assert_eq!(
            incident.description,
            "customer received ibuprofen instead of paracetamol"
        );
    }

    #[test]
    fn ids_follow_existing_incidents() {
        let mut dispatch = finished_dispatch();
        let first = attach(&dispatch, IncidentCategory::Accident, "minor crash", Utc::now()).unwrap();
        dispatch.incidents.push(first);

        let second = attach(&dispatch, IncidentCategory::Other, "late", Utc::now()).unwrap();
        assert_eq!(second.id, 2);
    }

    #[test]
    fn blank_description_is_rejected() {
        let err = attach(&finished_dispatch(), IncidentCategory::Other, "   ", Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut incident =
            attach(&finished_dispatch(), IncidentCategory::TrafficDelay, "jam", Utc::now()).unwrap();

        incident.resolve();
        incident.resolve();

        assert!(incident.resolved);
    }
}
