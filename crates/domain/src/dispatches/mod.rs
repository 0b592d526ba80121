/// Dispatch aggregate
pub mod aggregate;

/// Commands
pub mod commands;

/// Creation strategies
pub mod creation;

/// Events
pub mod events;

/// Incident log
pub mod incidents;

/// Input DTOs
pub mod inputs;

/// Collaborators consulted by the aggregate
pub mod services;

/// State machine
pub mod transitions;

/// View (read model)
pub mod view;

/// CQRS setup
pub mod cqrs;

pub use aggregate::{Dispatch, DispatchStatus, DispatchType, PrescriptionRecord, AGGREGATE_TYPE};
pub use commands::Command;
pub use creation::DispatchCreationResult;
pub use events::Event;
pub use incidents::{Incident, IncidentCategory};
pub use services::{
    DispatchLookup, DynamoReferenceData, InMemoryDispatches, InMemoryReferenceData, ReferenceData,
    ReferenceKind, Services, ViewLookup,
};
pub use transitions::Transition;
pub use view::{Query, View};
