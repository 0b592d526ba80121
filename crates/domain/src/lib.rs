//! Pharmacy dispatch domain: lifecycle, role policy and incident log.

/// Dispatch aggregate
pub mod dispatches;

/// Domain errors
pub mod errors;

/// Domain events wrapper
pub mod event;

/// Reports
pub mod reports;

/// Role policy
pub mod roles;

pub use errors::{Error, ErrorKind};
pub use event::DomainEvent;
pub use roles::{Actor, Role};
