//! Dispatch state machine.
//!
//! | from                 | to          | trigger  |
//! |----------------------|-------------|----------|
//! | CREATED, ASSIGNED    | IN_PROGRESS | start    |
//! | ASSIGNED, IN_PROGRESS| FINISHED    | finalize |
//! | any non-terminal     | CANCELLED   | cancel   |
//! | any non-terminal     | FAILED      | fail     |
//!
//! FINISHED, CANCELLED and FAILED are terminal.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::aggregate::DispatchStatus;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Transition {
    Start,
    Finalize,
    Cancel,
    Fail,
}

impl Transition {
    pub fn target(&self) -> DispatchStatus {
        match self {
            Transition::Start => DispatchStatus::InProgress,
            Transition::Finalize => DispatchStatus::Finished,
            Transition::Cancel => DispatchStatus::Cancelled,
            Transition::Fail => DispatchStatus::Failed,
        }
    }

    fn allowed_from(&self, status: DispatchStatus) -> bool {
        use DispatchStatus::*;

        match self {
            Transition::Start => matches!(status, Created | Assigned),
            Transition::Finalize => matches!(status, Assigned | InProgress),
            Transition::Cancel | Transition::Fail => !status.is_terminal(),
        }
    }
}

impl DispatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchStatus::Finished | DispatchStatus::Cancelled | DispatchStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Created => "CREATED",
            DispatchStatus::Assigned => "ASSIGNED",
            DispatchStatus::InProgress => "IN_PROGRESS",
            DispatchStatus::Finished => "FINISHED",
            DispatchStatus::Cancelled => "CANCELLED",
            DispatchStatus::Failed => "FAILED",
        }
    }
}

/// Rejects any mutation of a terminal dispatch.
pub fn ensure_open(status: DispatchStatus) -> Result<(), Error> {
    if status.is_terminal() {
        return Err(Error::TerminalState {
            state: status.as_str().to_string(),
        });
    }
    Ok(())
}

/// Returns the state `transition` leads to from `status`.
pub fn plan(status: DispatchStatus, transition: Transition) -> Result<DispatchStatus, Error> {
    ensure_open(status)?;

    let target = transition.target();
    if !transition.allowed_from(status) {
        return Err(Error::InvalidStateTransition {
            from: status.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use DispatchStatus::*;

    const ALL: [DispatchStatus; 6] = [Created, Assigned, InProgress, Finished, Cancelled, Failed];

    #[test]
    fn table() {
        assert_eq!(plan(Created, Transition::Start), Ok(InProgress));
        assert_eq!(plan(Assigned, Transition::Start), Ok(InProgress));
        assert_eq!(plan(Assigned, Transition::Finalize), Ok(Finished));
        assert_eq!(plan(InProgress, Transition::Finalize), Ok(Finished));
        assert_eq!(plan(Created, Transition::Cancel), Ok(Cancelled));
        assert_eq!(plan(InProgress, Transition::Fail), Ok(Failed));
    }

    #[test]
    fn undefined_transitions_conflict() {
        assert_eq!(
            plan(Created, Transition::Finalize),
            Err(Error::InvalidStateTransition {
                from: "CREATED".to_string(),
                to: "FINISHED".to_string(),
            })
        );
        assert!(plan(InProgress, Transition::Start).is_err());
    }

    #[test]
    fn terminal_states_reject_everything() {
        let transitions = [
            Transition::Start,
            Transition::Finalize,
            Transition::Cancel,
            Transition::Fail,
        ];

        for status in ALL.into_iter().filter(DispatchStatus::is_terminal) {
            for transition in transitions {
                let err = plan(status, transition).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::StateConflict);
                assert!(matches!(err, Error::TerminalState { .. }));
            }
            assert!(ensure_open(status).is_err());
        }
    }
}
