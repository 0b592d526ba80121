//! Role policy: which operations each role may perform.

use std::fmt;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Closed set of staff roles.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Manager,
    Supervisor,
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "MANAGER",
            Role::Supervisor => "SUPERVISOR",
            Role::Operator => "OPERATOR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MANAGER" => Some(Role::Manager),
            "SUPERVISOR" => Some(Role::Supervisor),
            "OPERATOR" => Some(Role::Operator),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user acting on a request, as supplied by the identity collaborator.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct Actor {
    pub user_id: String,
    pub role: Option<Role>,
}

/// Operations gated by role.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation<'a> {
    /// Read a single dispatch. Any assigned role may.
    ViewDispatch,
    CreateDispatch,
    /// Carries the dispatch creator and the acting user for the ownership check.
    ModifyDispatch {
        creator: Option<&'a str>,
        acting_user: &'a str,
    },
    CancelDispatch,
    ViewReports,
    ManageUsers,
}

impl Operation<'_> {
    fn describe(&self) -> &'static str {
        match self {
            Operation::ViewDispatch => "view dispatches",
            Operation::CreateDispatch => "create dispatches",
            Operation::ModifyDispatch { .. } => "modify this dispatch",
            Operation::CancelDispatch => "cancel dispatches",
            Operation::ViewReports => "view reports",
            Operation::ManageUsers => "manage users",
        }
    }
}

pub fn can(role: Role, operation: &Operation<'_>) -> bool {
    match operation {
        Operation::ViewDispatch => true,
        Operation::CreateDispatch => matches!(role, Role::Manager | Role::Operator),
        Operation::ModifyDispatch {
            creator,
            acting_user,
        } => match role {
            Role::Manager => true,
            // Ownerless dispatches need a manager.
            Role::Operator => creator.is_some_and(|creator| creator == *acting_user),
            Role::Supervisor => false,
        },
        Operation::CancelDispatch | Operation::ManageUsers => role == Role::Manager,
        Operation::ViewReports => matches!(role, Role::Manager | Role::Supervisor),
    }
}

/// Like [`can`], but reports why access was refused.
pub fn authorize(actor: &Actor, operation: &Operation<'_>) -> Result<(), Error> {
    let Some(role) = actor.role else {
        return Err(Error::NoRole {
            user_id: actor.user_id.clone(),
        });
    };

    if can(role, operation) {
        Ok(())
    } else {
        Err(Error::InsufficientRole {
            role: role.to_string(),
            operation: operation.describe().to_string(),
        })
    }
}
