//! Domain vocabulary shared by the database layer and the HTTP service.
//!
//! Statuses and roles are persisted as their upper-case names. Every change of
//! status or role goes through a transition function here, so the rules live in
//! one place instead of being spread across handlers.

use std::fmt;
use std::str::FromStr;

mod page;

pub use page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    User,
}

string_enum!(Role, "role", {
    Admin => "ADMIN",
    Manager => "MANAGER",
    User => "USER",
});

impl Role {
    pub fn can_manage_users(self) -> bool {
        self == Role::Admin
    }

    /// Admins and managers create, assign and see every task.
    pub fn can_manage_tasks(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn can_read_audit(self) -> bool {
        self == Role::Admin
    }

    pub fn change_to(self, to: Role) -> Result<Role, TransitionError> {
        if self == to {
            return Err(TransitionError {
                entity: "user role",
                from: self.as_str(),
                to: to.as_str(),
            });
        }
        Ok(to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Disabled,
}

string_enum!(UserStatus, "user status", {
    Active => "ACTIVE",
    Disabled => "DISABLED",
});

impl UserStatus {
    pub fn disable(self) -> Result<UserStatus, TransitionError> {
        self.move_to(UserStatus::Disabled)
    }

    pub fn enable(self) -> Result<UserStatus, TransitionError> {
        self.move_to(UserStatus::Active)
    }

    fn move_to(self, to: UserStatus) -> Result<UserStatus, TransitionError> {
        if self == to {
            return Err(TransitionError {
                entity: "user",
                from: self.as_str(),
                to: to.as_str(),
            });
        }
        Ok(to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Done,
    Cancelled,
}

string_enum!(TaskStatus, "task status", {
    Open => "OPEN",
    InProgress => "IN_PROGRESS",
    Done => "DONE",
    Cancelled => "CANCELLED",
});

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }

    pub fn transition_to(self, to: TaskStatus) -> Result<TaskStatus, TransitionError> {
        use TaskStatus::*;

        let allowed = matches!(
            (self, to),
            (Open, InProgress)
                | (Open, Cancelled)
                | (InProgress, Open)
                | (InProgress, Done)
                | (InProgress, Cancelled)
        );
        if !allowed {
            return Err(TransitionError {
                entity: "task",
                from: self.as_str(),
                to: to.as_str(),
            });
        }
        Ok(to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

string_enum!(TaskPriority, "task priority", {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
});
