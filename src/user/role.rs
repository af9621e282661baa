//! Closed set of user roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClassifiedError;

/// Role bound to a [`crate::user::UserRecord`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Student,
    FacultyMember,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 3] =
        [Role::Student, Role::FacultyMember, Role::Administrator];

    /// Canonical name, as stored and sent to the identity authority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::FacultyMember => "FACULTY_MEMBER",
            Role::Administrator => "ADMINISTRATOR",
        }
    }

    /// Render allowed values, e.g. `[STUDENT, FACULTY_MEMBER, ADMINISTRATOR]`.
    pub fn allowed() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(Role::as_str).collect();
        format!("[{}]", names.join(", "))
    }

    /// Normalize free-text role input.
    ///
    /// Matching is case-insensitive and exact once surrounding whitespace is
    /// trimmed. `"student"` is accepted, `"STUDENT_X"` is not.
    pub fn normalize(input: &str) -> Result<Self, ClassifiedError> {
        let candidate = input.trim();

        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(candidate))
            .ok_or_else(ClassifiedError::invalid_role)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ClassifiedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl TryFrom<String> for Role {
    type Error = ClassifiedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value)
    }
}
