mod memory;
mod postgres;
mod repository;
mod role;
mod service;
mod uniqueness;

pub use memory::*;
pub use postgres::*;
pub use repository::*;
pub use role::*;
pub use service::*;
pub use uniqueness::*;

use serde::{Deserialize, Serialize};

/// User as saved on database.
#[derive(Clone, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    /// Argon2id PHC string. Never serialized.
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

impl UserRecord {
    /// Read-optimized projection, cached and returned to callers.
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            role: self.role,
        }
    }
}

/// Public projection of a [`UserRecord`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
}

/// Sparse set of fields to change on a user.
///
/// `None` means "do not change". Blank strings are treated as `None`, see
/// [`PartialUpdate::sanitize`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    /// Free text, normalized against [`Role`] before use.
    pub role: Option<String>,
}

impl PartialUpdate {
    /// Drop blank values.
    pub fn sanitize(self) -> Self {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        Self {
            full_name: present(self.full_name),
            email: present(self.email),
            phone: present(self.phone),
            password: present(self.password),
            role: present(self.role),
        }
    }

    /// Access token claims depend on email and role only.
    pub fn rotates_credentials(&self) -> bool {
        self.email.is_some() || self.role.is_some()
    }
}

/// Data required to register a user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub role: String,
}
