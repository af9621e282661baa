//! Storage port for users.

use async_trait::async_trait;

use crate::error::{ClassifiedError, Conflict};
use crate::user::{Role, UserRecord};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Field protected by a unique constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Phone,
}

/// Errors raised by a [`UserRepository`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A unique constraint rejected the write. `None` when the backend did not
    /// say which one.
    #[error("unique constraint violated on {field:?}")]
    ConstraintViolation { field: Option<UniqueField> },

    #[error("storage backend failed: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Classify a failed read.
    pub fn unavailable(self) -> ClassifiedError {
        tracing::error!(error = %self, "storage read failed");
        ClassifiedError::Unavailable
    }

    /// Classify against the record that was being written.
    ///
    /// Constraint violations become [`ClassifiedError::Conflict`]. Backend
    /// failures are logged and downgraded to
    /// [`ClassifiedError::Unavailable`].
    pub fn classify(self, candidate: &UserRecord) -> ClassifiedError {
        match self {
            StorageError::ConstraintViolation { field } => {
                let conflict = match field {
                    Some(UniqueField::Email) => Conflict::email(&candidate.email),
                    Some(UniqueField::Phone) => Conflict::phone(&candidate.phone),
                    None => Conflict {
                        email: Some(candidate.email.clone()),
                        phone: Some(candidate.phone.clone()),
                    },
                };
                tracing::warn!(?field, "unique constraint rejected write");
                conflict.into()
            },
            StorageError::Backend(err) => {
                tracing::error!(error = %err, "storage backend failed");
                ClassifiedError::Unavailable
            },
        }
    }
}

/// Port for user persistence.
///
/// Implementations must be safe for concurrent use and must enforce email and
/// phone uniqueness on [`UserRepository::save`].
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by its natural lookup key, the email.
    async fn find_by_key(&self, key: &str) -> StorageResult<Option<UserRecord>>;

    /// Find a user by numeric ID.
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<UserRecord>>;

    /// Find a user with both this full name and role.
    async fn find_by_full_name_and_role(
        &self,
        full_name: &str,
        role: Role,
    ) -> StorageResult<Option<UserRecord>>;

    /// List every user, ordered by ID.
    async fn find_all(&self) -> StorageResult<Vec<UserRecord>>;

    async fn exists_by_email(&self, email: &str) -> StorageResult<bool>;

    async fn exists_by_phone(&self, phone: &str) -> StorageResult<bool>;

    /// Insert (`id == 0`) or update a user, returning what was stored.
    async fn save(&self, user: UserRecord) -> StorageResult<UserRecord>;
}
