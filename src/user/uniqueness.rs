//! Email and phone uniqueness checks.

use std::sync::Arc;

use crate::error::{ClassifiedError, Conflict};
use crate::user::{UserRecord, UserRepository};

/// Ask storage whether candidate values are already bound to another user.
///
/// Always queries the repository directly, never a cache.
#[derive(Clone)]
pub struct UniquenessChecker {
    repo: Arc<dyn UserRepository>,
}

impl UniquenessChecker {
    /// Create a new [`UniquenessChecker`].
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// Check `email` and `phone` for a user being created.
    pub async fn check_new(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<(), ClassifiedError> {
        self.check(None, Some(email), Some(phone)).await
    }

    /// Check candidate values for an existing user.
    ///
    /// A value equal to the user's own current value is not a collision.
    pub async fn check_for(
        &self,
        current: &UserRecord,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), ClassifiedError> {
        self.check(Some(current), email, phone).await
    }

    async fn check(
        &self,
        current: Option<&UserRecord>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), ClassifiedError> {
        let email = email.filter(|e| current.is_none_or(|u| u.email != *e));
        let phone = phone.filter(|p| current.is_none_or(|u| u.phone != *p));

        let email_taken = match email {
            Some(email) => self
                .repo
                .exists_by_email(email)
                .await
                .map_err(|err| unavailable(err, "email"))?,
            None => false,
        };
        let phone_taken = match phone {
            Some(phone) => self
                .repo
                .exists_by_phone(phone)
                .await
                .map_err(|err| unavailable(err, "phone"))?,
            None => false,
        };

        let conflict = Conflict {
            email: email.filter(|_| email_taken).map(str::to_owned),
            phone: phone.filter(|_| phone_taken).map(str::to_owned),
        };

        if conflict.email.is_some() || conflict.phone.is_some() {
            Err(conflict.into())
        } else {
            Ok(())
        }
    }
}

fn unavailable(err: impl std::fmt::Display, field: &str) -> ClassifiedError {
    tracing::error!(error = %err, field, "uniqueness check failed");
    ClassifiedError::Unavailable
}
