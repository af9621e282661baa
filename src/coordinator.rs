//! Partial update of a user.
//!
//! The identity authority is updated first. Local storage and the cache are
//! only touched once it accepted the change. There is no transaction across
//! the two: a crash in between leaves them diverged.

use std::sync::Arc;

use serde::Serialize;

use crate::breaker::BreakerGuardedCall;
use crate::cache::UserCache;
use crate::crypto::PasswordManager;
use crate::error::ClassifiedError;
use crate::identity::{BearerToken, Credentials, IdentityUpdate};
use crate::user::{
    PartialUpdate, Role, UniquenessChecker, UserRecord, UserRepository,
    UserView,
};

/// Result of a successful partial update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpdatedUser {
    #[serde(flatten)]
    pub user: UserView,
    /// Only set when email or role changed.
    #[serde(flatten)]
    pub credentials: Option<Credentials>,
}

/// Orchestrates uniqueness, role, identity authority, storage and cache for a
/// single partial update.
#[derive(Clone)]
pub struct UpdateCoordinator {
    repo: Arc<dyn UserRepository>,
    cache: Arc<dyn UserCache>,
    uniqueness: UniquenessChecker,
    identity: BreakerGuardedCall,
    passwords: PasswordManager,
}

impl UpdateCoordinator {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        cache: Arc<dyn UserCache>,
        identity: BreakerGuardedCall,
        passwords: PasswordManager,
    ) -> Self {
        Self {
            uniqueness: UniquenessChecker::new(Arc::clone(&repo)),
            repo,
            cache,
            identity,
            passwords,
        }
    }

    /// Apply `update` to the user stored under `key`.
    ///
    /// At most one remote call, one storage write and one cache invalidation
    /// happen per call. Nothing is retried.
    pub async fn partially_update(
        &self,
        key: &str,
        update: PartialUpdate,
        bearer: &BearerToken,
    ) -> Result<UpdatedUser, ClassifiedError> {
        let result = self.apply(key, update.sanitize(), bearer).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        metrics::counter!("user_partial_updates_total", "outcome" => outcome)
            .increment(1);

        match &result {
            Ok(updated) => tracing::info!(
                key,
                id = updated.user.id,
                rotated = updated.credentials.is_some(),
                "user partially updated"
            ),
            Err(err) => tracing::warn!(key, error = %err, "partial update failed"),
        }

        result
    }

    async fn apply(
        &self,
        key: &str,
        update: PartialUpdate,
        bearer: &BearerToken,
    ) -> Result<UpdatedUser, ClassifiedError> {
        let current = self
            .repo
            .find_by_key(key)
            .await
            .map_err(|err| err.unavailable())?
            .ok_or_else(|| ClassifiedError::not_found(key))?;

        self.uniqueness
            .check_for(&current, update.email.as_deref(), update.phone.as_deref())
            .await?;

        let role = update.role.as_deref().map(Role::normalize).transpose()?;

        // Only storage may fail once the remote call succeeded.
        let password_hash = update
            .password
            .as_deref()
            .map(|password| self.passwords.hash_password(password))
            .transpose()
            .map_err(|err| {
                tracing::error!(error = %err, "failed to hash password");
                ClassifiedError::Unavailable
            })?;

        let fields = IdentityUpdate {
            full_name: update.full_name.clone(),
            email: update.email.clone(),
            password: update.password.clone(),
            phone: update.phone.clone(),
            role: role.map(|role| role.as_str().to_owned()),
        };

        let credentials =
            self.identity.update_identity(key, &fields, bearer).await?;

        let rotates = update.rotates_credentials();
        let merged = merge(current, update, role, password_hash);
        let saved = self
            .repo
            .save(merged.clone())
            .await
            .map_err(|err| err.classify(&merged))?;

        self.cache.invalidate(key).await;

        Ok(UpdatedUser {
            user: saved.view(),
            credentials: rotates.then_some(credentials),
        })
    }
}

/// Overwrite only the supplied fields.
fn merge(
    mut user: UserRecord,
    update: PartialUpdate,
    role: Option<Role>,
    password_hash: Option<String>,
) -> UserRecord {
    if let Some(full_name) = update.full_name {
        user.full_name = full_name;
    }
    if let Some(email) = update.email {
        user.email = email;
    }
    if let Some(phone) = update.phone {
        user.phone = phone;
    }
    if let Some(password) = password_hash {
        user.password = password;
    }
    if let Some(role) = role {
        user.role = role;
    }

    user
}
