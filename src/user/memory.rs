//! In-memory storage, used when no database is configured.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::user::{
    Role, StorageError, StorageResult, UniqueField, UserRecord, UserRepository,
};

/// [`UserRepository`] backed by a map guarded by a lock.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<BTreeMap<i64, UserRecord>>,
}

impl MemoryUserRepository {
    /// Create an empty [`MemoryUserRepository`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding `users`. IDs are kept as given.
    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_key(&self, key: &str) -> StorageResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == key).cloned())
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_full_name_and_role(
        &self,
        full_name: &str,
        role: Role,
    ) -> StorageResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.full_name == full_name && u.role == role)
            .cloned())
    }

    async fn find_all(&self) -> StorageResult<Vec<UserRecord>> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn exists_by_email(&self, email: &str) -> StorageResult<bool> {
        Ok(self.users.read().await.values().any(|u| u.email == email))
    }

    async fn exists_by_phone(&self, phone: &str) -> StorageResult<bool> {
        Ok(self.users.read().await.values().any(|u| u.phone == phone))
    }

    async fn save(&self, mut user: UserRecord) -> StorageResult<UserRecord> {
        let mut users = self.users.write().await;

        for other in users.values().filter(|u| u.id != user.id) {
            let field = if other.email == user.email {
                Some(UniqueField::Email)
            } else if other.phone == user.phone {
                Some(UniqueField::Phone)
            } else {
                None
            };

            if field.is_some() {
                return Err(StorageError::ConstraintViolation { field });
            }
        }

        if user.id == 0 {
            user.id = users.keys().next_back().copied().unwrap_or(0) + 1;
        }

        users.insert(user.id, user.clone());
        Ok(user)
    }
}
