//! Read-through cache for "user by email" lookups.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::error::ClassifiedError;
use crate::user::{UserRepository, UserView};

/// Port for the user cache.
#[async_trait]
pub trait UserCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<UserView>;

    async fn insert(&self, key: &str, user: UserView);

    /// Drop the entry for `key`. The next read repopulates it.
    ///
    /// Must bump [`UserCache::generation`] before the entry is removed.
    async fn invalidate(&self, key: &str);

    /// Number of invalidations so far.
    fn generation(&self) -> u64;
}

/// [`UserCache`] backed by a moka concurrent cache with TTL.
#[derive(Clone)]
pub struct MokaUserCache {
    cache: Cache<String, UserView>,
    generation: Arc<AtomicU64>,
}

impl MokaUserCache {
    /// Create a new cache holding up to `max_capacity` entries for `ttl`.
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl From<&crate::config::Cache> for MokaUserCache {
    fn from(config: &crate::config::Cache) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_capacity)
    }
}

#[async_trait]
impl UserCache for MokaUserCache {
    async fn get(&self, key: &str) -> Option<UserView> {
        self.cache.get(key).await
    }

    async fn insert(&self, key: &str, user: UserView) {
        self.cache.insert(key.to_owned(), user).await;
    }

    async fn invalidate(&self, key: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate(key).await;
        metrics::counter!("user_cache_invalidations_total").increment(1);
        tracing::debug!(key, "user cache entry invalidated");
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Storage reads served through a [`UserCache`].
#[derive(Clone)]
pub struct CachedLookup {
    repo: Arc<dyn UserRepository>,
    cache: Arc<dyn UserCache>,
}

impl CachedLookup {
    pub fn new(repo: Arc<dyn UserRepository>, cache: Arc<dyn UserCache>) -> Self {
        Self { repo, cache }
    }

    /// Get a user by email, populating the cache on miss.
    ///
    /// A fill raced by an invalidation is withdrawn, so a write that
    /// committed during the storage read is not shadowed by the old view.
    pub async fn get_by_key(&self, key: &str) -> Result<UserView, ClassifiedError> {
        if let Some(user) = self.cache.get(key).await {
            return Ok(user);
        }

        let generation = self.cache.generation();

        let user = self
            .repo
            .find_by_key(key)
            .await
            .map_err(|err| err.unavailable())?
            .ok_or_else(|| ClassifiedError::not_found(key))?
            .view();

        self.cache.insert(key, user.clone()).await;
        if self.cache.generation() != generation {
            tracing::debug!(key, "cache fill raced an invalidation, dropped");
            self.cache.invalidate(key).await;
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{MemoryUserRepository, Role, StorageResult, UserRecord};

    /// Storage whose key reads are overtaken by a committed update.
    struct OvertakenRepo {
        inner: MemoryUserRepository,
        cache: Arc<MokaUserCache>,
    }

    #[async_trait]
    impl UserRepository for OvertakenRepo {
        async fn find_by_key(&self, key: &str) -> StorageResult<Option<UserRecord>> {
            let stale = self.inner.find_by_key(key).await?;

            let mut updated = user();
            updated.full_name = "Ada King".into();
            self.inner.save(updated).await?;
            self.cache.invalidate(key).await;

            Ok(stale)
        }

        async fn find_by_id(&self, id: i64) -> StorageResult<Option<UserRecord>> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_full_name_and_role(
            &self,
            full_name: &str,
            role: Role,
        ) -> StorageResult<Option<UserRecord>> {
            self.inner.find_by_full_name_and_role(full_name, role).await
        }

        async fn find_all(&self) -> StorageResult<Vec<UserRecord>> {
            self.inner.find_all().await
        }

        async fn exists_by_email(&self, email: &str) -> StorageResult<bool> {
            self.inner.exists_by_email(email).await
        }

        async fn exists_by_phone(&self, phone: &str) -> StorageResult<bool> {
            self.inner.exists_by_phone(phone).await
        }

        async fn save(&self, user: UserRecord) -> StorageResult<UserRecord> {
            self.inner.save(user).await
        }
    }

    fn user() -> UserRecord {
        UserRecord {
            id: 1,
            full_name: "Ada Lovelace".into(),
            email: "ada@x.com".into(),
            phone: "0600000001".into(),
            password: "hash".into(),
            role: Role::FacultyMember,
        }
    }

    #[tokio::test]
    async fn test_miss_populates_cache() {
        let repo = Arc::new(MemoryUserRepository::with_users([user()]));
        let cache = Arc::new(MokaUserCache::new(Duration::from_secs(60), 100));
        let lookup = CachedLookup::new(repo, cache.clone());

        assert!(cache.get("ada@x.com").await.is_none());
        let found = lookup.get_by_key("ada@x.com").await.unwrap();

        assert_eq!(found, user().view());
        assert_eq!(cache.get("ada@x.com").await, Some(user().view()));
    }

    #[tokio::test]
    async fn test_hit_does_not_read_storage() {
        let repo = Arc::new(MemoryUserRepository::new());
        let cache = Arc::new(MokaUserCache::new(Duration::from_secs(60), 100));
        cache.insert("ada@x.com", user().view()).await;

        let lookup = CachedLookup::new(repo, cache);
        assert_eq!(lookup.get_by_key("ada@x.com").await.unwrap(), user().view());
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let repo = Arc::new(MemoryUserRepository::new());
        let cache = Arc::new(MokaUserCache::new(Duration::from_secs(60), 100));
        let lookup = CachedLookup::new(repo, cache.clone());

        assert_eq!(
            lookup.get_by_key("ghost@x.com").await.unwrap_err(),
            ClassifiedError::not_found("ghost@x.com")
        );
        assert!(cache.get("ghost@x.com").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_drops_entry() {
        let cache = MokaUserCache::new(Duration::from_secs(60), 100);
        cache.insert("ada@x.com", user().view()).await;
        cache.invalidate("ada@x.com").await;

        assert!(cache.get("ada@x.com").await.is_none());
    }

    #[tokio::test]
    async fn test_fill_raced_by_invalidation_is_dropped() {
        let cache = Arc::new(MokaUserCache::new(Duration::from_secs(60), 100));
        let repo = Arc::new(OvertakenRepo {
            inner: MemoryUserRepository::with_users([user()]),
            cache: cache.clone(),
        });
        let lookup = CachedLookup::new(repo, cache.clone());

        // The read itself still answers with what storage returned.
        assert_eq!(lookup.get_by_key("ada@x.com").await.unwrap(), user().view());
        assert!(cache.get("ada@x.com").await.is_none());

        let next = lookup.get_by_key("ada@x.com").await.unwrap();
        assert_eq!(next.full_name, "Ada King");
    }

    #[tokio::test]
    async fn test_invalidate_bumps_generation() {
        let cache = MokaUserCache::new(Duration::from_secs(60), 100);
        assert_eq!(cache.generation(), 0);

        cache.invalidate("ada@x.com").await;
        assert_eq!(cache.generation(), 1);
    }
}
