use std::sync::Arc;

use crate::cache::CachedLookup;
use crate::crypto::PasswordManager;
use crate::error::ClassifiedError;
use crate::user::{
    NewUser, Role, UniquenessChecker, UserRecord, UserRepository, UserView,
};

type Result<T> = std::result::Result<T, ClassifiedError>;

/// Reads and registration around the user storage.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    lookup: CachedLookup,
    uniqueness: UniquenessChecker,
    passwords: PasswordManager,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        lookup: CachedLookup,
        passwords: PasswordManager,
    ) -> Self {
        Self {
            uniqueness: UniquenessChecker::new(Arc::clone(&repo)),
            repo,
            lookup,
            passwords,
        }
    }

    /// Find a user by email, served from cache when possible.
    pub async fn get_user_by_email(&self, email: &str) -> Result<UserView> {
        self.lookup.get_by_key(email).await
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<UserView> {
        self.repo
            .find_by_id(id)
            .await
            .map_err(|err| err.unavailable())?
            .map(|user| user.view())
            .ok_or_else(|| ClassifiedError::not_found_by("id", id.to_string()))
    }

    /// Find a user by full name and role text.
    pub async fn find_by_full_name_and_role(
        &self,
        full_name: &str,
        role: &str,
    ) -> Result<UserView> {
        let role = Role::normalize(role)?;

        self.repo
            .find_by_full_name_and_role(full_name, role)
            .await
            .map_err(|err| err.unavailable())?
            .map(|user| user.view())
            .ok_or_else(|| ClassifiedError::not_found_by("full name", full_name))
    }

    pub async fn list_users(&self) -> Result<Vec<UserView>> {
        let users = self
            .repo
            .find_all()
            .await
            .map_err(|err| err.unavailable())?;

        Ok(users.iter().map(UserRecord::view).collect())
    }

    /// Register a new user.
    ///
    /// Hash password unless it already is a PHC string.
    pub async fn create_user(&self, user: NewUser) -> Result<UserView> {
        self.uniqueness.check_new(&user.email, &user.phone).await?;
        let role = Role::normalize(&user.role)?;

        let password = self.passwords.hash_if_plain(&user.password).map_err(
            |err| {
                tracing::error!(error = %err, "failed to hash password");
                ClassifiedError::Unavailable
            },
        )?;

        let record = UserRecord {
            id: 0,
            full_name: user.full_name,
            email: user.email,
            phone: user.phone,
            password,
            role,
        };

        let saved = self
            .repo
            .save(record.clone())
            .await
            .map_err(|err| err.classify(&record))?;

        tracing::info!(id = saved.id, role = %saved.role, "user created");
        Ok(saved.view())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::MokaUserCache;
    use crate::crypto::is_phc_hash;
    use crate::error::Conflict;
    use crate::user::MemoryUserRepository;

    fn service() -> (Arc<MemoryUserRepository>, UserService) {
        let repo = Arc::new(MemoryUserRepository::new());
        let cache = Arc::new(MokaUserCache::new(Duration::from_secs(60), 100));
        let lookup = CachedLookup::new(repo.clone(), cache);

        (
            repo.clone(),
            UserService::new(repo, lookup, PasswordManager::cheap()),
        )
    }

    fn new_user(email: &str, phone: &str) -> NewUser {
        NewUser {
            full_name: "Alan Turing".into(),
            email: email.into(),
            phone: phone.into(),
            password: "enigma-1912".into(),
            role: "faculty_member".into(),
        }
    }

    #[tokio::test]
    async fn test_create_user() {
        let (repo, service) = service();

        let user = service
            .create_user(new_user("alan@x.com", "0600000001"))
            .await
            .unwrap();

        assert_eq!(user.id, 1);
        assert_eq!(user.role, Role::FacultyMember);

        let stored = repo.find_by_id(1).await.unwrap().unwrap();
        assert!(is_phc_hash(&stored.password));
        assert_eq!(service.get_user_by_email("alan@x.com").await.unwrap(), user);
        assert_eq!(service.get_user_by_id(1).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_create_user_conflicts() {
        let (_, service) = service();
        service
            .create_user(new_user("alan@x.com", "0600000001"))
            .await
            .unwrap();

        assert_eq!(
            service
                .create_user(new_user("alan@x.com", "0600000009"))
                .await
                .unwrap_err(),
            Conflict::email("alan@x.com").into()
        );
        assert_eq!(
            service
                .create_user(new_user("other@x.com", "0600000001"))
                .await
                .unwrap_err(),
            Conflict::phone("0600000001").into()
        );
        assert_eq!(
            service
                .create_user(new_user("alan@x.com", "0600000001"))
                .await
                .unwrap_err()
                .to_string(),
            "User with Email: alan@x.com and Phone: 0600000001 already exist."
        );
    }

    #[tokio::test]
    async fn test_create_user_rejects_unknown_role() {
        let (_, service) = service();
        let mut user = new_user("alan@x.com", "0600000001");
        user.role = "super-student".into();

        assert_eq!(
            service.create_user(user).await.unwrap_err(),
            ClassifiedError::invalid_role()
        );
    }

    #[tokio::test]
    async fn test_find_by_full_name_and_role() {
        let (_, service) = service();
        let user = service
            .create_user(new_user("alan@x.com", "0600000001"))
            .await
            .unwrap();

        assert_eq!(
            service
                .find_by_full_name_and_role("Alan Turing", "FACULTY_MEMBER")
                .await
                .unwrap(),
            user
        );
        assert!(matches!(
            service
                .find_by_full_name_and_role("Alan Turing", "STUDENT")
                .await,
            Err(ClassifiedError::NotFound { .. })
        ));
        assert!(matches!(
            service.find_by_full_name_and_role("Alan Turing", "boss").await,
            Err(ClassifiedError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_users() {
        let (_, service) = service();
        assert!(service.list_users().await.unwrap().is_empty());

        service
            .create_user(new_user("a@x.com", "0600000001"))
            .await
            .unwrap();
        service
            .create_user(new_user("b@x.com", "0600000002"))
            .await
            .unwrap();

        let emails: Vec<_> = service
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|user| user.email)
            .collect();
        assert_eq!(emails, ["a@x.com", "b@x.com"]);
    }
}
