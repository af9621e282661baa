//! HTTP surface.
pub mod status;
pub mod users;

use std::sync::LazyLock;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use regex_lite::Regex;
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use validator::{Validate, ValidationError};

use crate::error::ServerError;
use crate::identity::BearerToken;

static PHONE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{7,15}$").ok());

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Caller credential taken from the `Authorization` header.
pub struct Bearer(pub BearerToken);

impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(BearerToken::from_header)
            .map(Bearer)
            .ok_or(ServerError::Unauthorized)
    }
}

/// Check phone number format.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    match PHONE.as_ref() {
        Some(regex) if regex.is_match(phone) => Ok(()),
        _ => Err(ValidationError::new("phone")
            .with_message("Phone must contain 7 to 15 digits.".into())),
    }
}

/// Treat blank strings as absent.
pub fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::config::{Argon2, Configuration};
    use crate::identity::testing::ScriptedAuthority;
    use crate::user::{MemoryUserRepository, Role, UserRecord};
    use crate::AppState;

    pub fn user(id: i64, email: &str, phone: &str) -> UserRecord {
        UserRecord {
            id,
            full_name: format!("User {id}"),
            email: email.to_owned(),
            phone: phone.to_owned(),
            password: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaA".into(),
            role: Role::Student,
        }
    }

    /// State on memory storage with the two users `old@x.com` and
    /// `taken@x.com`.
    pub fn state(authority: Arc<ScriptedAuthority>) -> AppState {
        let mut config = Configuration::default();
        config.argon2 = Some(Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        });
        let repo = Arc::new(MemoryUserRepository::with_users([
            user(1, "old@x.com", "0600000001"),
            user(2, "taken@x.com", "0600000002"),
        ]));

        AppState::new(Arc::new(config), repo, authority).unwrap()
    }
}
