//! Remote identity authority.
//!
//! The authority owns credentials and the identity-bearing fields of a user.
//! It is updated first; local storage follows only once it accepted.
mod http;

pub use http::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const BEARER: &str = "Bearer ";

/// Fresh tokens issued by the identity authority.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

/// Fields forwarded to the identity authority. Absent fields are not sent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Bearer credential of the inbound request, scheme prefix stripped.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Extract the token from an `Authorization` header value.
    ///
    /// Returns `None` for a missing scheme or an empty token.
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        let scheme = value.get(..BEARER.len())?;
        if !scheme.eq_ignore_ascii_case(BEARER) {
            return None;
        }

        let token = value[BEARER.len()..].trim();
        (!token.is_empty()).then(|| Self(token.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Why a call to the identity authority did not succeed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RemoteFailure {
    /// The authority answered with a non-2xx status.
    #[error("identity authority rejected the request with status {status}")]
    Rejected { status: u16, body: String },
    /// The authority answered 2xx with a body that is not [`Credentials`].
    #[error("identity authority returned an unreadable body: {reason}")]
    Malformed { body: String, reason: String },
    #[error("identity authority timed out")]
    Timeout,
    #[error("identity authority unreachable: {0}")]
    Connection(String),
    /// The circuit is open and the call was not attempted.
    #[error("circuit open, retry after {retry_after_secs} seconds")]
    CircuitOpen { retry_after_secs: u64 },
}

impl RemoteFailure {
    /// Whether the authority never produced a response.
    pub fn is_no_response(&self) -> bool {
        !matches!(self, Self::Rejected { .. } | Self::Malformed { .. })
    }
}

/// Port for the identity authority.
#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    /// Update the identity bound to `key`, forwarding the caller's credential.
    async fn update_identity(
        &self,
        key: &str,
        fields: &IdentityUpdate,
        bearer: &BearerToken,
    ) -> Result<Credentials, RemoteFailure>;
}

/// Test double answering every call the same way.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    enum Mode {
        Respond(Result<Credentials, RemoteFailure>),
        Hang,
    }

    pub struct ScriptedAuthority {
        mode: Mode,
        calls: AtomicUsize,
        requests: Mutex<Vec<(String, IdentityUpdate, String)>>,
    }

    impl ScriptedAuthority {
        fn with_mode(mode: Mode) -> Self {
            Self {
                mode,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn succeeding() -> Self {
            Self::with_mode(Mode::Respond(Ok(Credentials {
                access_token: "fresh-access".into(),
                refresh_token: "fresh-refresh".into(),
            })))
        }

        pub fn failing(failure: RemoteFailure) -> Self {
            Self::with_mode(Mode::Respond(Err(failure)))
        }

        pub fn hanging() -> Self {
            Self::with_mode(Mode::Hang)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// `(key, fields, bearer)` of every call.
        pub fn requests(&self) -> Vec<(String, IdentityUpdate, String)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IdentityAuthority for ScriptedAuthority {
        async fn update_identity(
            &self,
            key: &str,
            fields: &IdentityUpdate,
            bearer: &BearerToken,
        ) -> Result<Credentials, RemoteFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push((
                key.to_owned(),
                fields.clone(),
                bearer.as_str().to_owned(),
            ));

            match &self.mode {
                Mode::Respond(outcome) => outcome.clone(),
                Mode::Hang => std::future::pending().await,
            }
        }
    }
}
