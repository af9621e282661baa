//! HTTP client for the identity authority.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::identity::{
    BearerToken, Credentials, IdentityAuthority, IdentityUpdate, RemoteFailure,
};

/// Errors raised while building an [`HttpIdentityAuthority`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("identity authority URL is invalid: {0}")]
    Url(#[from] url::ParseError),
    #[error("identity authority URL cannot carry a path: {0}")]
    NotABase(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// [`IdentityAuthority`] reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpIdentityAuthority {
    base_url: Url,
    client: Client,
}

impl HttpIdentityAuthority {
    /// Create a new client.
    ///
    /// `base_url` is the authority root, e.g.
    /// `http://auth-service/auth-service`.
    pub fn new(
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::NotABase(base_url.into()));
        }
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { base_url, client })
    }

    /// `{base}/partial-update/{key}`, the key percent-encoded as a single
    /// path segment.
    fn url(&self, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("partial-update").push(key);
        }
        url
    }
}

#[async_trait]
impl IdentityAuthority for HttpIdentityAuthority {
    async fn update_identity(
        &self,
        key: &str,
        fields: &IdentityUpdate,
        bearer: &BearerToken,
    ) -> Result<Credentials, RemoteFailure> {
        let response = self
            .client
            .patch(self.url(key))
            .bearer_auth(bearer.as_str())
            .json(fields)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_failure)?;

        if !status.is_success() {
            return Err(RemoteFailure::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<Credentials>(&body).map_err(|err| {
            RemoteFailure::Malformed {
                body,
                reason: err.to_string(),
            }
        })
    }
}

fn transport_failure(err: reqwest::Error) -> RemoteFailure {
    if err.is_timeout() {
        RemoteFailure::Timeout
    } else {
        RemoteFailure::Connection(err.to_string())
    }
}
