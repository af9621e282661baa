//! Partial update of a user.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::coordinator::UpdatedUser;
use crate::error::ServerError;
use crate::router::{Bearer, Valid, non_blank, validate_phone};
use crate::user::PartialUpdate;

#[derive(Debug, Default, validator::Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default, deserialize_with = "non_blank")]
    #[validate(length(
        min = 2,
        max = 100,
        message = "Full name must be 2 to 100 characters long."
    ))]
    full_name: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    #[validate(email(message = "Email must be formated."))]
    email: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    #[validate(custom(function = "validate_phone"))]
    phone: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    #[validate(length(min = 8, message = "Password must contain at least 8 characters."))]
    password: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    role: Option<String>,
}

impl From<Body> for PartialUpdate {
    fn from(body: Body) -> Self {
        Self {
            full_name: body.full_name,
            email: body.email,
            phone: body.phone,
            password: body.password,
            role: body.role,
        }
    }
}

pub async fn handler(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Bearer(token): Bearer,
    Valid(body): Valid<Body>,
) -> Result<Json<UpdatedUser>, ServerError> {
    let updated = state
        .coordinator
        .partially_update(&email, body.into(), &token)
        .await?;

    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use crate::identity::RemoteFailure;
    use crate::identity::testing::ScriptedAuthority;
    use crate::router::testing::state;
    use crate::*;

    async fn patch(
        authority: Arc<ScriptedAuthority>,
        path: &str,
        body: serde_json::Value,
        token: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let app = app(state(authority));
        let response =
            make_request(app, Method::PATCH, path, body.to_string(), token).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_update_email_returns_credentials() {
        let authority = Arc::new(ScriptedAuthority::succeeding());
        let (status, body) = patch(
            authority.clone(),
            "/users/old@x.com",
            json!({ "email": "a@x.com", "fullName": "" }),
            Some("caller-token"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["fullName"], "User 1");
        assert_eq!(body["accessToken"], "fresh-access");
        assert_eq!(body["refreshToken"], "fresh-refresh");
        assert_eq!(authority.requests()[0].2, "caller-token");
    }

    #[tokio::test]
    async fn test_update_phone_has_no_credentials() {
        let (status, body) = patch(
            Arc::new(ScriptedAuthority::succeeding()),
            "/users/old@x.com",
            json!({ "phone": "0700000000" }),
            Some("caller-token"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phone"], "0700000000");
        assert!(body.get("accessToken").is_none());
    }

    #[tokio::test]
    async fn test_update_requires_bearer() {
        let authority = Arc::new(ScriptedAuthority::succeeding());
        let (status, _) = patch(
            authority.clone(),
            "/users/old@x.com",
            json!({ "email": "a@x.com" }),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(authority.calls(), 0);
    }

    #[tokio::test]
    async fn test_update_conflict() {
        let (status, body) = patch(
            Arc::new(ScriptedAuthority::succeeding()),
            "/users/old@x.com",
            json!({ "email": "taken@x.com", "phone": "0600000002" }),
            Some("caller-token"),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body["detail"],
            "User with Email: taken@x.com and Phone: 0600000002 already exist."
        );
    }

    #[tokio::test]
    async fn test_update_unavailable() {
        let (status, body) = patch(
            Arc::new(ScriptedAuthority::failing(RemoteFailure::Connection(
                "connection refused".into(),
            ))),
            "/users/old@x.com",
            json!({ "role": "ADMINISTRATOR" }),
            Some("caller-token"),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body["detail"],
            "Sorry! Service is unavailable. Please try again later."
        );
    }

    #[tokio::test]
    async fn test_update_invalid_role() {
        let (status, body) = patch(
            Arc::new(ScriptedAuthority::succeeding()),
            "/users/old@x.com",
            json!({ "role": "STUDENT_ADMINISTRATOR" }),
            Some("caller-token"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["detail"],
            "Invalid role provided. Allowed roles are [STUDENT, FACULTY_MEMBER, ADMINISTRATOR]"
        );
    }
}
