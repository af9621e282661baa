//! User lookups.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::AppState;
use crate::error::ServerError;
use crate::user::UserView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Search {
    full_name: String,
    role: String,
}

pub async fn by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserView>, ServerError> {
    Ok(Json(state.users.get_user_by_email(&email).await?))
}

pub async fn by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserView>, ServerError> {
    Ok(Json(state.users.get_user_by_id(id).await?))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<Search>,
) -> Result<Json<UserView>, ServerError> {
    let user = state
        .users
        .find_by_full_name_and_role(&query.full_name, &query.role)
        .await?;

    Ok(Json(user))
}

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserView>>, ServerError> {
    Ok(Json(state.users.list_users().await?))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    use super::*;
    use crate::identity::testing::ScriptedAuthority;
    use crate::router::testing::{state, user};
    use crate::*;

    fn router() -> axum::Router {
        app(state(Arc::new(ScriptedAuthority::succeeding())))
    }

    async fn get(path: &str) -> (StatusCode, serde_json::Value) {
        let response =
            make_request(router(), Method::GET, path, String::default(), None)
                .await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_get_user_by_email() {
        let (status, body) = get("/users/old@x.com").await;

        assert_eq!(status, StatusCode::OK);
        let body: UserView = serde_json::from_value(body).unwrap();
        assert_eq!(body, user(1, "old@x.com", "0600000001").view());
    }

    #[tokio::test]
    async fn test_unknown_email_is_not_found() {
        let (status, body) = get("/users/ghost@x.com").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "user not found with email: ghost@x.com");
    }

    #[tokio::test]
    async fn test_get_user_by_id() {
        let (status, body) = get("/users/id/2").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "taken@x.com");
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_search() {
        let (status, body) = get("/users/search?fullName=User%201&role=student").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);
        assert_eq!(body["role"], "STUDENT");

        let (status, _) = get("/users/search?fullName=User%201&role=professor").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list() {
        let (status, body) = get("/users").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }
}
