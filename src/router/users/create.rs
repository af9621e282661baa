//! Register a user.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ServerError;
use crate::router::{Valid, validate_phone};
use crate::user::{NewUser, UserView};

#[derive(Debug, validator::Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(
        min = 2,
        max = 100,
        message = "Full name must be 2 to 100 characters long."
    ))]
    full_name: String,
    #[validate(email(message = "Email must be formated."))]
    email: String,
    #[validate(custom(function = "validate_phone"))]
    phone: String,
    #[validate(length(min = 8, message = "Password must contain at least 8 characters."))]
    password: String,
    role: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<UserView>), ServerError> {
    let user = state
        .users
        .create_user(NewUser {
            full_name: body.full_name,
            email: body.email,
            phone: body.phone,
            password: body.password,
            role: body.role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}
