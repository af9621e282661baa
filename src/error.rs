//! Error handler for user-service.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::user::Role;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Message returned whenever the identity authority cannot be reached.
pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry! Service is unavailable. Please try again later.";

/// Caller-meaningful error categories.
///
/// Raw transport, parse and storage failures are never exposed: they are
/// downgraded into one of these variants before leaving the core.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClassifiedError {
    #[error("user not found with {by}: {key}")]
    NotFound { by: &'static str, key: String },

    #[error("{0}")]
    Conflict(Conflict),

    #[error("{message}")]
    InvalidArgument { message: String },

    /// The only retryable category. Retrying is the caller's job.
    #[error("Sorry! Service is unavailable. Please try again later.")]
    Unavailable,
}

impl ClassifiedError {
    /// No user bound to this email.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::not_found_by("email", key)
    }

    pub fn not_found_by(by: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            by,
            key: key.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Rejected role text.
    pub fn invalid_role() -> Self {
        Self::invalid_argument(format!(
            "Invalid role provided. Allowed roles are {}",
            Role::allowed()
        ))
    }

    /// Label used on metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Unavailable => "unavailable",
        }
    }

    /// Status code a transport is expected to map this error to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Uniqueness violation on email and/or phone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Conflict {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Conflict {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            phone: None,
        }
    }

    pub fn phone(phone: impl Into<String>) -> Self {
        Self {
            email: None,
            phone: Some(phone.into()),
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.email, &self.phone) {
            (Some(email), Some(phone)) => write!(
                f,
                "User with Email: {email} and Phone: {phone} already exist."
            ),
            (Some(email), None) => {
                write!(f, "User with Email: {email} already exists.")
            },
            (None, Some(phone)) => {
                write!(f, "User with Phone: {phone} already exists.")
            },
            (None, None) => write!(f, "User already exists."),
        }
    }
}

impl From<Conflict> for ClassifiedError {
    fn from(conflict: Conflict) -> Self {
        Self::Conflict(conflict)
    }
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Classified(err) => {
                let title = match err {
                    ClassifiedError::NotFound { .. } => "User not found.",
                    ClassifiedError::Conflict(_) => "User already exists.",
                    ClassifiedError::InvalidArgument { .. } => {
                        "Invalid argument."
                    },
                    ClassifiedError::Unavailable => "Service unavailable.",
                };

                response.title(title).status(err.status())
            },

            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::Unauthorized => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Axum(_) => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    let mut response = Response::new(
        serde_json::json!({
            "type": null,
            "title": "Internal server error.",
            "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            "detail": null,
            "instance": null,
            "errors": null,
        })
        .to_string()
        .into(),
    );
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
