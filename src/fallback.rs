//! Turn identity authority failures into [`ClassifiedError`].
//!
//! Raw transport details are logged here and never returned to the caller.

use serde_json::Value;

use crate::error::ClassifiedError;
use crate::identity::RemoteFailure;

/// Used when a rejection carries no readable message.
pub const GENERIC_REJECTION: &str = "Identity authority rejected the request.";

/// Classify a failed identity call. Never panics.
pub fn classify(failure: &RemoteFailure) -> ClassifiedError {
    match failure {
        RemoteFailure::Rejected { status, body } => {
            let message = extract_message(body);
            tracing::error!(
                status,
                message = message.as_deref().unwrap_or_default(),
                "identity authority rejected update"
            );

            // A 400 body is surfaced verbatim. Other statuses reuse whatever
            // message could be extracted.
            match message {
                Some(message) => ClassifiedError::invalid_argument(message),
                None => {
                    tracing::error!(status, "failed to parse the error response");
                    ClassifiedError::invalid_argument(GENERIC_REJECTION)
                },
            }
        },
        RemoteFailure::Malformed { reason, .. } => {
            tracing::error!(%reason, "failed to parse identity authority response");
            ClassifiedError::Unavailable
        },
        RemoteFailure::Timeout
        | RemoteFailure::Connection(_)
        | RemoteFailure::CircuitOpen { .. } => {
            tracing::error!(error = %failure, "identity authority unavailable");
            ClassifiedError::Unavailable
        },
    }
}

/// Best-effort `message` lookup in a JSON error body.
///
/// Falls back on `error` then `detail` when `message` is absent.
fn extract_message(body: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(body).ok()?;

    ["message", "error", "detail"]
        .iter()
        .filter_map(|field| json.get(field).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_owned)
}
