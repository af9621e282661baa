//! Users-related HTTP API.
mod create;
mod get;
mod update;

use axum::Router;
use axum::routing::get;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        // `GET /users` lists users, `POST /users` creates one.
        .route("/", get(get::list).post(create::handler))
        // `GET /users/search?fullName=&role=`.
        .route("/search", get(get::search))
        .route("/id/{id}", get(get::by_id))
        // `PATCH /users/{email}` goes to `update`. Authorization required.
        .route("/{email}", get(get::by_email).patch(update::handler))
}
