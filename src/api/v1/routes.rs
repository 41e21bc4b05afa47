/*
 * Responsibility
 * - v1 URL structure
 * - Authentication requirements are expressed per handler via extractors:
 *   `AuthCtxExtractor` (must be authenticated) or `Option<AuthCtxExtractor>`
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::me::{me, session};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/session", get(session))
}
