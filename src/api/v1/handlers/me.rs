/*
 * Responsibility
 * - GET /me: the authenticated principal (401 when anonymous)
 * - GET /session: whether the caller is authenticated, never rejects
 */
use axum::Json;

use crate::api::v1::dto::me::{MeResponse, SessionResponse};
use crate::api::v1::extractors::AuthCtxExtractor;

pub async fn me(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<MeResponse> {
    Json(MeResponse::from(ctx))
}

pub async fn session(ctx: Option<AuthCtxExtractor>) -> Json<SessionResponse> {
    let subject = ctx.map(|AuthCtxExtractor(ctx)| ctx.subject);

    Json(SessionResponse {
        authenticated: subject.is_some(),
        subject,
    })
}
