//! Bearer token → verified identity → `AuthCtx` in request extensions.
//!
//! Per request:
//! - No `Authorization` header, or not the `Bearer ` scheme: pass through
//!   anonymously. Whether a route needs a principal is decided by the route
//!   (see `AuthCtxExtractor`), not here.
//! - Bearer token present: cache hit, or verification on miss. Success attaches
//!   `AuthCtx` and continues; any failure answers 401 without running the
//!   downstream handler.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Install the access middleware on every route of `router`.
///
/// ```ignore
/// let router = api::v1::routes();
/// let router = middleware::auth::access::apply(router, state.clone());
/// app = router.with_state(state);
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 `from_fn` cannot take a State extractor, so pass the state explicitly
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(req.headers()).map(str::to_owned) else {
        return Ok(next.run(req).await);
    };

    let (identity, source) = match state.auth.authenticate(&token).await {
        Ok(resolved) => resolved,
        Err(err) => {
            tracing::warn!(
                error = %err,
                kind = err.kind(),
                "bearer token verification failed"
            );
            return Err(AppError::Unauthorized);
        }
    };

    tracing::debug!(subject = %identity.subject, ?source, "bearer token accepted");

    // middleware → extractor hand-off
    req.extensions_mut().insert(AuthCtx::from(identity));

    Ok(next.run(req).await)
}

/// Raw token from `Authorization: Bearer <token>`, if that is what the header holds.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::get;
    use chrono::Utc;
    use tower::ServiceExt;

    use super::*;
    use crate::api::v1::extractors::AuthCtxExtractor;
    use crate::services::auth::service::testing::StubVerifier;
    use crate::services::auth::{AuthService, VerifiedClaims, VerifyError};
    use crate::services::cache::TokenCache;

    fn outcome(token: &str) -> Result<VerifiedClaims, VerifyError> {
        match token {
            "T1" => Ok(VerifiedClaims {
                subject: "a@b.com".into(),
                expires_at_epoch_seconds: Utc::now().timestamp() + 3600,
            }),
            "T2" => Ok(VerifiedClaims {
                subject: "late@b.com".into(),
                expires_at_epoch_seconds: Utc::now().timestamp() - 5,
            }),
            "idp-down" => Err(VerifyError::Unavailable("jwks request failed".into())),
            _ => Err(VerifyError::Rejected("InvalidSignature".into())),
        }
    }

    struct TestApp {
        router: Router,
        verifier: Arc<StubVerifier>,
        handler_hits: Arc<AtomicUsize>,
    }

    impl TestApp {
        fn new(verifier: StubVerifier) -> Self {
            let verifier = Arc::new(verifier);
            let handler_hits = Arc::new(AtomicUsize::new(0));
            let auth = AuthService::new(TokenCache::new(16), verifier.clone(), "client-id");
            let state = AppState::new(Arc::new(auth));

            let hits = handler_hits.clone();
            let routes = Router::new()
                .route(
                    "/whoami",
                    get(move |ctx: Option<AuthCtxExtractor>, headers: HeaderMap| {
                        let hits = hits.clone();
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            let subject = ctx
                                .map(|AuthCtxExtractor(ctx)| ctx.subject)
                                .unwrap_or_else(|| "anonymous".to_string());
                            let custom = headers
                                .get("x-custom")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("")
                                .to_string();
                            format!("{subject}|{custom}")
                        }
                    }),
                )
                .route(
                    "/private",
                    get(|AuthCtxExtractor(ctx): AuthCtxExtractor| async move { ctx.subject }),
                );

            let router = apply(routes, state.clone()).with_state(state);

            Self {
                router,
                verifier,
                handler_hits,
            }
        }

        async fn call(&self, uri: &str, authorization: Option<&str>) -> (StatusCode, String) {
            let mut builder = Request::builder().uri(uri).header("x-custom", "kept");
            if let Some(value) = authorization {
                builder = builder.header(header::AUTHORIZATION, value);
            }
            let response = self
                .router
                .clone()
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap();

            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, String::from_utf8(bytes.to_vec()).unwrap())
        }

        fn handler_hits(&self) -> usize {
            self.handler_hits.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn extracts_bearer_token_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), Some(""));

        for other in ["Basic dXNlcjpwYXNz", "bearer abc", "Bearerabc"] {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(other));
            assert_eq!(bearer_token(&headers), None, "{other}");
        }

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn no_header_passes_through_anonymously() {
        let app = TestApp::new(StubVerifier::new(outcome).at_most(0));

        let (status, body) = app.call("/whoami", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous|kept");
        assert_eq!(app.handler_hits(), 1);
        assert_eq!(app.verifier.calls(), 0);
    }

    #[tokio::test]
    async fn non_bearer_scheme_passes_through_anonymously() {
        let app = TestApp::new(StubVerifier::new(outcome).at_most(0));

        let (status, body) = app.call("/whoami", Some("Basic dXNlcjpwYXNz")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous|kept");
        assert_eq!(app.verifier.calls(), 0);
    }

    #[tokio::test]
    async fn verified_token_is_cached_for_the_next_request() {
        let app = TestApp::new(StubVerifier::new(outcome).at_most(1));

        let first = app.call("/whoami", Some("Bearer T1")).await;
        let second = app.call("/whoami", Some("Bearer T1")).await;

        assert_eq!(first, (StatusCode::OK, "a@b.com|kept".to_string()));
        assert_eq!(second, (StatusCode::OK, "a@b.com|kept".to_string()));
        assert_eq!(app.verifier.calls(), 1);
        assert_eq!(app.verifier.audiences(), vec!["client-id".to_string()]);
        assert_eq!(app.handler_hits(), 2);
    }

    #[tokio::test]
    async fn invalid_token_is_rejected_before_the_handler() {
        let app = TestApp::new(StubVerifier::new(outcome));

        let (status, body) = app.call("/whoami", Some("Bearer forged")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(app.handler_hits(), 0);

        // Failures are not cached: the next attempt verifies again
        let (status, _) = app.call("/whoami", Some("Bearer forged")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.verifier.calls(), 2);
    }

    #[tokio::test]
    async fn empty_bearer_token_is_rejected() {
        let app = TestApp::new(StubVerifier::new(outcome));

        let (status, _) = app.call("/whoami", Some("Bearer ")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.handler_hits(), 0);
    }

    #[tokio::test]
    async fn provider_outage_is_unauthorized_not_admitted() {
        let app = TestApp::new(StubVerifier::new(outcome));

        let (status, _) = app.call("/whoami", Some("Bearer idp-down")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.handler_hits(), 0);
    }

    #[tokio::test]
    async fn already_expired_claim_admits_once_without_caching() {
        let app = TestApp::new(StubVerifier::new(outcome));

        let first = app.call("/whoami", Some("Bearer T2")).await;
        let second = app.call("/whoami", Some("Bearer T2")).await;

        assert_eq!(first, (StatusCode::OK, "late@b.com|kept".to_string()));
        assert_eq!(second, first);
        assert_eq!(app.verifier.calls(), 2);
    }

    #[tokio::test]
    async fn protected_route_requires_a_principal() {
        let app = TestApp::new(StubVerifier::new(outcome));

        let (status, _) = app.call("/private", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app.call("/private", Some("Bearer T1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "a@b.com");
    }

    #[tokio::test]
    async fn concurrent_requests_with_the_same_token_all_succeed() {
        let app = Arc::new(TestApp::new(StubVerifier::new(outcome)));
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let app = app.clone();
            tasks.push(tokio::spawn(async move {
                app.call("/whoami", Some("Bearer T1")).await
            }));
        }

        for task in tasks {
            let (status, body) = task.await.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "a@b.com|kept");
        }

        // Racing first-time misses may each verify, but never more than once per request
        assert!(app.verifier.calls() >= 1 && app.verifier.calls() <= 16);
        assert!(app.verifier.calls() <= app.handler_hits());
    }
}
