/// Factory: build `AuthService` (cache + Google verifier) from application `Config`.
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::auth::{AuthService, GoogleIdTokenVerifier, JwksClient, jwks::JwksError};
use crate::services::cache::TokenCache;

pub fn build_auth_service(config: &Config) -> Result<Arc<AuthService>, JwksError> {
    let jwks = JwksClient::new(
        config.google_jwks_url.clone(),
        Duration::from_secs(config.jwks_timeout_seconds),
    )?;

    let verifier = GoogleIdTokenVerifier::new(
        jwks,
        config.auth_issuers.clone(),
        config.auth_leeway_seconds,
    );

    let cache = TokenCache::new(config.token_cache_capacity);

    tracing::info!(
        capacity = cache.capacity(),
        jwks_url = %config.google_jwks_url,
        "token verification cache initialised"
    );

    Ok(Arc::new(AuthService::new(
        cache,
        Arc::new(verifier),
        &config.google_client_id,
    )))
}
