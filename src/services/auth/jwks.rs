//! Signing-key lookup for the identity provider (JWKS over HTTP).
//!
//! - Keys are cached for the `Cache-Control: max-age` of the JWKS response,
//!   clamped to [`MIN_TTL`, `MAX_TTL`].
//! - An unknown `kid` triggers a refetch (provider key rotation), but at most
//!   once per `REFETCH_COOLDOWN` so garbage tokens cannot hammer the provider.
//! - Fetches are serialised by a refresh guard: concurrent misses wait for the
//!   in-flight fetch and re-check the key map instead of fetching again.
//! - The key-map lock is never held across the HTTP request.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use reqwest::header::{CACHE_CONTROL, HeaderMap};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::services::auth::verifier::VerifyError;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const MIN_TTL: Duration = Duration::from_secs(60);
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const REFETCH_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("jwks request failed: {0}")]
    Network(String),

    #[error("jwks endpoint returned status {0}")]
    HttpStatus(u16),

    #[error("invalid jwks document: {0}")]
    Parse(String),

    #[error("no signing key with kid '{0}'")]
    KeyNotFound(String),
}

impl From<JwksError> for VerifyError {
    fn from(e: JwksError) -> Self {
        match e {
            // The token names a key the provider does not publish
            JwksError::KeyNotFound(_) => VerifyError::Rejected(e.to_string()),
            _ => VerifyError::Unavailable(e.to_string()),
        }
    }
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
    expires_at: Instant,
}

pub struct JwksClient {
    http: reqwest::Client,
    jwks_url: Url,
    cached: RwLock<Option<CachedKeys>>,
    refresh_guard: Mutex<()>,
}

impl std::fmt::Debug for JwksClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksClient")
            .field("jwks_url", &self.jwks_url.as_str())
            .finish()
    }
}

impl JwksClient {
    pub fn new(jwks_url: Url, request_timeout: Duration) -> Result<Self, JwksError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| JwksError::Client(e.to_string()))?;

        Ok(Self {
            http,
            jwks_url,
            cached: RwLock::new(None),
            refresh_guard: Mutex::new(()),
        })
    }

    /// Decoding key for `kid`, fetching the JWKS when needed.
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, JwksError> {
        if let Some(found) = self.lookup(kid).await {
            return found;
        }

        let _refreshing = self.refresh_guard.lock().await;

        // another request may have refreshed while we waited
        if let Some(found) = self.lookup(kid).await {
            return found;
        }

        tracing::debug!(kid, jwks_url = %self.jwks_url, "jwks cache miss, fetching keys");
        self.refresh().await?;

        let cached = self.cached.read().await;
        cached
            .as_ref()
            .and_then(|c| c.keys.get(kid).cloned())
            .ok_or_else(|| JwksError::KeyNotFound(kid.to_string()))
    }

    // None means a fetch is needed: nothing cached, keys expired, or `kid`
    // unknown and the last fetch is older than the cooldown.
    async fn lookup(&self, kid: &str) -> Option<Result<DecodingKey, JwksError>> {
        let now = Instant::now();
        let cached = self.cached.read().await;
        let cached = cached.as_ref().filter(|c| now < c.expires_at)?;

        if let Some(key) = cached.keys.get(kid) {
            return Some(Ok(key.clone()));
        }
        if now.duration_since(cached.fetched_at) < REFETCH_COOLDOWN {
            return Some(Err(JwksError::KeyNotFound(kid.to_string())));
        }
        None
    }

    /// Fetch the JWKS document and replace the cached key set.
    /// Callers hold `refresh_guard`.
    async fn refresh(&self) -> Result<(), JwksError> {
        let response = self
            .http
            .get(self.jwks_url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, jwks_url = %self.jwks_url, "jwks fetch failed");
                JwksError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpStatus(response.status().as_u16()));
        }

        let ttl = ttl_from_headers(response.headers());

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| JwksError::Parse(e.to_string()))?;

        let keys = signing_keys(&jwks);
        tracing::debug!(keys = keys.len(), ttl_secs = ttl.as_secs(), "jwks refreshed");

        let now = Instant::now();
        *self.cached.write().await = Some(CachedKeys {
            keys,
            fetched_at: now,
            expires_at: now + ttl,
        });

        Ok(())
    }
}

// kid -> key, skipping encryption keys and keys jsonwebtoken cannot use.
fn signing_keys(jwks: &JwkSet) -> HashMap<String, DecodingKey> {
    jwks.keys
        .iter()
        .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
        .filter_map(|jwk| {
            let kid = jwk.common.key_id.clone()?;
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some((kid, key)),
                Err(e) => {
                    tracing::warn!(kid = %kid, error = %e, "skipping unusable jwk");
                    None
                }
            }
        })
        .collect()
}

fn ttl_from_headers(headers: &HeaderMap) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_max_age)
        .map(|ttl| ttl.clamp(MIN_TTL, MAX_TTL))
        .unwrap_or(DEFAULT_TTL)
}

fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
