/*
 * Responsibility
 * - bearer token -> VerifiedIdentity (cache first, verifier on miss)
 * - populate the cache only after a successful verification
 * - never hold cache state across the (possibly slow) verifier call
 */
use std::sync::Arc;

use crate::services::auth::identity::VerifiedIdentity;
use crate::services::auth::verifier::{TokenVerifier, VerifyError};
use crate::services::cache::TokenCache;

/// Where an identity came from (for logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Cache,
    Verifier,
}

#[derive(Clone)]
pub struct AuthService {
    cache: TokenCache,
    verifier: Arc<dyn TokenVerifier>,
    audience: Arc<str>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("cache", &self.cache)
            .field("audience", &self.audience)
            .finish()
    }
}

impl AuthService {
    pub fn new(cache: TokenCache, verifier: Arc<dyn TokenVerifier>, audience: &str) -> Self {
        Self {
            cache,
            verifier,
            audience: Arc::from(audience),
        }
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Resolve the identity for a raw bearer token.
    ///
    /// On a cache miss the verifier runs on its own task: if the request is
    /// dropped mid-flight the verification still finishes and a successful
    /// result is cached for the next request.
    pub async fn authenticate(
        &self,
        token: &str,
    ) -> Result<(VerifiedIdentity, IdentitySource), VerifyError> {
        if let Some(identity) = self.cache.get(token).await {
            return Ok((identity, IdentitySource::Cache));
        }

        let cache = self.cache.clone();
        let verifier = Arc::clone(&self.verifier);
        let audience = Arc::clone(&self.audience);
        let token = token.to_owned();

        let identity = tokio::spawn(async move {
            let claims = verifier.verify(&token, &audience).await?;
            let identity = VerifiedIdentity::from_claims(claims)?;
            cache.put(&token, identity.clone()).await;
            Ok::<_, VerifyError>(identity)
        })
        .await
        .map_err(|e| VerifyError::Unavailable(format!("verification task failed: {e}")))??;

        Ok((identity, IdentitySource::Verifier))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubVerifier;
    use super::*;
    use crate::services::auth::verifier::VerifiedClaims;
    use chrono::Utc;

    fn valid_for_an_hour(token: &str) -> Result<VerifiedClaims, VerifyError> {
        match token {
            "T1" => Ok(VerifiedClaims {
                subject: "a@b.com".into(),
                expires_at_epoch_seconds: Utc::now().timestamp() + 3600,
            }),
            "T2" => Ok(VerifiedClaims {
                subject: "late@b.com".into(),
                expires_at_epoch_seconds: Utc::now().timestamp() - 5,
            }),
            "blank" => Ok(VerifiedClaims {
                subject: "".into(),
                expires_at_epoch_seconds: Utc::now().timestamp() + 3600,
            }),
            "down" => Err(VerifyError::Unavailable("connection refused".into())),
            _ => Err(VerifyError::Rejected("bad signature".into())),
        }
    }

    fn service(verifier: Arc<StubVerifier>) -> AuthService {
        AuthService::new(TokenCache::new(16), verifier, "client-id")
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let verifier = Arc::new(StubVerifier::new(valid_for_an_hour).at_most(1));
        let auth = service(verifier.clone());

        let (first, source) = auth.authenticate("T1").await.unwrap();
        assert_eq!(source, IdentitySource::Verifier);
        assert_eq!(first.subject, "a@b.com");

        let (second, source) = auth.authenticate("T1").await.unwrap();
        assert_eq!(source, IdentitySource::Cache);
        assert_eq!(second, first);

        assert_eq!(verifier.calls(), 1);
        assert_eq!(verifier.audiences(), vec!["client-id".to_string()]);
    }

    #[tokio::test]
    async fn expired_claim_is_accepted_once_but_never_cached() {
        let verifier = Arc::new(StubVerifier::new(valid_for_an_hour));
        let auth = service(verifier.clone());

        let (identity, _) = auth.authenticate("T2").await.unwrap();
        assert_eq!(identity.subject, "late@b.com");
        assert!(auth.cache().get("T2").await.is_none());

        auth.authenticate("T2").await.unwrap();
        assert_eq!(verifier.calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let verifier = Arc::new(StubVerifier::new(valid_for_an_hour));
        let auth = service(verifier.clone());

        for token in ["forged", "down", "blank"] {
            assert!(auth.authenticate(token).await.is_err());
            assert!(auth.authenticate(token).await.is_err());
            assert!(auth.cache().get(token).await.is_none());
        }
        assert_eq!(verifier.calls(), 6);
    }

    #[tokio::test]
    async fn error_kinds_are_preserved() {
        let auth = service(Arc::new(StubVerifier::new(valid_for_an_hour)));

        let err = auth.authenticate("down").await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        let err = auth.authenticate("forged").await.unwrap_err();
        assert_eq!(err.kind(), "rejected");
        let err = auth.authenticate("blank").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_claims");
    }

    fn any_token_for_an_hour(token: &str) -> Result<VerifiedClaims, VerifyError> {
        Ok(VerifiedClaims {
            subject: format!("{token}@b.com"),
            expires_at_epoch_seconds: Utc::now().timestamp() + 3600,
        })
    }

    #[tokio::test]
    async fn verified_tokens_beyond_capacity_evict_the_least_recent() {
        let verifier = Arc::new(StubVerifier::new(any_token_for_an_hour));
        let auth = AuthService::new(TokenCache::new(2), verifier.clone(), "client-id");

        for token in ["T1", "T2", "T3"] {
            let (_, source) = auth.authenticate(token).await.unwrap();
            assert_eq!(source, IdentitySource::Verifier);
        }

        assert!(auth.cache().get("T1").await.is_none());
        assert!(auth.cache().get("T2").await.is_some());
        assert!(auth.cache().get("T3").await.is_some());

        let (_, source) = auth.authenticate("T1").await.unwrap();
        assert_eq!(source, IdentitySource::Verifier);
        assert_eq!(verifier.calls(), 4);
    }

    #[tokio::test]
    async fn cancelled_request_still_caches_verified_token() {
        let verifier = Arc::new(
            StubVerifier::new(valid_for_an_hour).with_delay(std::time::Duration::from_millis(100)),
        );
        let auth = service(verifier.clone());

        // The request gives up long before the provider answers.
        let pending = auth.authenticate("T1");
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
        assert!(outcome.is_err());
        assert!(auth.cache().get("T1").await.is_none());

        for _ in 0..50 {
            if auth.cache().get("T1").await.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(auth.cache().get("T1").await.is_some());
        assert_eq!(verifier.calls(), 1);
    }
}
