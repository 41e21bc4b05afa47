use async_trait::async_trait;
use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;

use crate::services::auth::jwks::JwksClient;
use crate::services::auth::verifier::{TokenVerifier, VerifiedClaims, VerifyError};

pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Google ID token claims we rely on. Signature, `iss`, `aud` and `exp` are
/// checked by `jsonwebtoken::Validation` before this is trusted.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    exp: i64,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies Google-issued OpenID Connect ID tokens (RS256, keys from Google's JWKS).
#[derive(Debug)]
pub struct GoogleIdTokenVerifier {
    jwks: JwksClient,
    issuers: Vec<String>,
    leeway_seconds: u64,
}

impl GoogleIdTokenVerifier {
    pub fn new(jwks: JwksClient, issuers: Vec<String>, leeway_seconds: u64) -> Self {
        Self {
            jwks,
            issuers,
            leeway_seconds,
        }
    }

    fn validation(&self, audience: &str) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(self.issuers.as_slice());
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation.leeway = self.leeway_seconds;
        validation
    }
}

#[async_trait]
impl TokenVerifier for GoogleIdTokenVerifier {
    async fn verify(&self, token: &str, audience: &str) -> Result<VerifiedClaims, VerifyError> {
        let header = jsonwebtoken::decode_header(token)?;

        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::Rejected(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| VerifyError::Rejected("missing 'kid' header".to_string()))?;

        let key = self.jwks.decoding_key(&kid).await?;

        let claims = jsonwebtoken::decode::<IdTokenClaims>(token, &key, &self.validation(audience))?
            .claims;

        // Principal is the account email; fall back to the stable subject id.
        let subject = claims
            .email
            .filter(|email| !email.trim().is_empty())
            .unwrap_or(claims.sub);

        Ok(VerifiedClaims {
            subject,
            expires_at_epoch_seconds: claims.exp,
        })
    }
}
