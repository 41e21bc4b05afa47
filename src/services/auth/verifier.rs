/*
 * Responsibility
 * - Identity-provider verification primitive as seen by the auth middleware
 * - Success: subject + absolute expiry taken from the token claims
 * - Failure: explicit error kind (rejected token vs provider unavailable)
 */
use async_trait::async_trait;
use thiserror::Error;

/// Payload returned by a verifier once signature/issuer/audience/expiry checks passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject: String,
    pub expires_at_epoch_seconds: i64,
}

/// Verification failures.
///
/// All variants end up as 401 for the client. They are kept apart so logs can
/// tell a bad credential from an identity provider that could not be reached.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("verified token has no usable '{0}' claim")]
    InvalidClaims(&'static str),
}

impl VerifyError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::Unavailable(_) => "unavailable",
            Self::InvalidClaims(_) => "invalid_claims",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::Rejected(e.to_string())
    }
}

/// Token verification capability.
///
/// Implementations may perform I/O (fetching signing keys) and must be safe to
/// call from many requests at once.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    // Verify `token` for the given expected audience (OAuth client id).
    async fn verify(&self, token: &str, audience: &str) -> Result<VerifiedClaims, VerifyError>;
}
