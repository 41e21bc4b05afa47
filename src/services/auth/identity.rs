//! Verified identity produced by a successful token verification.

use chrono::{DateTime, Utc};

use crate::services::auth::verifier::{VerifiedClaims, VerifyError};

/// The principal established for a bearer token.
///
/// - Only built from `VerifiedClaims`, i.e. after the verifier accepted the token.
/// - `expires_at` comes from the token's own `exp` claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

impl VerifiedIdentity {
    pub fn from_claims(claims: VerifiedClaims) -> Result<Self, VerifyError> {
        if claims.subject.trim().is_empty() {
            return Err(VerifyError::InvalidClaims("subject"));
        }

        let expires_at = DateTime::<Utc>::from_timestamp(claims.expires_at_epoch_seconds, 0)
            .ok_or(VerifyError::InvalidClaims("exp"))?;

        Ok(Self {
            subject: claims.subject,
            expires_at,
        })
    }

    /// `true` while `now` is strictly before the expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Remaining lifetime as seen from `now`, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }
}
