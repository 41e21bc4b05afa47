/*
 * Responsibility
 * - The "authenticated context" type seen by handlers
 * - The middleware verifies the bearer token and stores this in request extensions;
 *   handlers only ever receive this type
 *
 * Notes
 * - Token verification and caching belong to middleware/services
 * - Keep this as a fixed contract, separate from how the identity was obtained
 */
use chrono::{DateTime, Utc};

use crate::services::auth::VerifiedIdentity;

/// Context attached to an authenticated request.
///
/// - `subject` is the principal (account email, or the provider's `sub`)
/// - `expires_at` is when the presented token stops being trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCtx {
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

impl From<VerifiedIdentity> for AuthCtx {
    fn from(identity: VerifiedIdentity) -> Self {
        Self {
            subject: identity.subject,
            expires_at: identity.expires_at,
        }
    }
}
