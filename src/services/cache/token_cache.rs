//! In-memory cache of verified bearer tokens.
//!
//! Responsibility:
//! - Map a raw bearer token to the `VerifiedIdentity` it proved.
//! - Bound memory with a fixed capacity (least-recently-used eviction).
//! - Expire each entry at the token's own `exp`, not at a global TTL.
//!
//! Notes:
//! - moka owns all synchronisation; callers never lock anything.
//! - `put` drains moka's pending work before returning, so the capacity bound
//!   and LRU order hold as soon as the insert completes.
//! - Reads re-check the expiry instant so a logically expired entry is never
//!   returned, even if housekeeping has not removed it yet.

use std::time::{Duration, Instant};

use chrono::Utc;
use moka::{Expiry, future::Cache, policy::EvictionPolicy};

use crate::services::auth::VerifiedIdentity;

pub const DEFAULT_TOKEN_CACHE_CAPACITY: u64 = 10_000;

/// Per-entry expiry computed from the identity's claim.
struct ClaimExpiry;

impl Expiry<String, VerifiedIdentity> for ClaimExpiry {
    fn expire_after_create(
        &self,
        _token: &String,
        identity: &VerifiedIdentity,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(identity.remaining_at(Utc::now()))
    }

    // Replacing a value never pushes the deadline further out, but an
    // earlier claim expiry on the new value shortens it.
    fn expire_after_update(
        &self,
        _token: &String,
        identity: &VerifiedIdentity,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        let remaining = identity.remaining_at(Utc::now());
        Some(match duration_until_expiry {
            Some(current) => current.min(remaining),
            None => remaining,
        })
    }
}

/// Bounded, concurrent token → identity cache.
///
/// Cheap to clone; clones share the same underlying store.
#[derive(Clone)]
pub struct TokenCache {
    inner: Cache<String, VerifiedIdentity>,
    capacity: u64,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keys are bearer tokens: never print them
        f.debug_struct("TokenCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl TokenCache {
    pub fn new(capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(ClaimExpiry)
            .build();

        Self { inner, capacity }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Cached identity for `token`, or `None` if absent or already expired.
    pub async fn get(&self, token: &str) -> Option<VerifiedIdentity> {
        let identity = self.inner.get(token).await?;

        if identity.is_valid_at(Utc::now()) {
            Some(identity)
        } else {
            None
        }
    }

    /// Insert or replace the entry for `token`.
    ///
    /// An identity that is already expired is still handed to the store, but
    /// with a zero lifetime it is never served.
    pub async fn put(&self, token: &str, identity: VerifiedIdentity) {
        self.inner.insert(token.to_owned(), identity).await;
        // apply buffered reads and evict down to capacity now
        self.inner.run_pending_tasks().await;
    }

    /// Number of resident entries (may include expired ones not yet removed).
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_CACHE_CAPACITY)
    }
}
