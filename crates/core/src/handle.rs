//! Owned wrapper around a loaded ad.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::network::RemoteAd;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an [`AdHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ad#{}", self.0)
    }
}

/// A loaded ad creative, stamped with the instant it finished loading.
///
/// A handle has exactly one owner at a time; moving it moves ownership.
/// Dropping a handle destroys the underlying creative.
pub struct AdHandle {
    id: HandleId,
    remote: Arc<dyn RemoteAd>,
    loaded_at: DateTime<Utc>,
    destroyed: AtomicBool,
}

impl AdHandle {
    /// Wrap a freshly loaded creative.
    pub fn new(remote: Arc<dyn RemoteAd>, loaded_at: DateTime<Utc>) -> Self {
        Self {
            id: HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)),
            remote,
            loaded_at,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Identifier used in logs.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Instant the load completed.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Time elapsed since load, as seen from `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.loaded_at
    }

    /// True once the handle is `ttl` old or older.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) >= ttl
    }

    /// Destroyed either through [`AdHandle::destroy`] or by the SDK itself.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire) || self.remote.is_destroyed()
    }

    /// Release the creative. Only the first call reaches the SDK.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            debug!(handle = %self.id, "destroying ad handle");
            self.remote.destroy();
        }
    }

    pub(crate) fn remote(&self) -> Arc<dyn RemoteAd> {
        Arc::clone(&self.remote)
    }
}

impl Drop for AdHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for AdHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdHandle")
            .field("id", &self.id)
            .field("loaded_at", &self.loaded_at)
            .field("destroyed", &self.destroyed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAd;

    #[test]
    fn destroy_is_idempotent_and_runs_on_drop() {
        let ad = FakeAd::new();
        let handle = AdHandle::new(ad.clone(), Utc::now());
        handle.destroy();
        handle.destroy();
        assert!(handle.is_destroyed());
        drop(handle);
        assert_eq!(ad.destroy_calls(), 1);

        let other = FakeAd::new();
        drop(AdHandle::new(other.clone(), Utc::now()));
        assert_eq!(other.destroy_calls(), 1);
    }

    #[test]
    fn expiry_is_inclusive_of_ttl() {
        let loaded = Utc::now();
        let handle = AdHandle::new(FakeAd::new(), loaded);
        let ttl = Duration::hours(4);
        assert!(!handle.is_expired(loaded + Duration::minutes(239), ttl));
        assert!(handle.is_expired(loaded + ttl, ttl));
    }

    #[test]
    fn sdk_side_destruction_is_visible() {
        let ad = FakeAd::new();
        let handle = AdHandle::new(ad.clone(), Utc::now());
        ad.invalidate();
        assert!(handle.is_destroyed());
    }
}
