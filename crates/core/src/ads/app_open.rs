use std::{mem, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::AdError,
    handle::AdHandle,
    network::{AdNetwork, DismissCallback, Host, LoadResult, RemoteAd},
};

/// Hours an app open ad may sit in the cache before it is considered stale.
pub const DEFAULT_TTL_HOURS: i64 = 4;

/// Callback completing a [`AppOpenAdCache::show_if_available`] request.
pub type Completion = Box<dyn FnOnce() + Send>;

/// Default cache lifetime of a loaded app open ad.
pub fn default_ttl() -> Duration {
    Duration::hours(DEFAULT_TTL_HOURS)
}

enum AdCacheState {
    Empty,
    Loading {
        ticket: u64,
    },
    Available(AdHandle),
    Showing {
        ticket: u64,
        handle: AdHandle,
        on_complete: Option<Completion>,
    },
}

struct Slot {
    state: AdCacheState,
    next_ticket: u64,
}

impl Slot {
    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }
}

/// Observable summary of the cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheStatus {
    /// Nothing cached and nothing in flight.
    Empty,
    /// A load request is outstanding.
    Loading,
    /// An ad is cached.
    Available {
        /// Instant the cached ad finished loading.
        loaded_at: DateTime<Utc>,
    },
    /// The cached ad is on screen.
    Showing,
}

struct Inner {
    unit_id: String,
    ttl: Duration,
    network: Arc<dyn AdNetwork>,
    clock: Arc<dyn Clock>,
    slot: Mutex<Slot>,
}

/// Single-slot, TTL-bound cache for one full-screen "app open" ad.
///
/// At most one load and one presentation are in flight at any time. Ports
/// and caller callbacks are always invoked with the slot unlocked, so a
/// network that completes synchronously, or a caller that re-enters from
/// its completion, is fine.
#[derive(Clone)]
pub struct AppOpenAdCache {
    inner: Arc<Inner>,
}

enum ShowDecision {
    Present {
        ticket: u64,
        remote: Arc<dyn RemoteAd>,
    },
    Skip {
        on_complete: Completion,
        stale: Option<AdHandle>,
        reload: bool,
    },
}

impl AppOpenAdCache {
    /// Create an empty cache for `unit_id` using the default TTL.
    pub fn new(
        unit_id: impl Into<String>,
        network: Arc<dyn AdNetwork>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_ttl(unit_id, network, clock, default_ttl())
    }

    /// Create an empty cache with an explicit TTL.
    pub fn with_ttl(
        unit_id: impl Into<String>,
        network: Arc<dyn AdNetwork>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                unit_id: unit_id.into(),
                ttl,
                network,
                clock,
                slot: Mutex::new(Slot {
                    state: AdCacheState::Empty,
                    next_ticket: 0,
                }),
            }),
        }
    }

    /// Ad unit served by this cache.
    pub fn unit_id(&self) -> &str {
        &self.inner.unit_id
    }

    /// Configured cache lifetime.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Snapshot of the slot.
    pub fn status(&self) -> CacheStatus {
        match &self.inner.slot.lock().state {
            AdCacheState::Empty => CacheStatus::Empty,
            AdCacheState::Loading { .. } => CacheStatus::Loading,
            AdCacheState::Available(handle) => CacheStatus::Available {
                loaded_at: handle.loaded_at(),
            },
            AdCacheState::Showing { .. } => CacheStatus::Showing,
        }
    }

    /// Whether a fresh ad is ready to be shown right now.
    pub fn is_ad_available(&self) -> bool {
        let now = self.inner.clock.now();
        match &self.inner.slot.lock().state {
            AdCacheState::Available(handle) => self.is_fresh(handle, now),
            _ => false,
        }
    }

    fn is_fresh(&self, handle: &AdHandle, now: DateTime<Utc>) -> bool {
        !handle.is_destroyed() && !handle.is_expired(now, self.inner.ttl)
    }

    /// Start loading an ad unless one is in flight, on screen, or already
    /// cached and fresh. A stale cached ad is destroyed and replaced.
    pub fn load(&self) {
        let now = self.inner.clock.now();
        let (ticket, stale) = {
            let mut slot = self.inner.slot.lock();
            match &slot.state {
                AdCacheState::Loading { .. } => {
                    debug!(unit = %self.inner.unit_id, "load already in flight");
                    return;
                }
                AdCacheState::Showing { .. } => {
                    debug!(unit = %self.inner.unit_id, "ad on screen, skipping load");
                    return;
                }
                AdCacheState::Available(handle) if self.is_fresh(handle, now) => {
                    return;
                }
                AdCacheState::Available(_) | AdCacheState::Empty => {}
            }
            let ticket = slot.issue_ticket();
            let stale = mem::replace(&mut slot.state, AdCacheState::Loading { ticket });
            (ticket, stale)
        };

        if let AdCacheState::Available(handle) = stale {
            info!(unit = %self.inner.unit_id, handle = %handle.id(), "replacing stale app open ad");
            handle.destroy();
        }

        debug!(unit = %self.inner.unit_id, ticket, "requesting app open ad");
        let weak = Arc::downgrade(&self.inner);
        self.inner.network.request_load(
            &self.inner.unit_id,
            Box::new(move |result| match weak.upgrade() {
                Some(inner) => AppOpenAdCache { inner }.finish_load(ticket, result),
                None => {
                    if let Ok(remote) = result {
                        remote.destroy();
                    }
                }
            }),
        );
    }

    fn finish_load(&self, ticket: u64, result: LoadResult) {
        let mut slot = self.inner.slot.lock();
        let current = matches!(slot.state, AdCacheState::Loading { ticket: t } if t == ticket);
        match result {
            Ok(remote) if current => {
                let handle = AdHandle::new(remote, self.inner.clock.now());
                info!(unit = %self.inner.unit_id, handle = %handle.id(), "app open ad loaded");
                slot.state = AdCacheState::Available(handle);
            }
            Ok(remote) => {
                drop(slot);
                warn!(unit = %self.inner.unit_id, ticket, "discarding late app open ad");
                remote.destroy();
            }
            Err(err) if current => {
                slot.state = AdCacheState::Empty;
                warn!(unit = %self.inner.unit_id, %err, "app open ad failed to load");
            }
            Err(err) => {
                debug!(unit = %self.inner.unit_id, ticket, %err, "ignoring stale load failure");
            }
        }
    }

    /// Show the cached ad on `host` if one is fresh.
    ///
    /// `on_complete` runs exactly once: after dismissal when an ad was
    /// shown, otherwise before this call returns. When nothing could be
    /// shown a new load is started unless one is already in flight.
    pub fn show_if_available(&self, host: &dyn Host, on_complete: Completion) {
        let now = self.inner.clock.now();
        let decision = {
            let mut slot = self.inner.slot.lock();
            match mem::replace(&mut slot.state, AdCacheState::Empty) {
                AdCacheState::Available(handle) if self.is_fresh(&handle, now) => {
                    let ticket = slot.issue_ticket();
                    let remote = handle.remote();
                    slot.state = AdCacheState::Showing {
                        ticket,
                        handle,
                        on_complete: Some(on_complete),
                    };
                    ShowDecision::Present { ticket, remote }
                }
                AdCacheState::Available(handle) => ShowDecision::Skip {
                    on_complete,
                    stale: Some(handle),
                    reload: true,
                },
                AdCacheState::Empty => ShowDecision::Skip {
                    on_complete,
                    stale: None,
                    reload: true,
                },
                busy @ (AdCacheState::Loading { .. } | AdCacheState::Showing { .. }) => {
                    slot.state = busy;
                    ShowDecision::Skip {
                        on_complete,
                        stale: None,
                        reload: false,
                    }
                }
            }
        };

        match decision {
            ShowDecision::Present { ticket, remote } => {
                info!(unit = %self.inner.unit_id, host = host.label(), "showing app open ad");
                let weak = Arc::downgrade(&self.inner);
                let on_dismissed: DismissCallback = Box::new(move |outcome| {
                    if let Some(inner) = weak.upgrade() {
                        AppOpenAdCache { inner }.finish_show(ticket, outcome);
                    }
                });
                if let Err(err) = remote.show(host, on_dismissed) {
                    self.finish_show(ticket, Err(err));
                }
            }
            ShowDecision::Skip {
                on_complete,
                stale,
                reload,
            } => {
                if let Some(handle) = stale {
                    info!(unit = %self.inner.unit_id, handle = %handle.id(), "cached app open ad is stale");
                    handle.destroy();
                }
                debug!(unit = %self.inner.unit_id, "no app open ad ready");
                if reload {
                    self.load();
                }
                on_complete();
            }
        }
    }

    fn finish_show(&self, ticket: u64, outcome: Result<(), AdError>) {
        let finished = {
            let mut slot = self.inner.slot.lock();
            match mem::replace(&mut slot.state, AdCacheState::Empty) {
                AdCacheState::Showing {
                    ticket: current,
                    handle,
                    on_complete,
                } if current == ticket => Some((handle, on_complete)),
                other => {
                    slot.state = other;
                    None
                }
            }
        };

        let Some((handle, on_complete)) = finished else {
            debug!(unit = %self.inner.unit_id, ticket, "ignoring stale dismissal");
            return;
        };

        match outcome {
            Ok(()) => info!(unit = %self.inner.unit_id, handle = %handle.id(), "app open ad dismissed"),
            Err(err) => warn!(unit = %self.inner.unit_id, handle = %handle.id(), %err, "app open ad failed to show"),
        }
        handle.destroy();
        drop(handle);

        self.load();
        if let Some(on_complete) = on_complete {
            on_complete();
        }
    }

    /// Drop whatever the slot holds and return to `Empty`.
    ///
    /// A pending show completes immediately; in-flight loads and dismissals
    /// that arrive afterwards are discarded.
    pub fn reset(&self) {
        let previous = mem::replace(&mut self.inner.slot.lock().state, AdCacheState::Empty);
        match previous {
            AdCacheState::Available(handle) => handle.destroy(),
            AdCacheState::Showing {
                handle,
                on_complete,
                ..
            } => {
                handle.destroy();
                if let Some(on_complete) = on_complete {
                    on_complete();
                }
            }
            AdCacheState::Loading { .. } | AdCacheState::Empty => {}
        }
        debug!(unit = %self.inner.unit_id, "app open cache reset");
    }
}
