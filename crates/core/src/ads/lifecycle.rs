use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    clock::Clock,
    network::{AdNetwork, Host},
    settings::{SettingsPort, Subscription},
};

use super::app_open::{default_ttl, AppOpenAdCache, CacheStatus, Completion};

#[derive(Default)]
struct ManagerState {
    unit_id: Option<String>,
    generation: u64,
    cache: Option<AppOpenAdCache>,
    subscription: Option<Subscription>,
}

/// Owns the app open ad lifecycle for one ad unit, gated by the
/// "ads enabled" preference.
///
/// The preference is read once per initialization: its first observed
/// value decides whether a cache is ever built. With ads disabled no
/// network request is issued until the manager is shut down and
/// initialized again.
pub struct AdLifecycleManager {
    network: Arc<dyn AdNetwork>,
    settings: Arc<dyn SettingsPort>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Arc<Mutex<ManagerState>>,
}

impl AdLifecycleManager {
    /// Create an uninitialized manager.
    pub fn new(
        network: Arc<dyn AdNetwork>,
        settings: Arc<dyn SettingsPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            network,
            settings,
            clock,
            ttl: default_ttl(),
            state: Arc::default(),
        }
    }

    /// Override the cache lifetime used for caches built after this call.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Subscribe to the enabled flag and, if ads are enabled, build the
    /// cache for `unit_id` and start its first load. Repeated calls are
    /// ignored until [`AdLifecycleManager::shutdown`].
    pub fn initialize(&self, unit_id: &str) {
        let generation = {
            let mut state = self.state.lock();
            if let Some(existing) = &state.unit_id {
                debug!(unit = %existing, "ad lifecycle already initialized");
                return;
            }
            state.unit_id = Some(unit_id.to_string());
            state.generation += 1;
            state.generation
        };

        let weak = Arc::downgrade(&self.state);
        let network = Arc::clone(&self.network);
        let clock = Arc::clone(&self.clock);
        let ttl = self.ttl;
        let unit = unit_id.to_string();
        let mut decided = false;

        let subscription = self.settings.subscribe_ads_enabled(Box::new(move |enabled| {
            if decided {
                return;
            }
            decided = true;

            let Some(state) = weak.upgrade() else {
                return;
            };
            if !enabled {
                info!(unit = %unit, "ads disabled, app open ads will not load");
                return;
            }

            let cache = AppOpenAdCache::with_ttl(
                unit.clone(),
                Arc::clone(&network),
                Arc::clone(&clock),
                ttl,
            );
            {
                let mut state = state.lock();
                if state.generation != generation
                    || state.unit_id.is_none()
                    || state.cache.is_some()
                {
                    return;
                }
                state.cache = Some(cache.clone());
            }
            info!(unit = %unit, "ads enabled, warming app open cache");
            cache.load();
        }));

        let mut state = self.state.lock();
        if state.generation == generation && state.unit_id.is_some() {
            state.subscription = Some(subscription);
        } else {
            drop(state);
            drop(subscription);
        }
    }

    /// Show the cached app open ad if there is one. Without a cache the
    /// completion runs immediately.
    pub fn show_if_available(&self, host: &dyn Host, on_complete: Completion) {
        let cache = self.state.lock().cache.clone();
        match cache {
            Some(cache) => cache.show_if_available(host, on_complete),
            None => {
                debug!("no app open cache, nothing to show");
                on_complete();
            }
        }
    }

    /// Whether `initialize` has run since construction or the last shutdown.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().unit_id.is_some()
    }

    /// Status of the cache, or `None` when ads are off or not initialized.
    pub fn status(&self) -> Option<CacheStatus> {
        let cache = self.state.lock().cache.clone();
        cache.map(|cache| cache.status())
    }

    /// Unsubscribe from the enabled flag and tear the cache down,
    /// destroying any ad it holds.
    pub fn shutdown(&self) {
        let (cache, subscription) = {
            let mut state = self.state.lock();
            state.unit_id = None;
            state.generation += 1;
            (state.cache.take(), state.subscription.take())
        };
        drop(subscription);
        if let Some(cache) = cache {
            info!(unit = cache.unit_id(), "shutting down app open cache");
            cache.reset();
        }
    }
}
