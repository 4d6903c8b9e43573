//! The "ads enabled" preference as seen by the ad core.
//!
//! Persisted settings storage lives outside this crate; the core only needs a
//! hot boolean stream that replays its latest value to new subscribers.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::debug;

/// Listener receiving every observed value of the flag.
pub type EnabledListener = Box<dyn FnMut(bool) + Send>;

/// Reactive source of the "ads enabled" preference.
pub trait SettingsPort: Send + Sync {
    /// Register `listener`. The current value is delivered immediately,
    /// subsequent changes as they happen, until the returned
    /// [`Subscription`] is dropped.
    fn subscribe_ads_enabled(&self, listener: EnabledListener) -> Subscription;
}

/// Keeps a listener registered; dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap the action that detaches the listener.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn detached() -> Self {
        Self { cancel: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// `None` while the listener is running.
type SharedListener = Arc<Mutex<Option<EnabledListener>>>;

fn notify(listener: &SharedListener, value: bool) {
    let Some(mut callback) = listener.lock().take() else {
        return;
    };
    callback(value);
    *listener.lock() = Some(callback);
}

struct FlagState {
    value: bool,
    next_id: u64,
    listeners: BTreeMap<u64, SharedListener>,
}

/// In-memory [`SettingsPort`] backed by a single boolean.
///
/// Listeners are invoked outside every lock, so a listener may read or set
/// the flag without deadlocking. A listener is not re-entered by the change
/// it makes itself, and a change made during notification supersedes the
/// one being delivered.
#[derive(Clone)]
pub struct AdsEnabledFlag {
    inner: Arc<Mutex<FlagState>>,
}

impl AdsEnabledFlag {
    /// Create a flag holding `value`.
    pub fn new(value: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FlagState {
                value,
                next_id: 0,
                listeners: BTreeMap::new(),
            })),
        }
    }

    /// Latest value.
    pub fn get(&self) -> bool {
        self.inner.lock().value
    }

    /// Update the flag, notifying listeners when the value changes.
    pub fn set(&self, value: bool) {
        let listeners: Vec<SharedListener> = {
            let mut state = self.inner.lock();
            if state.value == value {
                return;
            }
            state.value = value;
            state.listeners.values().cloned().collect()
        };

        debug!(enabled = value, listeners = listeners.len(), "ads enabled flag changed");
        for listener in &listeners {
            if self.get() != value {
                break;
            }
            notify(listener, value);
        }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

impl Default for AdsEnabledFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SettingsPort for AdsEnabledFlag {
    fn subscribe_ads_enabled(&self, listener: EnabledListener) -> Subscription {
        let listener: SharedListener = Arc::new(Mutex::new(Some(listener)));
        let (id, current) = {
            let mut state = self.inner.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.insert(id, Arc::clone(&listener));
            (id, state.value)
        };

        notify(&listener, current);

        let weak: Weak<Mutex<FlagState>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().listeners.remove(&id);
            }
        })
    }
}
