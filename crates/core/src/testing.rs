//! Scripted fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::{
    ads::BatchSink,
    error::AdError,
    network::{AdNetwork, DismissCallback, Host, LoadCallback, RemoteAd},
};

/// How a [`FakeAd`] reacts to `show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShowMode {
    /// Fire the dismissal callback before `show` returns.
    DismissImmediately,
    /// Keep the callback until [`FakeAd::dismiss`] is called.
    Hold,
    /// Refuse to present.
    Reject,
}

pub(crate) struct FakeAd {
    mode: ShowMode,
    shows: AtomicUsize,
    destroys: AtomicUsize,
    invalidated: AtomicBool,
    pending_dismiss: Mutex<Option<DismissCallback>>,
}

impl FakeAd {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_mode(ShowMode::DismissImmediately)
    }

    pub(crate) fn with_mode(mode: ShowMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            shows: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            invalidated: AtomicBool::new(false),
            pending_dismiss: Mutex::new(None),
        })
    }

    pub(crate) fn show_calls(&self) -> usize {
        self.shows.load(Ordering::SeqCst)
    }

    pub(crate) fn destroy_calls(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    /// Simulate the SDK invalidating the creative behind our back.
    pub(crate) fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    /// Close a held ad, reporting `outcome`.
    pub(crate) fn dismiss_with(&self, outcome: Result<(), AdError>) {
        let callback = self.pending_dismiss.lock().take();
        if let Some(callback) = callback {
            callback(outcome);
        }
    }

    pub(crate) fn dismiss(&self) {
        self.dismiss_with(Ok(()));
    }
}

impl RemoteAd for FakeAd {
    fn show(&self, _host: &dyn Host, on_dismissed: DismissCallback) -> Result<(), AdError> {
        self.shows.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            ShowMode::Reject => Err(AdError::ShowFailed("rejected by fake".to_string())),
            ShowMode::DismissImmediately => {
                on_dismissed(Ok(()));
                Ok(())
            }
            ShowMode::Hold => {
                *self.pending_dismiss.lock() = Some(on_dismissed);
                Ok(())
            }
        }
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }

    fn is_destroyed(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst) || self.destroys.load(Ordering::SeqCst) > 0
    }
}

/// Network whose requests stay pending until the test resolves them.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    load_requests: AtomicUsize,
    pending: Mutex<VecDeque<LoadCallback>>,
    batches: Mutex<Vec<(String, usize, BatchSink)>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn load_requests(&self) -> usize {
        self.load_requests.load(Ordering::SeqCst)
    }

    pub(crate) fn pending_loads(&self) -> usize {
        self.pending.lock().len()
    }

    pub(crate) fn batch_requests(&self) -> usize {
        self.batches.lock().len()
    }

    fn next_pending(&self) -> LoadCallback {
        self.pending
            .lock()
            .pop_front()
            .expect("no pending load request")
    }

    /// Resolve the oldest pending load with a fresh ad.
    pub(crate) fn succeed_next(&self) -> Arc<FakeAd> {
        self.succeed_next_with(ShowMode::DismissImmediately)
    }

    pub(crate) fn succeed_next_with(&self, mode: ShowMode) -> Arc<FakeAd> {
        let ad = FakeAd::with_mode(mode);
        let remote: Arc<dyn RemoteAd> = ad.clone();
        let callback = self.next_pending();
        callback(Ok(remote));
        ad
    }

    pub(crate) fn fail_next(&self, err: AdError) {
        let callback = self.next_pending();
        callback(Err(err));
    }

    /// Sink handed over by the most recent batch request.
    pub(crate) fn last_batch(&self) -> BatchSink {
        self.batches
            .lock()
            .last()
            .map(|(_, _, sink)| sink.clone())
            .expect("no batch request")
    }

    pub(crate) fn last_batch_request(&self) -> (String, usize) {
        self.batches
            .lock()
            .last()
            .map(|(unit, count, _)| (unit.clone(), *count))
            .expect("no batch request")
    }
}

impl AdNetwork for FakeNetwork {
    fn request_load(&self, _unit_id: &str, on_loaded: LoadCallback) {
        self.load_requests.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().push_back(on_loaded);
    }

    fn request_batch(&self, unit_id: &str, count: usize, sink: BatchSink) {
        self.batches.lock().push((unit_id.to_string(), count, sink));
    }
}

pub(crate) struct TestHost;

impl Host for TestHost {
    fn label(&self) -> &str {
        "test-host"
    }
}

/// Counts how many times handed-out callbacks ran.
#[derive(Clone, Default)]
pub(crate) struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub(crate) fn callback(&self) -> Box<dyn FnOnce() + Send> {
        let calls = Arc::clone(&self.calls);
        Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub(crate) fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
