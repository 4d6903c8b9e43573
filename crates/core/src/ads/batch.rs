use std::{mem, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::AdError,
    handle::AdHandle,
    network::{AdNetwork, RemoteAd},
};

// Upper bound on the up-front allocation; `count` may come from config.
const INITIAL_CAPACITY: usize = 16;

/// Receives the handles a batch managed to load. Called exactly once.
pub type BatchFinished = Box<dyn FnOnce(Vec<AdHandle>) + Send>;

/// Receives the error that cut a batch short.
pub type BatchFailed = Box<dyn FnOnce(AdError) + Send>;

struct Batch {
    unit_id: String,
    target: usize,
    finished: bool,
    loaded: Vec<AdHandle>,
    on_finished: Option<BatchFinished>,
    on_failed: Option<BatchFailed>,
}

/// Where the network reports the progress of one batched request.
///
/// Clones share the same batch. Once the batch has finished, further
/// deliveries are destroyed on arrival and further failures are ignored.
#[derive(Clone)]
pub struct BatchSink {
    batch: Arc<Mutex<Batch>>,
    clock: Arc<dyn Clock>,
}

impl BatchSink {
    /// Report one loaded ad.
    pub fn deliver(&self, remote: Arc<dyn RemoteAd>) {
        let handle = AdHandle::new(remote, self.clock.now());
        let mut batch = self.batch.lock();
        if batch.finished {
            drop(batch);
            debug!(handle = %handle.id(), "batch already finished, destroying late ad");
            handle.destroy();
            return;
        }

        batch.loaded.push(handle);
        if batch.loaded.len() < batch.target {
            return;
        }

        batch.finished = true;
        let loaded = mem::take(&mut batch.loaded);
        let on_finished = batch.on_finished.take();
        batch.on_failed = None;
        info!(unit = %batch.unit_id, count = loaded.len(), "native ad batch complete");
        drop(batch);

        if let Some(on_finished) = on_finished {
            on_finished(loaded);
        }
    }

    /// Report that the batch cannot make further progress.
    pub fn fail(&self, err: AdError) {
        let mut batch = self.batch.lock();
        if batch.finished {
            debug!(unit = %batch.unit_id, %err, "ignoring failure after batch finished");
            return;
        }

        batch.finished = true;
        let loaded = mem::take(&mut batch.loaded);
        let on_finished = batch.on_finished.take();
        let on_failed = batch.on_failed.take();
        warn!(
            unit = %batch.unit_id,
            loaded = loaded.len(),
            requested = batch.target,
            %err,
            "native ad batch failed"
        );
        drop(batch);

        if let Some(on_failed) = on_failed {
            on_failed(err);
        }
        if let Some(on_finished) = on_finished {
            on_finished(loaded);
        }
    }

    /// Report that every request resolved, even if fewer ads than
    /// requested arrived.
    pub fn complete(&self) {
        let mut batch = self.batch.lock();
        if batch.finished {
            return;
        }

        batch.finished = true;
        let loaded = mem::take(&mut batch.loaded);
        let on_finished = batch.on_finished.take();
        batch.on_failed = None;
        debug!(
            unit = %batch.unit_id,
            loaded = loaded.len(),
            requested = batch.target,
            "native ad batch resolved"
        );
        drop(batch);

        if let Some(on_finished) = on_finished {
            on_finished(loaded);
        }
    }

    /// Whether the batch has delivered its result.
    pub fn is_finished(&self) -> bool {
        self.batch.lock().finished
    }
}

/// Best-effort loader for a fixed number of native ads.
pub struct AdBatchPreloader {
    network: Arc<dyn AdNetwork>,
    clock: Arc<dyn Clock>,
}

impl AdBatchPreloader {
    /// Create a preloader issuing requests through `network`.
    pub fn new(network: Arc<dyn AdNetwork>, clock: Arc<dyn Clock>) -> Self {
        Self { network, clock }
    }

    /// Request `count` native ads for `unit_id` in one batch.
    ///
    /// `on_finished` fires exactly once with whatever loaded, which may be
    /// fewer than `count`. When the network reports a failure first,
    /// `on_failed` fires before `on_finished`.
    pub fn preload(
        &self,
        unit_id: &str,
        count: usize,
        on_finished: BatchFinished,
        on_failed: BatchFailed,
    ) {
        if count == 0 {
            on_finished(Vec::new());
            return;
        }

        let sink = BatchSink {
            batch: Arc::new(Mutex::new(Batch {
                unit_id: unit_id.to_string(),
                target: count,
                finished: false,
                loaded: Vec::with_capacity(count.min(INITIAL_CAPACITY)),
                on_finished: Some(on_finished),
                on_failed: Some(on_failed),
            })),
            clock: Arc::clone(&self.clock),
        };

        debug!(unit = unit_id, count, "requesting native ad batch");
        self.network.request_batch(unit_id, count, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        testing::{FakeAd, FakeNetwork},
    };

    type Outcome = Arc<Mutex<Vec<Vec<AdHandle>>>>;
    type Failures = Arc<Mutex<Vec<AdError>>>;

    fn callbacks() -> (Outcome, Failures, BatchFinished, BatchFailed) {
        let finished: Outcome = Arc::default();
        let failed: Failures = Arc::default();
        let finished_sink = Arc::clone(&finished);
        let failed_sink = Arc::clone(&failed);
        (
            finished,
            failed,
            Box::new(move |handles: Vec<AdHandle>| finished_sink.lock().push(handles)),
            Box::new(move |err: AdError| failed_sink.lock().push(err)),
        )
    }

    fn preloader() -> (AdBatchPreloader, Arc<FakeNetwork>) {
        let network = FakeNetwork::new();
        let preloader = AdBatchPreloader::new(network.clone(), Arc::new(ManualClock::default()));
        (preloader, network)
    }

    #[test]
    fn zero_count_finishes_without_request() {
        let (preloader, network) = preloader();
        let (finished, failed, on_finished, on_failed) = callbacks();
        preloader.preload("native", 0, on_finished, on_failed);

        assert_eq!(network.batch_requests(), 0);
        assert_eq!(finished.lock().len(), 1);
        assert!(finished.lock()[0].is_empty());
        assert!(failed.lock().is_empty());
    }

    #[test]
    fn finishes_once_target_is_reached() {
        let (preloader, network) = preloader();
        let (finished, failed, on_finished, on_failed) = callbacks();
        preloader.preload("native", 2, on_finished, on_failed);
        assert_eq!(network.last_batch_request(), ("native".to_string(), 2));

        let sink = network.last_batch();
        sink.deliver(FakeAd::new());
        assert!(finished.lock().is_empty());
        sink.deliver(FakeAd::new());
        assert!(sink.is_finished());

        let late = FakeAd::new();
        sink.deliver(late.clone());
        sink.fail(AdError::NoFill);

        assert_eq!(finished.lock().len(), 1);
        assert_eq!(finished.lock()[0].len(), 2);
        assert!(failed.lock().is_empty());
        assert_eq!(late.destroy_calls(), 1);
    }

    #[test]
    fn failure_delivers_partial_result_and_latches() {
        let (preloader, network) = preloader();
        let (finished, failed, on_finished, on_failed) = callbacks();
        preloader.preload("native", 3, on_finished, on_failed);

        let sink = network.last_batch();
        sink.deliver(FakeAd::new());
        sink.deliver(FakeAd::new());
        sink.fail(AdError::load(2, "network error"));

        let late = FakeAd::new();
        sink.deliver(late.clone());
        sink.fail(AdError::NoFill);
        sink.complete();

        assert_eq!(finished.lock().len(), 1);
        assert_eq!(finished.lock()[0].len(), 2);
        assert_eq!(*failed.lock(), vec![AdError::load(2, "network error")]);
        assert_eq!(late.destroy_calls(), 1);
    }

    #[test]
    fn complete_with_shortfall_is_not_a_failure() {
        let (preloader, network) = preloader();
        let (finished, failed, on_finished, on_failed) = callbacks();
        preloader.preload("native", 3, on_finished, on_failed);

        let sink = network.last_batch();
        sink.deliver(FakeAd::new());
        sink.complete();

        assert_eq!(finished.lock()[0].len(), 1);
        assert!(failed.lock().is_empty());
    }

    #[test]
    fn huge_count_is_requested_without_preallocating() {
        let (preloader, network) = preloader();
        let (finished, failed, on_finished, on_failed) = callbacks();
        preloader.preload("native", usize::MAX / 2, on_finished, on_failed);
        assert_eq!(
            network.last_batch_request(),
            ("native".to_string(), usize::MAX / 2)
        );

        let sink = network.last_batch();
        sink.deliver(FakeAd::new());
        assert!(!sink.is_finished());
        sink.fail(AdError::NoFill);

        assert_eq!(finished.lock()[0].len(), 1);
        assert_eq!(*failed.lock(), vec![AdError::NoFill]);
    }

    #[test]
    fn callbacks_may_start_another_batch() {
        let network = FakeNetwork::new();
        let preloader = Arc::new(AdBatchPreloader::new(
            network.clone(),
            Arc::new(ManualClock::default()),
        ));
        let again = Arc::clone(&preloader);
        preloader.preload(
            "native",
            1,
            Box::new(move |_| again.preload("native", 1, Box::new(|_| {}), Box::new(|_| {}))),
            Box::new(|_| {}),
        );

        network.last_batch().deliver(FakeAd::new());
        assert_eq!(network.batch_requests(), 2);
    }
}
