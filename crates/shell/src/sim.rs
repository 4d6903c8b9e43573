//! In-process stand-in for the platform ad SDK.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use adshell_core::{
    ads::BatchSink,
    error::AdError,
    network::{AdNetwork, DismissCallback, Host, LoadCallback, RemoteAd},
};
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Timing and fill behaviour of the simulated network.
#[derive(Debug, Clone)]
pub struct SimProfile {
    /// Delay before each ad arrives.
    pub load_latency: Duration,
    /// How long a shown ad stays on screen.
    pub display_time: Duration,
    /// Every n-th request reports no fill.
    pub fail_every: Option<u64>,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            load_latency: Duration::from_millis(150),
            display_time: Duration::from_millis(400),
            fail_every: Some(4),
        }
    }
}

/// Network that fabricates ads on a tokio runtime after a fixed latency.
pub struct SimulatedNetwork {
    runtime: Handle,
    profile: SimProfile,
    requests: AtomicU64,
}

impl SimulatedNetwork {
    pub fn new(runtime: Handle, profile: SimProfile) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            profile,
            requests: AtomicU64::new(0),
        })
    }

    fn next_outcome(&self, unit_id: &str) -> Result<Arc<dyn RemoteAd>, AdError> {
        let serial = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        match self.profile.fail_every {
            Some(every) if every > 0 && serial % every == 0 => Err(AdError::NoFill),
            _ => {
                let ad: Arc<dyn RemoteAd> = Arc::new(SimulatedAd {
                    serial,
                    unit_id: unit_id.to_string(),
                    runtime: self.runtime.clone(),
                    display_time: self.profile.display_time,
                    destroyed: AtomicBool::new(false),
                });
                Ok(ad)
            }
        }
    }
}

impl AdNetwork for SimulatedNetwork {
    fn request_load(&self, unit_id: &str, on_loaded: LoadCallback) {
        let outcome = self.next_outcome(unit_id);
        let latency = self.profile.load_latency;
        self.runtime.spawn(async move {
            tokio::time::sleep(latency).await;
            on_loaded(outcome);
        });
    }

    fn request_batch(&self, unit_id: &str, count: usize, sink: BatchSink) {
        let outcomes: Vec<_> = (0..count).map(|_| self.next_outcome(unit_id)).collect();
        let latency = self.profile.load_latency;
        self.runtime.spawn(async move {
            for outcome in outcomes {
                tokio::time::sleep(latency).await;
                match outcome {
                    Ok(ad) => sink.deliver(ad),
                    Err(err) => {
                        sink.fail(err);
                        return;
                    }
                }
            }
            sink.complete();
        });
    }
}

struct SimulatedAd {
    serial: u64,
    unit_id: String,
    runtime: Handle,
    display_time: Duration,
    destroyed: AtomicBool,
}

impl RemoteAd for SimulatedAd {
    fn show(&self, host: &dyn Host, on_dismissed: DismissCallback) -> Result<(), AdError> {
        if self.is_destroyed() {
            return Err(AdError::HandleDestroyed);
        }
        info!(
            serial = self.serial,
            unit = %self.unit_id,
            host = host.label(),
            "ad on screen"
        );
        let display_time = self.display_time;
        self.runtime.spawn(async move {
            tokio::time::sleep(display_time).await;
            on_dismissed(Ok(()));
        });
        Ok(())
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            debug!(serial = self.serial, "simulated ad released");
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}
