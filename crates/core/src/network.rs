//! Boundary to the platform ad SDK.
//!
//! The core never talks to a real network. Everything it needs from the SDK
//! is expressed through [`AdNetwork`] (issuing requests) and [`RemoteAd`]
//! (a loaded creative). Completions are delivered through callbacks, either
//! synchronously from inside the call that triggered them or later from
//! whatever task the host marshals them onto.

use std::sync::Arc;

use crate::{ads::BatchSink, error::AdError};

/// Result of a single load request.
pub type LoadResult = Result<Arc<dyn RemoteAd>, AdError>;

/// Callback receiving the outcome of [`AdNetwork::request_load`].
pub type LoadCallback = Box<dyn FnOnce(LoadResult) + Send>;

/// Callback fired when a presented ad goes away, with `Err` when the
/// presentation failed part-way.
pub type DismissCallback = Box<dyn FnOnce(Result<(), AdError>) + Send>;

/// Opaque presentation surface an ad is shown on top of.
pub trait Host: Send + Sync {
    /// Short label used in diagnostics.
    fn label(&self) -> &str;
}

/// A loaded ad creative owned by the SDK.
pub trait RemoteAd: Send + Sync {
    /// Present the ad. `on_dismissed` fires once the ad is closed.
    ///
    /// An `Err` return means presentation never started; implementations
    /// must not also invoke `on_dismissed` in that case, although callers
    /// tolerate it.
    fn show(&self, host: &dyn Host, on_dismissed: DismissCallback) -> Result<(), AdError>;

    /// Release SDK resources. Safe to call more than once.
    fn destroy(&self);

    /// Whether the SDK already invalidated this creative.
    fn is_destroyed(&self) -> bool {
        false
    }
}

/// Request side of the SDK. The ad unit is chosen per call.
pub trait AdNetwork: Send + Sync {
    /// Load one full-screen ad for `unit_id`.
    fn request_load(&self, unit_id: &str, on_loaded: LoadCallback);

    /// Load up to `count` native ads for `unit_id` in one batched request,
    /// reporting each arrival and the terminal outcome through `sink`.
    fn request_batch(&self, unit_id: &str, count: usize, sink: BatchSink);
}
