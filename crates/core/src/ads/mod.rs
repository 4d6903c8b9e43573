//! Ad loading, caching and display plumbing.

/// Single-slot cache for full-screen app open ads.
pub mod app_open;
/// Best-effort batch loading of native ads.
pub mod batch;
/// Composition root gated by the "ads enabled" preference.
pub mod lifecycle;
/// Keyed pool of reusable ad view containers.
pub mod pool;

pub use app_open::{default_ttl, AppOpenAdCache, CacheStatus, Completion, DEFAULT_TTL_HOURS};
pub use batch::{AdBatchPreloader, BatchFailed, BatchFinished, BatchSink};
pub use lifecycle::AdLifecycleManager;
pub use pool::{AdView, AdViewPool, ViewId};
