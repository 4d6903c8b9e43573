#![warn(clippy::all, missing_docs)]

//! Core ad lifecycle logic for the adshell app shell.
//!
//! This crate hosts the app open ad cache, the native ad batch preloader,
//! the ad view pool and the lifecycle manager tying them to the "ads
//! enabled" preference, together with the ports they use to reach the
//! platform ad SDK and the configuration consumed by frontends.

pub mod ads;
pub mod clock;
pub mod config;
pub mod error;
pub mod handle;
pub mod network;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use ads::{
    AdBatchPreloader, AdLifecycleManager, AdView, AdViewPool, AppOpenAdCache, BatchSink,
    CacheStatus,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::AdError;
pub use handle::{AdHandle, HandleId};
pub use network::{AdNetwork, Host, RemoteAd};
pub use settings::{AdsEnabledFlag, SettingsPort, Subscription};
