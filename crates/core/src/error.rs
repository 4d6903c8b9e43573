//! Error taxonomy for the ad core.

use thiserror::Error;

/// Failures reported across the ad network boundary.
///
/// None of these are fatal: the components that observe them fall back to a
/// retryable state and still complete any pending caller callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdError {
    /// The network or SDK rejected a load request.
    #[error("ad load failed ({code}): {message}")]
    LoadFailed {
        /// SDK-specific error code.
        code: i32,
        /// Human readable reason.
        message: String,
    },
    /// The request succeeded but no creative was available.
    #[error("no ad inventory available")]
    NoFill,
    /// The SDK refused to present a loaded ad.
    #[error("ad show failed: {0}")]
    ShowFailed(String),
    /// The handle was destroyed before it could be used.
    #[error("ad handle already destroyed")]
    HandleDestroyed,
}

impl AdError {
    /// Convenience constructor for [`AdError::LoadFailed`].
    pub fn load(code: i32, message: impl Into<String>) -> Self {
        Self::LoadFailed {
            code,
            message: message.into(),
        }
    }
}
