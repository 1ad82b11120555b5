//! Device token validation seam
//!
//! Middleware only needs a yes/no answer for a device token. The real
//! client and test doubles both implement [`DeviceTokenValidator`].

use async_trait::async_trait;
use devicecheck_core::redact_token;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::DeviceCheck;

/// Decides whether a device token is genuine
#[async_trait]
pub trait DeviceTokenValidator: Send + Sync {
    /// Whether the token belongs to a genuine device
    ///
    /// Errors of any kind count as "not valid"; the detail is logged, not returned.
    async fn is_valid_device(&self, device_token: &str) -> bool;

    /// Get a description of this validator (for logging)
    fn description(&self) -> &str {
        "device token validator"
    }
}

#[async_trait]
impl DeviceTokenValidator for DeviceCheck {
    async fn is_valid_device(&self, device_token: &str) -> bool {
        match self.validate_device_token(device_token).await {
            Ok(response) if response.is_ok() => true,
            Ok(response) => {
                debug!(
                    device_token = %redact_token(device_token),
                    response = %response,
                    "Device token rejected"
                );
                false
            }
            Err(e) => {
                warn!(
                    device_token = %redact_token(device_token),
                    error = %e,
                    "Device token validation failed"
                );
                false
            }
        }
    }

    fn description(&self) -> &str {
        "Apple DeviceCheck"
    }
}

#[async_trait]
impl<T: DeviceTokenValidator + ?Sized> DeviceTokenValidator for Arc<T> {
    async fn is_valid_device(&self, device_token: &str) -> bool {
        (**self).is_valid_device(device_token).await
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// Validator that accepts exactly one configured token
///
/// For integration tests and local development, where no device can
/// produce a real token.
pub struct MockValidator {
    accepted_token: String,
}

impl MockValidator {
    /// Create a mock that accepts `accepted_token`
    pub fn new(accepted_token: impl Into<String>) -> Self {
        Self {
            accepted_token: accepted_token.into(),
        }
    }
}

#[async_trait]
impl DeviceTokenValidator for MockValidator {
    async fn is_valid_device(&self, device_token: &str) -> bool {
        !self.accepted_token.is_empty() && device_token == self.accepted_token
    }

    fn description(&self) -> &str {
        "mock device token validator"
    }
}
