//! Framework-independent device gate
//!
//! A [`DeviceGate`] sits in front of a request handler. It pulls the device
//! token out of the request, asks a [`DeviceTokenValidator`] about it and
//! either lets the request through or answers with a fixed "invalid device"
//! response. The gate never exposes why a token was refused.
//!
//! The only framework-specific piece is the [`TokenExtractor`]: how a token
//! is found in a given request type.

use async_trait::async_trait;
use devicecheck_client::DeviceTokenValidator;
use devicecheck_core::redact_token;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Finds the device token in a framework's request type
///
/// Takes `&mut` so adapters can buffer a body and put it back.
#[async_trait]
pub trait TokenExtractor<Req: Send>: Send + Sync {
    /// The device token, if the request carries one
    async fn extract(&self, request: &mut Req) -> Option<String>;
}

/// Gate settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateConfig {
    /// Let every request through without validation.
    ///
    /// For test and CI environments only. Off unless set explicitly.
    pub skip_validation: bool,
}

impl GateConfig {
    /// Read `DEVICECHECK_SKIP_VALIDATION`; only the exact value `true` opts in
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            skip_validation: lookup("DEVICECHECK_SKIP_VALIDATION").as_deref() == Some("true"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// Decision for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Run the handler; carries the token when one was found
    Proceed { device_token: Option<String> },
    /// Answer with the invalid response
    Reject,
}

/// Device token check in front of a handler
///
/// - `V`: validator (the DeviceCheck client, or a mock)
/// - `X`: extractor for the host framework's request type
/// - `R`: the pre-built response returned on rejection
pub struct DeviceGate<V: ?Sized, X, R> {
    validator: Arc<V>,
    extractor: X,
    on_invalid: R,
    config: GateConfig,
}

impl<V, X, R> DeviceGate<V, X, R>
where
    V: DeviceTokenValidator + ?Sized,
    R: Clone,
{
    /// Create a gate answering `on_invalid` for missing or rejected tokens
    pub fn new(validator: Arc<V>, extractor: X, on_invalid: R) -> Self {
        info!(validator = validator.description(), "Device gate initialized");
        Self {
            validator,
            extractor,
            on_invalid,
            config: GateConfig::default(),
        }
    }

    /// Apply gate settings
    pub fn with_config(mut self, config: GateConfig) -> Self {
        if config.skip_validation {
            warn!("Device token validation is DISABLED for this gate");
        }
        self.config = config;
        self
    }

    pub fn config(&self) -> GateConfig {
        self.config
    }

    /// Response returned for rejected requests
    pub fn invalid_response(&self) -> &R {
        &self.on_invalid
    }

    /// Decide whether a request may proceed
    pub async fn check<Req>(&self, request: &mut Req) -> Verdict
    where
        Req: Send,
        X: TokenExtractor<Req>,
    {
        let device_token = self.extractor.extract(request).await;

        if self.config.skip_validation {
            debug!("Skipping device token validation");
            return Verdict::Proceed { device_token };
        }

        let Some(device_token) = device_token else {
            info!("No device token found in request");
            return Verdict::Reject;
        };

        if self.validator.is_valid_device(&device_token).await {
            debug!(device_token = %redact_token(&device_token), "Device token accepted");
            Verdict::Proceed {
                device_token: Some(device_token),
            }
        } else {
            info!(device_token = %redact_token(&device_token), "Caught invalid device token");
            Verdict::Reject
        }
    }

    /// Run `handler` if the request passes, otherwise return the invalid response
    ///
    /// The handler receives the request unchanged and its return value is
    /// passed through as is.
    pub async fn guard<Req, F, Fut>(&self, mut request: Req, handler: F) -> R
    where
        Req: Send,
        X: TokenExtractor<Req>,
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = R>,
    {
        match self.check(&mut request).await {
            Verdict::Proceed { .. } => handler(request).await,
            Verdict::Reject => self.on_invalid.clone(),
        }
    }
}
