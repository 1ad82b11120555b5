//! DeviceCheck protocol client
//!
//! Issues the three DeviceCheck operations as signed HTTPS requests:
//!
//! - `POST /v1/validate_device_token`
//! - `POST /v1/update_two_bits`
//! - `POST /v1/query_two_bits`
//!
//! Each request carries `Authorization: Bearer <credential>` and a JSON body
//! with the device token, a fresh transaction id and a millisecond timestamp.
//! Requests are never retried: a replayed update must be correlated by the
//! caller, not resent blindly.

use chrono::Utc;
use devicecheck_core::{
    redact_token, AppleResponse, BitsUpdate, CredentialMinter, DeviceCheckError, Failure,
    KeyMaterial, Result,
};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, Environment};

/// DeviceCheck endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ValidateDeviceToken,
    UpdateTwoBits,
    QueryTwoBits,
}

impl Endpoint {
    /// Path relative to the environment's base URL
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ValidateDeviceToken => "v1/validate_device_token",
            Endpoint::UpdateTwoBits => "v1/update_two_bits",
            Endpoint::QueryTwoBits => "v1/query_two_bits",
        }
    }

    /// Whether a 200 answer carries the bit state
    fn expects_bits(&self) -> bool {
        matches!(self, Endpoint::QueryTwoBits)
    }
}

/// JSON body sent to Apple
#[derive(Debug, Serialize)]
struct DeviceRequest<'a> {
    device_token: &'a str,
    transaction_id: String,
    timestamp: i64,
    #[serde(flatten)]
    bits: BitsUpdate,
}

impl<'a> DeviceRequest<'a> {
    fn new(device_token: &'a str, bits: BitsUpdate) -> Self {
        Self {
            device_token,
            transaction_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            bits,
        }
    }
}

/// Client for Apple's DeviceCheck API
///
/// Holds the configuration, the credential minter and a pooled HTTP client.
/// Share it behind an `Arc`; all operations take `&self`.
pub struct DeviceCheck {
    config: ClientConfig,
    minter: CredentialMinter,
    http: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for DeviceCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCheck")
            .field("team_id", &self.config.team_id)
            .field("bundle_id", &self.config.bundle_id)
            .field("key_id", &self.config.key_id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl DeviceCheck {
    /// Build a client, loading and checking the private key
    ///
    /// Fails with `InvalidKeyMaterial` or `Config`; both are fatal.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.bundle_id.trim().is_empty() {
            return Err(DeviceCheckError::Config("bundle_id must not be empty".into()));
        }

        let key = KeyMaterial::load(&config.team_id, &config.key_id, &config.private_key)?;
        let minter = CredentialMinter::new(key, config.bundle_id.clone())
            .with_lifetime(config.credential_lifetime, config.refresh_margin)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DeviceCheckError::Config(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = config.endpoint();

        if config.environment == Environment::Development {
            warn!("Using the DeviceCheck development environment; do not use it in production");
        }

        info!(
            team_id = %config.team_id,
            bundle_id = %config.bundle_id,
            key_id = %config.key_id,
            environment = %config.environment,
            endpoint = %endpoint,
            "DeviceCheck client initialized"
        );

        Ok(Self {
            config,
            minter,
            http,
            endpoint,
        })
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Credential minter, for callers that need the bearer token directly
    pub fn minter(&self) -> &CredentialMinter {
        &self.minter
    }

    /// Validate a device token
    ///
    /// Success means Apple accepted the token as authentic.
    pub async fn validate_device_token(&self, device_token: &str) -> Result<AppleResponse> {
        self.call(Endpoint::ValidateDeviceToken, device_token, BitsUpdate::new())
            .await
    }

    /// Update one or both bits of a device
    ///
    /// Omitted bits keep their stored value. An update that sets neither bit
    /// is rejected with `MisconfiguredRequest` before anything is sent.
    pub async fn update_two_bits(
        &self,
        device_token: &str,
        bits: BitsUpdate,
    ) -> Result<AppleResponse> {
        if bits.is_empty() {
            return Err(DeviceCheckError::MisconfiguredRequest(
                "update_two_bits needs at least one of bit0 or bit1".into(),
            ));
        }
        self.call(Endpoint::UpdateTwoBits, device_token, bits).await
    }

    /// Query both bits of a device
    pub async fn query_two_bits(&self, device_token: &str) -> Result<AppleResponse> {
        self.call(Endpoint::QueryTwoBits, device_token, BitsUpdate::new())
            .await
    }

    async fn call(
        &self,
        endpoint: Endpoint,
        device_token: &str,
        bits: BitsUpdate,
    ) -> Result<AppleResponse> {
        if device_token.trim().is_empty() {
            return Err(DeviceCheckError::MisconfiguredRequest(
                "device token must not be empty".into(),
            ));
        }

        let credential = self.minter.credential()?;
        let payload = DeviceRequest::new(device_token, bits);
        let url = format!("{}/{}", self.endpoint, endpoint.path());

        debug!(
            url = %url,
            transaction_id = %payload.transaction_id,
            device_token = %redact_token(device_token),
            bit0 = ?payload.bits.bit_0,
            bit1 = ?payload.bits.bit_1,
            "Sending DeviceCheck request"
        );

        let response = match self
            .http
            .post(&url)
            .header(AUTHORIZATION, credential.bearer())
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => {
                        debug!(status = status, body = %body, "DeviceCheck response");
                        AppleResponse::from_http(status, &body, endpoint.expects_bits())
                    }
                    Err(e) => AppleResponse::Failure(Failure {
                        status_code: Some(status),
                        ..Failure::transport(describe_transport_error(&e))
                    }),
                }
            }
            Err(e) => AppleResponse::Failure(Failure::transport(describe_transport_error(&e))),
        };

        if let Some(failure) = response.failure() {
            warn!(
                endpoint = endpoint.path(),
                transaction_id = %payload.transaction_id,
                kind = %failure.kind,
                status = ?failure.status_code,
                description = %failure.description,
                "DeviceCheck request failed"
            );
        }

        if self.config.raise_on_error {
            response.into_result()
        } else {
            Ok(response)
        }
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
