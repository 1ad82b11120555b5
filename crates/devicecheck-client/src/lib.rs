//! DeviceCheck Client
//!
//! Talks to Apple's DeviceCheck API on behalf of a backend:
//!
//! - **validate_device_token**: is this device token genuine?
//! - **query_two_bits**: read the two bits Apple stores for the device
//! - **update_two_bits**: set one or both bits
//!
//! ## Usage
//!
//! ```ignore
//! use devicecheck_client::{ClientConfig, DeviceCheck, Environment};
//! use devicecheck_core::{BitsUpdate, KeySource};
//!
//! let client = DeviceCheck::new(
//!     ClientConfig::new("XX7AN23E0Z", "com.example.app", "JSAD983ENA",
//!                       KeySource::detect("AuthKey_JSAD983ENA.p8"))
//!         .with_environment(Environment::Development),
//! )?;
//!
//! let response = client.update_two_bits(&token, BitsUpdate::new().bit_0(true)).await?;
//! if !response.is_ok() {
//!     println!("Apple said: {}", response);
//! }
//! ```
//!
//! ## Failures
//!
//! Apple rejections and transport failures come back inside `Ok` as an
//! `AppleResponse::Failure` unless `raise_on_error` is set, in which case
//! they are returned as `Err`. `AppleResponse::into_result` performs the same
//! escalation for a single call.

pub mod client;
pub mod config;
pub mod validator;

pub use client::{DeviceCheck, Endpoint};
pub use config::{ClientConfig, Environment};
pub use validator::{DeviceTokenValidator, MockValidator};
