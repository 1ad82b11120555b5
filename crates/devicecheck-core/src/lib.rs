//! # DeviceCheck Core
//!
//! Building blocks for talking to Apple's DeviceCheck service.
//!
//! ## Key Concepts
//!
//! - **Key material**: the team's ES256 `.p8` key plus its team and key IDs
//! - **Credential**: the short-lived JWT that authorizes the backend to Apple,
//!   distinct from the device token an app sends to the backend
//! - **Two bits**: the per-device state Apple stores on the backend's behalf
//! - **AppleResponse**: the outcome of one operation, success or failure
//!
//! Networking lives in `devicecheck-client`; nothing here performs I/O beyond
//! reading a key file.

pub mod bits;
pub mod credential;
pub mod error;
pub mod keys;
pub mod types;

pub use bits::{BitsState, BitsUpdate, IntoBit};
pub use credential::{Credential, CredentialClaims, CredentialMinter, CREDENTIAL_ALGORITHM};
pub use error::{DeviceCheckError, Result};
pub use keys::{KeyMaterial, KeySource};
pub use types::{redact_token, AppleResponse, Failure, FailureKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
