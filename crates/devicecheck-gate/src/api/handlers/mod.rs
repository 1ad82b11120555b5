//! API request handlers

pub mod bits;
pub mod validate;

use devicecheck_client::DeviceCheck;
use std::sync::Arc;

pub use bits::{query_bits, update_bits, BitInput, UpdateBitsRequest, UpdateBitsResponse};
pub use validate::validate_device;

/// Application state shared across handlers
pub struct AppState {
    /// Client used for bit queries and updates
    pub client: Arc<DeviceCheck>,
}
