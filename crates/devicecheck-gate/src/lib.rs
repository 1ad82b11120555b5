//! DeviceCheck Gate
//!
//! Keeps requests from non-genuine devices away from protected handlers:
//!
//! - [`gate`]: the framework-independent [`DeviceGate`], parameterized over a
//!   validator, a token extractor and the response used for rejections
//! - [`middleware`]: the axum adapter (`require_device`, [`DeviceToken`])
//! - [`api`]: a small gateway exposing validation and the two bits over HTTP
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `POST /v1/validate` - Answers `200 device token valid` for genuine devices
//! - `POST /v1/bits/query` - Read the device's two bits
//! - `POST /v1/bits/update` - Set one or both bits
//!
//! Rejected requests get `403 Invalid device token` and nothing more.

pub mod api;
pub mod gate;
pub mod middleware;

pub use api::create_router;
pub use api::error::ApiError;
pub use api::handlers::AppState;
pub use gate::{DeviceGate, GateConfig, TokenExtractor, Verdict};
pub use middleware::{
    require_device, AxumGate, AxumTokenExtractor, DeviceToken, InvalidDeviceResponse,
};
