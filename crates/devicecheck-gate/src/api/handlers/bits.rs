//! Two-bit query and update handlers
//!
//! Both routes sit behind the device gate, so the device token is taken from
//! the [`DeviceToken`] extension rather than parsed again.

use axum::{extract::State, Json};
use devicecheck_core::{AppleResponse, BitsState, BitsUpdate, IntoBit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::api::error::ApiError;
use crate::middleware::DeviceToken;

/// A bit as sent by a client: boolean, number or string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BitInput {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl IntoBit for BitInput {
    fn into_bit(self) -> bool {
        match self {
            BitInput::Bool(value) => value,
            BitInput::Int(value) => value.into_bit(),
            BitInput::Text(value) => value.into_bit(),
        }
    }
}

/// Request to update the device's bits
#[derive(Debug, Deserialize)]
pub struct UpdateBitsRequest {
    #[serde(default)]
    pub bit0: Option<BitInput>,

    #[serde(default)]
    pub bit1: Option<BitInput>,
}

/// Response from a bit update
#[derive(Debug, Serialize)]
pub struct UpdateBitsResponse {
    pub updated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit0: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit1: Option<bool>,
}

/// Read the two bits Apple stores for the device
///
/// POST /v1/bits/query
pub async fn query_bits(
    State(state): State<Arc<AppState>>,
    DeviceToken(device_token): DeviceToken,
) -> Result<Json<BitsState>, ApiError> {
    let bits = state
        .client
        .query_two_bits(&device_token)
        .await
        .and_then(AppleResponse::into_bits)?;

    Ok(Json(bits))
}

/// Set one or both bits for the device
///
/// POST /v1/bits/update
pub async fn update_bits(
    State(state): State<Arc<AppState>>,
    DeviceToken(device_token): DeviceToken,
    Json(request): Json<UpdateBitsRequest>,
) -> Result<Json<UpdateBitsResponse>, ApiError> {
    let update = BitsUpdate::from_options(request.bit0, request.bit1);

    state
        .client
        .update_two_bits(&device_token, update)
        .await
        .and_then(AppleResponse::into_result)?;

    info!(bit0 = ?update.bit_0, bit1 = ?update.bit_1, "Device bits updated");

    Ok(Json(UpdateBitsResponse {
        updated: true,
        bit0: update.bit_0,
        bit1: update.bit_1,
    }))
}
