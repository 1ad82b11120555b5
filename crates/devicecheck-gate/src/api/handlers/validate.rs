//! Device validation endpoint

/// Confirm that the caller presented a genuine device token
///
/// POST /v1/validate
///
/// The device gate has already done the work by the time this runs.
pub async fn validate_device() -> &'static str {
    "device token valid"
}
