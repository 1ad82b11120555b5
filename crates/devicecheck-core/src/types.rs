//! Outcomes of DeviceCheck operations

use serde::{Deserialize, Serialize};

use crate::bits::BitsState;
use crate::error::{DeviceCheckError, Result};

/// Texts Apple sends with a 200 when a device has no stored bits
const BIT_STATE_NOT_FOUND: [&str; 2] = ["bit state not found", "failed to find bit state"];

/// Short, log-safe form of a device token or credential
pub fn redact_token(token: &str) -> String {
    match token.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => "[short token]".to_string(),
    }
}

/// Category of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-200 answer from Apple
    AppleRejection,
    /// Stale or replayed transaction
    Conflict,
    /// Query for a device whose bits were never set
    BitStateNotFound,
    /// Network, timeout or unreadable response
    Transport,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::AppleRejection => write!(f, "apple_rejection"),
            FailureKind::Conflict => write!(f, "conflict"),
            FailureKind::BitStateNotFound => write!(f, "bit_state_not_found"),
            FailureKind::Transport => write!(f, "transport"),
        }
    }
}

/// A failed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    /// HTTP status, absent when no response was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Apple's description, or the transport error message
    pub description: String,
}

impl Failure {
    /// Failure with no HTTP response behind it
    pub fn transport(description: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            status_code: None,
            description: description.into(),
        }
    }
}

impl From<Failure> for DeviceCheckError {
    fn from(failure: Failure) -> Self {
        match failure.kind {
            FailureKind::AppleRejection => DeviceCheckError::AppleRejection {
                status_code: failure.status_code.unwrap_or_default(),
                description: failure.description,
            },
            FailureKind::Conflict => DeviceCheckError::Conflict {
                status_code: failure.status_code.unwrap_or_default(),
                description: failure.description,
            },
            FailureKind::BitStateNotFound => DeviceCheckError::BitStateNotFound(failure.description),
            FailureKind::Transport => DeviceCheckError::TransportFailure(failure.description),
        }
    }
}

/// Error body Apple sends with some non-200 answers
#[derive(Debug, Deserialize)]
struct AppleErrorBody {
    status_code: Option<u16>,
    description: Option<String>,
}

/// Outcome of one DeviceCheck operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppleResponse {
    /// Apple accepted the request
    Success {
        status_code: u16,
        /// Present for bit queries
        bits: Option<BitsState>,
    },
    /// The request failed
    Failure(Failure),
}

impl AppleResponse {
    /// Interpret an HTTP answer from Apple
    ///
    /// `expect_bits` is set for queries, where a 200 must carry the bits.
    pub fn from_http(status_code: u16, body: &str, expect_bits: bool) -> Self {
        if status_code == 200 {
            let lowered = body.to_ascii_lowercase();
            if BIT_STATE_NOT_FOUND.iter().any(|text| lowered.contains(text)) {
                return AppleResponse::Failure(Failure {
                    kind: FailureKind::BitStateNotFound,
                    status_code: Some(status_code),
                    description: body.trim().to_string(),
                });
            }

            if !expect_bits {
                return AppleResponse::Success {
                    status_code,
                    bits: None,
                };
            }

            return match serde_json::from_str::<BitsState>(body) {
                Ok(bits) => AppleResponse::Success {
                    status_code,
                    bits: Some(bits),
                },
                Err(e) => AppleResponse::Failure(Failure {
                    kind: FailureKind::Transport,
                    status_code: Some(status_code),
                    description: format!("malformed response: {}", e),
                }),
            };
        }

        let (status_code, description) = match serde_json::from_str::<AppleErrorBody>(body) {
            Ok(AppleErrorBody {
                status_code: reported,
                description: Some(description),
            }) => (reported.unwrap_or(status_code), description),
            _ => (status_code, body.to_string()),
        };

        let kind = if status_code == 409
            || (status_code == 400 && description.to_ascii_lowercase().contains("transaction"))
        {
            FailureKind::Conflict
        } else {
            FailureKind::AppleRejection
        };

        AppleResponse::Failure(Failure {
            kind,
            status_code: Some(status_code),
            description,
        })
    }

    /// Whether Apple accepted the request
    pub fn is_ok(&self) -> bool {
        matches!(self, AppleResponse::Success { .. })
    }

    /// HTTP status, absent for transport failures
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppleResponse::Success { status_code, .. } => Some(*status_code),
            AppleResponse::Failure(failure) => failure.status_code,
        }
    }

    /// Bits returned by a successful query
    pub fn bits(&self) -> Option<&BitsState> {
        match self {
            AppleResponse::Success { bits, .. } => bits.as_ref(),
            AppleResponse::Failure(_) => None,
        }
    }

    /// Failure details, if the request failed
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            AppleResponse::Success { .. } => None,
            AppleResponse::Failure(failure) => Some(failure),
        }
    }

    /// Escalate a failure into an error
    pub fn into_result(self) -> Result<Self> {
        match self {
            AppleResponse::Failure(failure) => Err(failure.into()),
            success => Ok(success),
        }
    }

    /// The queried bits, or an error if there are none
    pub fn into_bits(self) -> Result<BitsState> {
        match self {
            AppleResponse::Success { bits: Some(bits), .. } => Ok(bits),
            AppleResponse::Success { bits: None, .. } => Err(DeviceCheckError::TransportFailure(
                "response carried no bit state".into(),
            )),
            AppleResponse::Failure(failure) => Err(failure.into()),
        }
    }
}

impl std::fmt::Display for AppleResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppleResponse::Success {
                status_code,
                bits: Some(bits),
            } => {
                write!(f, "{} bits: {} {}", status_code, bits.bit_0, bits.bit_1)?;
                if let Some(ref month) = bits.last_update_time {
                    write!(f, " last update: {}", month)?;
                }
                Ok(())
            }
            AppleResponse::Success { status_code, bits: None } => write!(f, "{}", status_code),
            AppleResponse::Failure(failure) => match failure.status_code {
                Some(status) => write!(f, "{} {}", status, failure.description),
                None => write!(f, "{}: {}", failure.kind, failure.description),
            },
        }
    }
}
