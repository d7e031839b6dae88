//! Error types and cancellation codes for device verification.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cancellation codes carried by `m.key.verification.cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CancelCode {
    /// The user cancelled or declined.
    User,
    /// The exchange took too long.
    Timeout,
    /// The transaction is not known to the device.
    UnknownTransaction,
    /// No usable verification method.
    UnknownMethod,
    /// A message arrived that was not expected at this point.
    UnexpectedMessage,
    /// Keys did not match.
    KeyMismatch,
    /// The user the keys belong to is not the expected one.
    UserMismatch,
    /// A message could not be interpreted.
    InvalidMessage,
    /// Another of the user's devices accepted the request.
    Accepted,
    /// Any code outside the known vocabulary.
    Custom(String),
}

impl CancelCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "m.user",
            Self::Timeout => "m.timeout",
            Self::UnknownTransaction => "m.unknown_transaction",
            Self::UnknownMethod => "m.unknown_method",
            Self::UnexpectedMessage => "m.unexpected_message",
            Self::KeyMismatch => "m.key_mismatch",
            Self::UserMismatch => "m.user_mismatch",
            Self::InvalidMessage => "m.invalid_message",
            Self::Accepted => "m.accepted",
            Self::Custom(code) => code,
        }
    }
}

impl From<String> for CancelCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "m.user" => Self::User,
            "m.timeout" => Self::Timeout,
            "m.unknown_transaction" => Self::UnknownTransaction,
            "m.unknown_method" => Self::UnknownMethod,
            "m.unexpected_message" => Self::UnexpectedMessage,
            "m.key_mismatch" => Self::KeyMismatch,
            "m.user_mismatch" => Self::UserMismatch,
            "m.invalid_message" => Self::InvalidMessage,
            "m.accepted" => Self::Accepted,
            _ => Self::Custom(code),
        }
    }
}

impl From<&str> for CancelCode {
    fn from(code: &str) -> Self {
        Self::from(code.to_string())
    }
}

impl From<CancelCode> for String {
    fn from(code: CancelCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for CancelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device verification errors.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Method is not registered locally or was not negotiated with the other party.
    #[error("unknown verification method: {0}")]
    UnknownMethod(String),

    /// A message arrived that violates the protocol flow.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// No user/device could be determined to address a verifier to.
    #[error("no target user or device to verify")]
    NoTarget,

    /// The request was cancelled while waiting on it.
    #[error("verification cancelled: {code} - {reason}")]
    Cancelled { code: CancelCode, reason: String },

    /// Channel send failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request went away before a wait could settle.
    #[error("verification request dropped")]
    RequestDropped,
}

impl VerificationError {
    /// Code to send to the other party when aborting because of this error.
    pub fn cancel_code(&self) -> CancelCode {
        match self {
            Self::UnknownMethod(_) => CancelCode::UnknownMethod,
            Self::UnexpectedMessage(_) => CancelCode::UnexpectedMessage,
            Self::Cancelled { code, .. } => code.clone(),
            Self::Serialization(_) => CancelCode::InvalidMessage,
            Self::NoTarget | Self::Transport(_) | Self::RequestDropped => CancelCode::User,
        }
    }
}

/// Result type alias for verification operations.
pub type VerificationResult<T> = Result<T, VerificationError>;
