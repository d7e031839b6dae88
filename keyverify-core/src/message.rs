//! Message types for device verification.
//!
//! Every verification message lives in the `m.key.verification.` namespace.
//! The request state machine only tracks the five lifecycle types; everything
//! else in the namespace belongs to the method-specific verifier.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CancelCode, VerificationResult};

/// Namespace prefix shared by all verification message types.
pub const EVENT_PREFIX: &str = "m.key.verification.";

/// Symbolic verification message type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Request,
    Ready,
    Start,
    Cancel,
    Done,
    /// Method-specific message (accept, key, mac, ...), holding the suffix.
    Other(String),
}

impl EventType {
    /// Parse a wire type, returning `None` when it is outside the namespace.
    pub fn from_wire(event_type: &str) -> Option<Self> {
        let suffix = event_type.strip_prefix(EVENT_PREFIX)?;
        let parsed = match suffix {
            "" => return None,
            "request" => Self::Request,
            "ready" => Self::Ready,
            "start" => Self::Start,
            "cancel" => Self::Cancel,
            "done" => Self::Done,
            other => Self::Other(other.to_string()),
        };
        Some(parsed)
    }

    /// Namespace suffix of this type.
    pub fn suffix(&self) -> &str {
        match self {
            Self::Request => "request",
            Self::Ready => "ready",
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::Done => "done",
            Self::Other(suffix) => suffix,
        }
    }

    /// Full wire type, e.g. `m.key.verification.start`.
    pub fn to_wire(&self) -> String {
        format!("{}{}", EVENT_PREFIX, self.suffix())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", EVENT_PREFIX, self.suffix())
    }
}

/// Verification methods this implementation knows how to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationMethod {
    #[serde(rename = "m.sas.v1")]
    Sas,
    #[serde(rename = "m.qr_code.scan.v1")]
    QrCodeScan,
    #[serde(rename = "m.qr_code.show.v1")]
    QrCodeShow,
    #[serde(rename = "m.reciprocate.v1")]
    Reciprocate,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sas => "m.sas.v1",
            Self::QrCodeScan => "m.qr_code.scan.v1",
            Self::QrCodeShow => "m.qr_code.show.v1",
            Self::Reciprocate => "m.reciprocate.v1",
        }
    }

    /// Parse a method identifier; unknown identifiers yield `None`.
    pub fn from_wire(method: &str) -> Option<Self> {
        match method {
            "m.sas.v1" => Some(Self::Sas),
            "m.qr_code.scan.v1" => Some(Self::QrCodeScan),
            "m.qr_code.show.v1" => Some(Self::QrCodeShow),
            "m.reciprocate.v1" => Some(Self::Reciprocate),
            _ => None,
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The local user and device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnIdentity {
    pub user_id: String,
    pub device_id: String,
}

impl OwnIdentity {
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// Content of `m.key.verification.request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContent {
    pub from_device: String,
    pub methods: Vec<String>,
}

/// Content of `m.key.verification.ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyContent {
    pub from_device: String,
    pub methods: Vec<String>,
}

/// Content of `m.key.verification.start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartContent {
    pub from_device: String,
    pub method: String,
}

/// Content of `m.key.verification.cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelContent {
    pub code: CancelCode,
    pub reason: String,
}

impl CancelContent {
    pub fn new(code: impl Into<CancelCode>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

impl Default for CancelContent {
    fn default() -> Self {
        Self {
            code: CancelCode::User,
            reason: "User declined".to_string(),
        }
    }
}

/// Content of `m.key.verification.done`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneContent {}

/// A verification message as delivered by a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEvent {
    /// Wire type, e.g. `m.key.verification.ready`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// User that sent the message.
    pub sender: String,
    pub content: serde_json::Value,
    /// Send time, when the delivery mechanism provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Device that sent the message, when the delivery mechanism reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_device: Option<String>,
}

impl VerificationEvent {
    pub fn new(event_type: &EventType, sender: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_wire(),
            sender: sender.into(),
            content,
            timestamp: None,
            sender_device: None,
        }
    }

    /// Attach a send timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach the sending device.
    pub fn with_sender_device(mut self, device_id: impl Into<String>) -> Self {
        self.sender_device = Some(device_id.into());
        self
    }

    /// Sending device: the one reported by the transport, else the one the
    /// content claims.
    pub fn origin_device(&self) -> Option<&str> {
        self.sender_device.as_deref().or_else(|| self.from_device())
    }

    /// Symbolic type, `None` when outside the verification namespace.
    pub fn kind(&self) -> Option<EventType> {
        EventType::from_wire(&self.event_type)
    }

    /// Device the message claims to originate from.
    pub fn from_device(&self) -> Option<&str> {
        self.content.get("from_device").and_then(|v| v.as_str())
    }

    /// Method identifiers advertised by a request or ready message.
    pub fn methods(&self) -> Vec<&str> {
        self.content
            .get("methods")
            .and_then(|v| v.as_array())
            .map(|methods| methods.iter().filter_map(|m| m.as_str()).collect())
            .unwrap_or_default()
    }

    /// Method chosen by a start message.
    pub fn method(&self) -> Option<&str> {
        self.content.get("method").and_then(|v| v.as_str())
    }

    /// Decode the content into a typed structure.
    pub fn content_as<T: DeserializeOwned>(&self) -> VerificationResult<T> {
        Ok(serde_json::from_value(self.content.clone())?)
    }
}
