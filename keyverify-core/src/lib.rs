//! # keyverify-core
//!
//! Core library for interactive device-to-device verification requests.
//!
//! This crate provides the wire-level message types, the request phases,
//! error types, and the stateless validity checks applied to every inbound
//! message before a request state machine sees it.

pub mod error;
pub mod message;
pub mod state;
pub mod validation;

pub use error::{CancelCode, VerificationError, VerificationResult};
pub use message::{
    CancelContent, DoneContent, EventType, OwnIdentity, ReadyContent, RequestContent,
    StartContent, VerificationEvent, VerificationMethod, EVENT_PREFIX,
};
pub use state::Phase;
pub use validation::{
    check_event, validate_event, validate_event_at, Rejection, ValidityWindow,
    EXPIRY_MARGIN_MS, VERIFICATION_TIMEOUT_MS,
};
