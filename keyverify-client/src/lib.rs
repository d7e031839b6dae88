//! keyverify client - interactive device verification requests.
//!
//! A [`VerificationRequest`] tracks one exchange with a counterparty over a
//! [`VerificationChannel`]. Inbound messages are handed to
//! [`VerificationRequest::receive`]; the request works out its phase from
//! everything seen so far and hands method-specific messages to the
//! [`Verifier`] it creates once the exchange starts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyverify_client::{
//!     ChannelKind, MemoryChannel, MemoryHub, MethodRegistry, RequestConfig, VerificationRequest,
//! };
//! use keyverify_core::{OwnIdentity, Phase};
//!
//! # async fn run(registry: MethodRegistry) -> keyverify_core::VerificationResult<()> {
//! let hub = MemoryHub::new();
//! let me = OwnIdentity::new("@alice:example.org", "ALICE1");
//! let mut inbox = hub.join(me.clone());
//! let channel = MemoryChannel::new(ChannelKind::InRoom, me.clone(), "@bob:example.org", hub);
//!
//! let mut request = VerificationRequest::new(
//!     Arc::new(channel),
//!     me,
//!     Arc::new(registry),
//!     RequestConfig::default(),
//! );
//! let ready = request.wait_for(|s| s.phase == Phase::Ready);
//! request.send_request().await?;
//! while let Some(event) = inbox.recv().await {
//!     request.receive(event, true);
//!     if request.phase() != Phase::Requested && request.phase() != Phase::Unsent {
//!         break;
//!     }
//! }
//! ready.await?;
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
mod events;
mod request;
mod transition;
mod verifier;

#[cfg(test)]
mod testing;

pub use channel::{ChannelKind, MemoryChannel, MemoryHub, VerificationChannel};
pub use config::{RequestConfig, DEFAULT_NOTIFICATION_CAPACITY};
pub use events::{EventLedger, EventSlots, Provenance, RecordedEvent, Side};
pub use request::{RequestSnapshot, VerificationRequest, VerificationTarget};
pub use transition::{compute_transitions, pending_transitions, Transition};
pub use verifier::{
    BoxedVerifier, MethodRegistry, Verifier, VerifierContext, VerifierFactory,
};
