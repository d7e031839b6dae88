//! Transport channels for verification messages.
//!
//! A channel addresses one counterparty over one delivery mechanism. The
//! request only needs to send through it and to know who is on the other end;
//! receiving is driven by the caller handing messages to the request.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use keyverify_core::{EventType, OwnIdentity, VerificationEvent, VerificationResult};

/// Delivery mechanism behind a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Messages are timeline events in a shared room.
    InRoom,
    /// Messages are sent directly device to device.
    ToDevice,
}

impl ChannelKind {
    /// Whether a message of this type may open an exchange on its own.
    pub fn can_create_request(&self, event_type: &EventType) -> bool {
        match self {
            Self::InRoom => *event_type == EventType::Request,
            Self::ToDevice => matches!(event_type, EventType::Request | EventType::Start),
        }
    }
}

/// All verification transports implement this trait.
#[async_trait]
pub trait VerificationChannel: Send + Sync {
    /// Delivery mechanism, used for request-creation rules.
    fn kind(&self) -> ChannelKind;

    /// The counterparty user.
    fn user_id(&self) -> &str;

    /// Send a message. Resolves once the transport has dispatched it.
    async fn send(&self, event_type: EventType, content: serde_json::Value) -> VerificationResult<()>;
}

/// Shared in-process bus standing in for a homeserver.
///
/// In-room messages reach every joined inbox, the sender's included. To-device
/// messages reach the peer user's inboxes plus the sending device itself, which
/// plays the part of the local echo a to-device transport has to fake.
#[derive(Debug, Default)]
pub struct MemoryHub {
    inboxes: Mutex<Vec<Inbox>>,
    log: Mutex<Vec<VerificationEvent>>,
}

#[derive(Debug)]
struct Inbox {
    identity: OwnIdentity,
    sender: mpsc::UnboundedSender<VerificationEvent>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a device inbox receiving every subsequent message routed to it.
    pub fn join(&self, identity: OwnIdentity) -> mpsc::UnboundedReceiver<VerificationEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Inbox { identity, sender });
        receiver
    }

    /// Every message sent through the hub so far, in send order.
    pub fn sent(&self) -> Vec<VerificationEvent> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn deliver(&self, kind: ChannelKind, from: &OwnIdentity, to_user: &str, event: VerificationEvent) {
        tracing::trace!("hub delivering {} from {}", event.event_type, event.sender);
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        self.inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|inbox| {
                let routed = match kind {
                    ChannelKind::InRoom => true,
                    ChannelKind::ToDevice => inbox.identity.user_id == to_user || inbox.identity == *from,
                };
                !routed || inbox.sender.send(event.clone()).is_ok()
            });
    }
}

/// Channel over a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    kind: ChannelKind,
    own: OwnIdentity,
    peer_user: String,
    transaction_id: Option<String>,
    hub: Arc<MemoryHub>,
}

impl MemoryChannel {
    /// Create a channel from the local device to `peer_user`.
    ///
    /// To-device channels get a fresh transaction id; both ends of one
    /// exchange must share it, see [`MemoryChannel::with_transaction_id`].
    pub fn new(
        kind: ChannelKind,
        own: OwnIdentity,
        peer_user: impl Into<String>,
        hub: Arc<MemoryHub>,
    ) -> Self {
        let transaction_id = match kind {
            ChannelKind::ToDevice => Some(Uuid::new_v4().to_string()),
            ChannelKind::InRoom => None,
        };
        Self {
            kind,
            own,
            peer_user: peer_user.into(),
            transaction_id,
            hub,
        }
    }

    /// Use a specific transaction id.
    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }
}

#[async_trait]
impl VerificationChannel for MemoryChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn user_id(&self) -> &str {
        &self.peer_user
    }

    async fn send(&self, event_type: EventType, mut content: serde_json::Value) -> VerificationResult<()> {
        if let (Some(txn), Some(map)) = (&self.transaction_id, content.as_object_mut()) {
            map.insert("transaction_id".to_string(), serde_json::Value::String(txn.clone()));
        }

        let event = VerificationEvent::new(&event_type, self.own.user_id.as_str(), content)
            .with_timestamp(Utc::now())
            .with_sender_device(self.own.device_id.as_str());
        self.hub.deliver(self.kind, &self.own, &self.peer_user, event);
        Ok(())
    }
}
