//! Per-side bookkeeping of the lifecycle messages seen by a request.

use chrono::{DateTime, Utc};

use keyverify_core::{EventType, OwnIdentity, VerificationEvent};

/// Which party authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Us,
    Them,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::Us => Self::Them,
            Self::Them => Self::Us,
        }
    }
}

/// Provenance of a message, computed once when it is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Sent by this very device.
    OwnDevice,
    /// Sent by the local user from some other device, or without naming one.
    OwnUser,
    /// Sent by the user on the other end of the channel.
    Counterparty,
}

impl Provenance {
    /// Classify a message; `None` when the sender is neither party.
    ///
    /// When the counterparty is the local user (self-verification), the
    /// user's other devices are the counterparty. Their messages can only be
    /// told apart from ours when the sending device is known.
    pub fn classify(event: &VerificationEvent, identity: &OwnIdentity, counterparty: &str) -> Option<Self> {
        if event.sender == identity.user_id {
            match event.origin_device() {
                Some(device) if device == identity.device_id => Some(Self::OwnDevice),
                Some(_) if counterparty == identity.user_id => Some(Self::Counterparty),
                _ => Some(Self::OwnUser),
            }
        } else if event.sender == counterparty {
            Some(Self::Counterparty)
        } else {
            None
        }
    }

    pub fn side(self) -> Side {
        match self {
            Self::OwnDevice | Self::OwnUser => Side::Us,
            Self::Counterparty => Side::Them,
        }
    }

    pub fn is_own_device(self) -> bool {
        self == Self::OwnDevice
    }
}

/// A message together with where and when it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub event: VerificationEvent,
    pub provenance: Provenance,
    pub received_at: DateTime<Utc>,
}

impl RecordedEvent {
    pub fn new(event: VerificationEvent, provenance: Provenance) -> Self {
        Self {
            event,
            provenance,
            received_at: Utc::now(),
        }
    }

    pub fn side(&self) -> Side {
        self.provenance.side()
    }

    /// Send time, falling back to when the message was received.
    pub fn sent_at(&self) -> DateTime<Utc> {
        self.event.timestamp.unwrap_or(self.received_at)
    }
}

/// One slot per lifecycle message type; later messages overwrite earlier ones.
#[derive(Debug, Clone, Default)]
pub struct EventSlots {
    request: Option<RecordedEvent>,
    ready: Option<RecordedEvent>,
    start: Option<RecordedEvent>,
    cancel: Option<RecordedEvent>,
    done: Option<RecordedEvent>,
}

impl EventSlots {
    pub fn get(&self, kind: &EventType) -> Option<&RecordedEvent> {
        match kind {
            EventType::Request => self.request.as_ref(),
            EventType::Ready => self.ready.as_ref(),
            EventType::Start => self.start.as_ref(),
            EventType::Cancel => self.cancel.as_ref(),
            EventType::Done => self.done.as_ref(),
            EventType::Other(_) => None,
        }
    }

    /// Store a message. Method-specific types have no slot and are not kept.
    pub fn set(&mut self, kind: &EventType, event: RecordedEvent) -> bool {
        let slot = match kind {
            EventType::Request => &mut self.request,
            EventType::Ready => &mut self.ready,
            EventType::Start => &mut self.start,
            EventType::Cancel => &mut self.cancel,
            EventType::Done => &mut self.done,
            EventType::Other(_) => return false,
        };
        *slot = Some(event);
        true
    }
}

/// Lifecycle messages seen so far, partitioned by side.
#[derive(Debug, Clone, Default)]
pub struct EventLedger {
    us: EventSlots,
    them: EventSlots,
}

impl EventLedger {
    /// Record a message under its author's side; returns whether it was kept.
    pub fn record(&mut self, kind: &EventType, event: RecordedEvent) -> bool {
        tracing::trace!("recording {} from {:?}", kind, event.provenance);
        match event.side() {
            Side::Us => self.us.set(kind, event),
            Side::Them => self.them.set(kind, event),
        }
    }

    pub fn by_side(&self, side: Side) -> &EventSlots {
        match side {
            Side::Us => &self.us,
            Side::Them => &self.them,
        }
    }

    /// Message of this type from either side, preferring the counterparty's.
    pub fn by_either(&self, kind: &EventType) -> Option<&RecordedEvent> {
        self.them.get(kind).or_else(|| self.us.get(kind))
    }

    /// Message of this type authored by the side opposite `side`.
    pub fn by_other(&self, kind: &EventType, side: Side) -> Option<&RecordedEvent> {
        self.by_side(side.other()).get(kind)
    }
}
