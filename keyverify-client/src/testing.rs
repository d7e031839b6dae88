//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use keyverify_core::{
    CancelContent, EventType, OwnIdentity, VerificationEvent, VerificationMethod, VerificationResult,
};

use crate::channel::{ChannelKind, MemoryChannel, MemoryHub, VerificationChannel};
use crate::config::RequestConfig;
use crate::request::VerificationRequest;
use crate::verifier::{MethodRegistry, Verifier, VerifierContext};

pub const ALICE: &str = "@alice:example.org";
pub const BOB: &str = "@bob:example.org";

/// What a [`RecordingVerifier`] was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifierCall {
    Created {
        target_user: String,
        target_device: String,
        resumed: bool,
    },
    Event(EventType),
    Verify,
    Cancel(CancelContent),
}

pub type CallLog = Arc<Mutex<Vec<VerifierCall>>>;

pub struct RecordingVerifier {
    method: VerificationMethod,
    channel: Arc<dyn VerificationChannel>,
    interested: Vec<EventType>,
    calls: CallLog,
}

impl RecordingVerifier {
    pub fn new(method: VerificationMethod, context: VerifierContext, calls: CallLog) -> Self {
        calls.lock().unwrap().push(VerifierCall::Created {
            target_user: context.target_user.clone(),
            target_device: context.target_device.clone(),
            resumed: !context.started_by_us(),
        });
        Self {
            method,
            channel: context.channel,
            interested: vec![
                EventType::Other("accept".into()),
                EventType::Other("key".into()),
                EventType::Other("mac".into()),
            ],
            calls,
        }
    }
}

#[async_trait]
impl Verifier for RecordingVerifier {
    fn method(&self) -> VerificationMethod {
        self.method
    }

    fn interested_in(&self) -> &[EventType] {
        &self.interested
    }

    fn handle_event(&mut self, event: &VerificationEvent) {
        if let Some(kind) = event.kind() {
            self.calls.lock().unwrap().push(VerifierCall::Event(kind));
        }
    }

    async fn verify(&mut self) -> VerificationResult<()> {
        self.calls.lock().unwrap().push(VerifierCall::Verify);
        Ok(())
    }

    async fn cancel(&mut self, reason: CancelContent) -> VerificationResult<()> {
        self.calls.lock().unwrap().push(VerifierCall::Cancel(reason.clone()));
        self.channel
            .send(EventType::Cancel, serde_json::to_value(reason)?)
            .await
    }
}

/// Registry whose verifiers all report into `calls`.
pub fn recording_registry(methods: &[VerificationMethod], calls: &CallLog) -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    for &method in methods {
        let calls = Arc::clone(calls);
        registry.register(method, move |context| {
            Box::new(RecordingVerifier::new(method, context, Arc::clone(&calls)))
        });
    }
    registry
}

pub fn alice() -> OwnIdentity {
    OwnIdentity::new(ALICE, "ALICE1")
}

pub fn event(kind: EventType, sender: &str, content: serde_json::Value) -> VerificationEvent {
    VerificationEvent::new(&kind, sender, content)
}

pub fn request_from_bob(methods: &[&str]) -> VerificationEvent {
    event(
        EventType::Request,
        BOB,
        json!({"from_device": "BOB1", "methods": methods}),
    )
}

pub fn ready_from_bob(methods: &[&str]) -> VerificationEvent {
    event(
        EventType::Ready,
        BOB,
        json!({"from_device": "BOB1", "methods": methods}),
    )
}

/// A message sent by the local user from a device other than this one.
pub fn other_own_device(kind: EventType) -> VerificationEvent {
    event(
        kind,
        ALICE,
        json!({"from_device": "ALICE2", "methods": ["m.sas.v1"], "method": "m.sas.v1"}),
    )
}

/// Alice's request towards Bob, wired to a fresh hub.
pub struct Fixture {
    pub hub: Arc<MemoryHub>,
    pub request: VerificationRequest,
    pub calls: CallLog,
}

impl Fixture {
    pub fn new(kind: ChannelKind, methods: &[VerificationMethod]) -> Self {
        Self::with_peer(kind, BOB, methods)
    }

    /// Alice's request towards `peer`; `ALICE` makes it a self-verification.
    pub fn with_peer(kind: ChannelKind, peer: &str, methods: &[VerificationMethod]) -> Self {
        let hub = MemoryHub::new();
        let calls = CallLog::default();
        let channel = MemoryChannel::new(kind, alice(), peer, Arc::clone(&hub));
        let request = VerificationRequest::new(
            Arc::new(channel),
            alice(),
            Arc::new(recording_registry(methods, &calls)),
            RequestConfig::default(),
        );
        Self { hub, request, calls }
    }

    pub fn calls(&self) -> Vec<VerifierCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Bob requests, this device accepts, Bob starts SAS.
    pub fn walk_to_started(&mut self) {
        self.request.handle_event(request_from_bob(&["m.sas.v1"]), true);
        self.request.handle_event(
            event(
                EventType::Ready,
                ALICE,
                json!({"from_device": "ALICE1", "methods": ["m.sas.v1"]}),
            ),
            true,
        );
        self.request.handle_event(
            event(
                EventType::Start,
                BOB,
                json!({"from_device": "BOB1", "method": "m.sas.v1"}),
            ),
            true,
        );
        assert_eq!(self.request.phase(), keyverify_core::Phase::Started);
    }
}
