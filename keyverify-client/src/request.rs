//! Verification request state machine.
//!
//! A request accumulates every lifecycle message seen from either party,
//! rebuilds the phase chain from scratch on each inbound message and applies
//! only the steps it has not applied yet. Outbound operations never change the
//! phase directly; the echo of what they send does.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use keyverify_core::{
    check_event, CancelContent, EventType, OwnIdentity, Phase, ReadyContent, RequestContent,
    VerificationError, VerificationEvent, VerificationMethod, VerificationResult,
};

use crate::channel::VerificationChannel;
use crate::config::RequestConfig;
use crate::events::{EventLedger, Provenance, RecordedEvent, Side};
use crate::transition::{compute_transitions, pending_transitions, Transition};
use crate::verifier::{BoxedVerifier, MethodRegistry, Verifier, VerifierContext};

/// Explicit user/device a verifier should address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationTarget {
    pub user_id: String,
    pub device_id: String,
}

impl VerificationTarget {
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// Externally visible state of a request, broadcast after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSnapshot {
    pub phase: Phase,
    pub observe_only: bool,
    pub initiated_by_me: bool,
    pub has_verifier: bool,
    pub common_methods: Vec<VerificationMethod>,
    pub cancelling_user_id: Option<String>,
    pub cancellation: Option<CancelContent>,
}

/// One interactive verification exchange with a single counterparty.
pub struct VerificationRequest {
    channel: Arc<dyn VerificationChannel>,
    identity: OwnIdentity,
    registry: Arc<MethodRegistry>,
    config: RequestConfig,
    phase: Phase,
    ledger: EventLedger,
    common_methods: Vec<VerificationMethod>,
    observe_only: bool,
    initiated_by_me: Option<bool>,
    cancelling_user_id: Option<String>,
    verifier: Option<BoxedVerifier>,
    request_event: Option<RecordedEvent>,
    ready_event: Option<RecordedEvent>,
    changes: broadcast::Sender<RequestSnapshot>,
}

impl VerificationRequest {
    /// Create a new request in the unsent phase.
    pub fn new(
        channel: Arc<dyn VerificationChannel>,
        identity: OwnIdentity,
        registry: Arc<MethodRegistry>,
        config: RequestConfig,
    ) -> Self {
        let (changes, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            channel,
            identity,
            registry,
            config,
            phase: Phase::Unsent,
            ledger: EventLedger::default(),
            common_methods: Vec::new(),
            observe_only: false,
            initiated_by_me: None,
            cancelling_user_id: None,
            verifier: None,
            request_event: None,
            ready_event: None,
            changes,
        }
    }

    /// Get current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether this device only watches an exchange between other devices.
    pub fn observe_only(&self) -> bool {
        self.observe_only
    }

    pub fn initiated_by_me(&self) -> bool {
        self.initiated_by_me.unwrap_or(false)
    }

    /// Methods supported by both parties, once the other party's are known.
    pub fn common_methods(&self) -> &[VerificationMethod] {
        &self.common_methods
    }

    pub fn cancelling_user_id(&self) -> Option<&str> {
        self.cancelling_user_id.as_deref()
    }

    /// Code and reason of the recorded cancellation.
    pub fn cancellation(&self) -> Option<CancelContent> {
        self.ledger
            .by_either(&EventType::Cancel)
            .and_then(|cancel| cancel.event.content_as().ok())
    }

    /// Whether this device still takes part in a live exchange.
    pub fn is_pending(&self) -> bool {
        !self.observe_only && !self.phase.is_terminal()
    }

    /// Whether [`VerificationRequest::accept`] would send anything.
    pub fn can_accept(&self) -> bool {
        !self.observe_only && self.phase == Phase::Requested && !self.initiated_by_me()
    }

    /// Whether both ends of the channel are the local user.
    pub fn is_self_verification(&self) -> bool {
        self.channel.user_id() == self.identity.user_id
    }

    pub fn requesting_user_id(&self) -> &str {
        if self.initiated_by_me() {
            &self.identity.user_id
        } else {
            self.channel.user_id()
        }
    }

    pub fn receiving_user_id(&self) -> &str {
        if self.initiated_by_me() {
            self.channel.user_id()
        } else {
            &self.identity.user_id
        }
    }

    /// Whether the other party advertised or chose `method`.
    pub fn other_party_supports_method(&self, method: VerificationMethod) -> bool {
        let theirs = self.ledger.by_side(Side::Them);
        let advertised = [EventType::Ready, EventType::Request]
            .iter()
            .filter_map(|kind| theirs.get(kind))
            .any(|e| e.event.methods().contains(&method.as_str()));
        let started = theirs
            .get(&EventType::Start)
            .is_some_and(|e| e.event.method() == Some(method.as_str()));
        advertised || started
    }

    /// Time left before the exchange expires, zero when nothing opened it yet.
    pub fn timeout(&self) -> Duration {
        let opener = self.ledger.by_either(&EventType::Request).or_else(|| {
            self.ledger
                .by_either(&EventType::Start)
                .filter(|_| self.channel.kind().can_create_request(&EventType::Start))
        });
        let Some(opener) = opener else {
            return Duration::ZERO;
        };
        let elapsed = Utc::now().signed_duration_since(opener.sent_at());
        (self.config.window.timeout - elapsed)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn verifier(&self) -> Option<&dyn Verifier> {
        self.verifier.as_deref()
    }

    pub fn verifier_mut(&mut self) -> Option<&mut dyn Verifier> {
        match self.verifier.as_mut() {
            Some(verifier) => Some(&mut **verifier),
            None => None,
        }
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            phase: self.phase,
            observe_only: self.observe_only,
            initiated_by_me: self.initiated_by_me(),
            has_verifier: self.verifier.is_some(),
            common_methods: self.common_methods.clone(),
            cancelling_user_id: self.cancelling_user_id.clone(),
            cancellation: self.cancellation(),
        }
    }

    /// Subscribe to change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestSnapshot> {
        self.changes.subscribe()
    }

    /// Validate an inbound message and handle it when valid.
    ///
    /// Returns whether the message was handed to the state machine.
    pub fn receive(&mut self, event: VerificationEvent, is_live: bool) -> bool {
        if let Err(rejection) = check_event(&event, &self.config.window) {
            tracing::warn!("Dropping verification message from {}: {}", event.sender, rejection);
            return false;
        }
        self.handle_event(event, is_live);
        true
    }

    /// Handle an inbound message that already passed validation.
    pub fn handle_event(&mut self, event: VerificationEvent, is_live: bool) {
        let Some(kind) = event.kind() else {
            tracing::warn!("Ignoring non-verification message {}", event.event_type);
            return;
        };

        if !is_live {
            self.observe_only = true;
        }

        let Some(provenance) = Provenance::classify(&event, &self.identity, self.channel.user_id())
        else {
            tracing::warn!("Ignoring {} from unrelated sender {}", kind, event.sender);
            return;
        };

        let recorded = RecordedEvent::new(event, provenance);
        self.note_initiator(&kind, &recorded);
        let tracked = self.ledger.record(&kind, recorded.clone());

        let had_verifier = self.verifier.is_some();
        let transitions = if tracked && !self.phase.is_terminal() {
            pending_transitions(
                self.phase,
                compute_transitions(&self.ledger, self.channel.kind()),
            )
        } else {
            Vec::new()
        };
        for transition in &transitions {
            self.apply_transition(transition);
        }

        // a verifier created in this pass has already seen the message
        if had_verifier && provenance.side() == Side::Them {
            if let Some(verifier) = self.verifier.as_mut() {
                if kind == EventType::Cancel || verifier.interested_in().contains(&kind) {
                    verifier.handle_event(&recorded.event);
                }
            }
        }

        if !transitions.is_empty() {
            self.notify();
        }
    }

    /// Create the verifier for `method`, or return the one that already exists.
    ///
    /// Returns `Ok(None)` when this device only observes or the request has ended.
    pub fn begin_verification(
        &mut self,
        method: VerificationMethod,
        target: Option<VerificationTarget>,
    ) -> VerificationResult<Option<&mut dyn Verifier>> {
        if self.observe_only || self.verifier.is_some() || self.phase.is_terminal() {
            return Ok(self.verifier_mut());
        }

        let negotiated = matches!(self.phase, Phase::Requested | Phase::Ready | Phase::Started);
        if negotiated && !self.common_methods.contains(&method) {
            return Err(VerificationError::UnknownMethod(method.to_string()));
        }

        let verifier = self.create_verifier(method, None, target.as_ref())?;
        tracing::debug!("Beginning {} verification", method);
        self.verifier = Some(verifier);
        Ok(self.verifier_mut())
    }

    /// Send the request message advertising every local method.
    pub async fn send_request(&mut self) -> VerificationResult<()> {
        if self.observe_only || self.phase != Phase::Unsent {
            tracing::debug!("Not sending request in phase {}", self.phase);
            return Ok(());
        }

        self.initiated_by_me = Some(true);
        let content = RequestContent {
            from_device: self.identity.device_id.clone(),
            methods: self.registry.wire_methods(),
        };
        self.channel
            .send(EventType::Request, serde_json::to_value(content)?)
            .await
    }

    /// Cancel the exchange, through the verifier when one exists.
    pub async fn cancel(&mut self, reason: CancelContent) -> VerificationResult<()> {
        if self.observe_only || self.phase == Phase::Cancelled {
            return Ok(());
        }

        if let Some(verifier) = self.verifier.as_mut() {
            return verifier.cancel(reason).await;
        }

        self.cancelling_user_id = Some(self.identity.user_id.clone());
        self.channel
            .send(EventType::Cancel, serde_json::to_value(reason)?)
            .await
    }

    /// Accept a request from the other party by sending ready.
    pub async fn accept(&mut self) -> VerificationResult<()> {
        if !self.can_accept() {
            return Ok(());
        }

        let content = ReadyContent {
            from_device: self.identity.device_id.clone(),
            methods: self.registry.wire_methods(),
        };
        self.channel
            .send(EventType::Ready, serde_json::to_value(content)?)
            .await
    }

    /// Resolve once `predicate` holds on the current or a later state.
    ///
    /// Fails with [`VerificationError::Cancelled`] when the request is
    /// cancelled first. The returned future does not borrow the request; its
    /// subscription ends when it settles or is dropped.
    pub fn wait_for<F>(
        &self,
        predicate: F,
    ) -> impl Future<Output = VerificationResult<RequestSnapshot>> + Send + 'static
    where
        F: Fn(&RequestSnapshot) -> bool + Send + 'static,
    {
        let subscription = match settle(&predicate, self.snapshot()) {
            Some(outcome) => Err(outcome),
            None => Ok(self.changes.subscribe()),
        };

        async move {
            let mut changes = match subscription {
                Ok(changes) => changes,
                Err(outcome) => return outcome,
            };
            loop {
                match changes.recv().await {
                    Ok(snapshot) => {
                        if let Some(outcome) = settle(&predicate, snapshot) {
                            return outcome;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("wait_for skipped {} request changes", skipped);
                    }
                    Err(RecvError::Closed) => return Err(VerificationError::RequestDropped),
                }
            }
        }
    }

    /// Resolve once the exchange has started (or finished).
    pub fn wait_for_verifier(
        &self,
    ) -> impl Future<Output = VerificationResult<RequestSnapshot>> + Send + 'static {
        self.wait_for(|s| matches!(s.phase, Phase::Started | Phase::Done))
    }

    fn note_initiator(&mut self, kind: &EventType, recorded: &RecordedEvent) {
        if self.initiated_by_me.is_some() {
            return;
        }
        let opens = match kind {
            EventType::Request => true,
            EventType::Start => {
                self.ledger.by_either(&EventType::Request).is_none()
                    && self.channel.kind().can_create_request(kind)
            }
            _ => false,
        };
        if opens {
            self.initiated_by_me = Some(recorded.provenance.is_own_device());
        }
    }

    fn apply_transition(&mut self, transition: &Transition) {
        tracing::debug!("Verification request phase: {} -> {}", self.phase, transition.phase);
        self.phase = transition.phase;

        let Some(recorded) = transition.event.as_ref() else {
            return;
        };

        match transition.phase {
            Phase::Requested => self.request_event = Some(recorded.clone()),
            Phase::Ready => self.ready_event = Some(recorded.clone()),
            Phase::Cancelled => {
                if self.cancelling_user_id.is_none() {
                    self.cancelling_user_id = Some(recorded.event.sender.clone());
                }
            }
            _ => {}
        }

        // another of our own devices is handling this exchange
        if !self.observe_only
            && matches!(transition.phase, Phase::Requested | Phase::Ready | Phase::Started)
            && recorded.provenance == Provenance::OwnUser
        {
            tracing::debug!("Observing verification handled by another own device");
            self.observe_only = true;
        }

        if matches!(transition.phase, Phase::Requested | Phase::Ready)
            && !recorded.provenance.is_own_device()
            && !self.observe_only
        {
            self.common_methods = self.negotiate(&recorded.event);
        }

        if transition.phase == Phase::Started && !self.observe_only && self.verifier.is_none() {
            let method = recorded.event.method().unwrap_or_default();
            let created = self
                .registry
                .resolve(method)
                .and_then(|method| self.create_verifier(method, Some(recorded), None));
            match created {
                Ok(mut verifier) => {
                    verifier.handle_event(&recorded.event);
                    self.verifier = Some(verifier);
                }
                Err(e) => tracing::warn!("Could not create verifier for {}: {}", method, e),
            }
        }
    }

    fn negotiate(&self, event: &VerificationEvent) -> Vec<VerificationMethod> {
        let mut common = Vec::new();
        for method in event.methods().into_iter().filter_map(VerificationMethod::from_wire) {
            if self.registry.supports(method) && !common.contains(&method) {
                common.push(method);
            }
        }
        common
    }

    fn create_verifier(
        &self,
        method: VerificationMethod,
        start: Option<&RecordedEvent>,
        target: Option<&VerificationTarget>,
    ) -> VerificationResult<BoxedVerifier> {
        let initiated_by_me = start.map_or(true, |s| s.provenance.is_own_device());
        let target = match target {
            Some(target) => target.clone(),
            None => self.resolve_target(start)?,
        };

        let context = VerifierContext {
            channel: Arc::clone(&self.channel),
            identity: self.identity.clone(),
            target_user: target.user_id,
            target_device: target.device_id,
            start_event: if initiated_by_me {
                None
            } else {
                start.map(|s| s.event.clone())
            },
        };
        self.registry.create(method, context)
    }

    fn resolve_target(&self, start: Option<&RecordedEvent>) -> VerificationResult<VerificationTarget> {
        [start, self.ready_event.as_ref(), self.request_event.as_ref()]
            .into_iter()
            .flatten()
            .find(|e| !e.provenance.is_own_device())
            .and_then(|e| {
                let device = e.event.from_device()?;
                Some(VerificationTarget::new(e.event.sender.as_str(), device))
            })
            .ok_or(VerificationError::NoTarget)
    }

    fn notify(&self) {
        // no subscribers is fine
        let _ = self.changes.send(self.snapshot());
    }
}

fn settle<F>(predicate: &F, snapshot: RequestSnapshot) -> Option<VerificationResult<RequestSnapshot>>
where
    F: Fn(&RequestSnapshot) -> bool,
{
    if predicate(&snapshot) {
        return Some(Ok(snapshot));
    }
    if snapshot.phase == Phase::Cancelled {
        let cancellation = snapshot.cancellation.unwrap_or_default();
        return Some(Err(VerificationError::Cancelled {
            code: cancellation.code,
            reason: cancellation.reason,
        }));
    }
    None
}
