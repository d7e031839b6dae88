//! Verifiers and the registry of locally supported methods.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use keyverify_core::{
    CancelContent, EventType, OwnIdentity, VerificationError, VerificationEvent,
    VerificationMethod, VerificationResult,
};

use crate::channel::VerificationChannel;

/// Owned verifier handed out by the registry.
pub type BoxedVerifier = Box<dyn Verifier>;

/// Method-specific protocol handler owned by a request once started.
#[async_trait]
pub trait Verifier: Send {
    /// Method this verifier implements.
    fn method(&self) -> VerificationMethod;

    /// Message types, besides cancel, that should be forwarded to this verifier.
    fn interested_in(&self) -> &[EventType];

    /// Feed a message from the other party.
    fn handle_event(&mut self, event: &VerificationEvent);

    /// Drive the method protocol.
    async fn verify(&mut self) -> VerificationResult<()>;

    /// Abort the exchange, sending the cancellation through the channel.
    async fn cancel(&mut self, reason: CancelContent) -> VerificationResult<()>;
}

/// Everything a verifier is constructed with.
#[derive(Clone)]
pub struct VerifierContext {
    pub channel: Arc<dyn VerificationChannel>,
    pub identity: OwnIdentity,
    pub target_user: String,
    pub target_device: String,
    /// Start message to resume from, when the other party started.
    pub start_event: Option<VerificationEvent>,
}

impl VerifierContext {
    /// Whether the local device sent the start message.
    pub fn started_by_us(&self) -> bool {
        self.start_event.is_none()
    }
}

impl fmt::Debug for VerifierContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierContext")
            .field("identity", &self.identity)
            .field("target_user", &self.target_user)
            .field("target_device", &self.target_device)
            .field("start_event", &self.start_event)
            .finish_non_exhaustive()
    }
}

/// Constructor for one verification method.
pub type VerifierFactory = Box<dyn Fn(VerifierContext) -> BoxedVerifier + Send + Sync>;

/// Registry of locally supported verification methods.
///
/// Registration order is the order methods are advertised in.
#[derive(Default)]
pub struct MethodRegistry {
    methods: Vec<RegisteredMethod>,
}

struct RegisteredMethod {
    method: VerificationMethod,
    factory: VerifierFactory,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method with its factory, replacing any previous factory.
    pub fn register<F>(&mut self, method: VerificationMethod, factory: F)
    where
        F: Fn(VerifierContext) -> BoxedVerifier + Send + Sync + 'static,
    {
        let factory: VerifierFactory = Box::new(factory);
        match self.methods.iter_mut().find(|r| r.method == method) {
            Some(existing) => existing.factory = factory,
            None => self.methods.push(RegisteredMethod { method, factory }),
        }
    }

    /// Builder-style [`MethodRegistry::register`].
    pub fn with_method<F>(mut self, method: VerificationMethod, factory: F) -> Self
    where
        F: Fn(VerifierContext) -> BoxedVerifier + Send + Sync + 'static,
    {
        self.register(method, factory);
        self
    }

    /// Locally supported methods, in registration order.
    pub fn methods(&self) -> Vec<VerificationMethod> {
        self.methods.iter().map(|r| r.method).collect()
    }

    /// Method identifiers as advertised in request and ready messages.
    pub fn wire_methods(&self) -> Vec<String> {
        self.methods.iter().map(|r| r.method.as_str().to_string()).collect()
    }

    pub fn supports(&self, method: VerificationMethod) -> bool {
        self.methods.iter().any(|r| r.method == method)
    }

    /// Resolve a wire identifier to a registered method.
    pub fn resolve(&self, method: &str) -> VerificationResult<VerificationMethod> {
        VerificationMethod::from_wire(method)
            .filter(|m| self.supports(*m))
            .ok_or_else(|| VerificationError::UnknownMethod(method.to_string()))
    }

    /// Construct a verifier for a registered method.
    pub fn create(
        &self,
        method: VerificationMethod,
        context: VerifierContext,
    ) -> VerificationResult<BoxedVerifier> {
        let registered = self
            .methods
            .iter()
            .find(|r| r.method == method)
            .ok_or_else(|| VerificationError::UnknownMethod(method.to_string()))?;
        Ok((registered.factory)(context))
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}
