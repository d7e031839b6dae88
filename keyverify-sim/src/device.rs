//! One simulated device: a request plus the inbox feeding it.

use std::sync::Arc;

use tokio::sync::mpsc;

use keyverify_client::{
    ChannelKind, MemoryChannel, MemoryHub, MethodRegistry, RequestConfig, VerificationRequest,
};
use keyverify_core::{OwnIdentity, VerificationEvent, VerificationMethod};

use crate::auto::AutoConfirmVerifier;

pub struct Device {
    pub identity: OwnIdentity,
    pub request: VerificationRequest,
    inbox: mpsc::UnboundedReceiver<VerificationEvent>,
}

impl Device {
    /// Join `hub` and open a request towards `peer_user`.
    pub fn join(hub: &Arc<MemoryHub>, identity: OwnIdentity, channel: MemoryChannel) -> Self {
        let inbox = hub.join(identity.clone());
        let registry = MethodRegistry::new().with_method(VerificationMethod::Sas, AutoConfirmVerifier::boxed);
        let request = VerificationRequest::new(
            Arc::new(channel),
            identity.clone(),
            Arc::new(registry),
            RequestConfig::default(),
        );
        Self {
            identity,
            request,
            inbox,
        }
    }

    /// Build the channel for this device; to-device channels reuse `transaction_id`.
    pub fn channel(
        kind: ChannelKind,
        hub: &Arc<MemoryHub>,
        identity: &OwnIdentity,
        peer_user: &str,
        transaction_id: Option<&str>,
    ) -> MemoryChannel {
        let channel = MemoryChannel::new(kind, identity.clone(), peer_user, Arc::clone(hub));
        match transaction_id {
            Some(txn) => channel.with_transaction_id(txn),
            None => channel,
        }
    }

    /// Hand every queued message to the request. Returns how many were accepted.
    pub fn pump(&mut self) -> usize {
        let mut accepted = 0;
        while let Ok(event) = self.inbox.try_recv() {
            if self.request.receive(event, true) {
                accepted += 1;
            }
        }
        tracing::info!(
            "{} is {} ({} messages)",
            self.identity.device_id,
            self.request.phase(),
            accepted
        );
        accepted
    }
}
