//! Verifier that confirms immediately, standing in for a real SAS exchange.

use std::sync::Arc;

use async_trait::async_trait;

use keyverify_client::{BoxedVerifier, VerificationChannel, Verifier, VerifierContext};
use keyverify_core::{
    CancelContent, DoneContent, EventType, StartContent, VerificationEvent, VerificationMethod,
    VerificationResult,
};

/// Sends start (when this side begins) and done without comparing anything.
pub struct AutoConfirmVerifier {
    channel: Arc<dyn VerificationChannel>,
    device_id: String,
    started_by_us: bool,
    target: String,
}

impl AutoConfirmVerifier {
    pub fn boxed(context: VerifierContext) -> BoxedVerifier {
        tracing::info!(
            "{} creating SAS verifier for {} {}",
            context.identity.device_id,
            context.target_user,
            context.target_device
        );
        Box::new(Self {
            started_by_us: context.started_by_us(),
            target: format!("{}/{}", context.target_user, context.target_device),
            device_id: context.identity.device_id,
            channel: context.channel,
        })
    }
}

#[async_trait]
impl Verifier for AutoConfirmVerifier {
    fn method(&self) -> VerificationMethod {
        VerificationMethod::Sas
    }

    fn interested_in(&self) -> &[EventType] {
        &[]
    }

    fn handle_event(&mut self, event: &VerificationEvent) {
        tracing::debug!("{} verifier saw {}", self.device_id, event.event_type);
    }

    async fn verify(&mut self) -> VerificationResult<()> {
        if self.started_by_us {
            let start = StartContent {
                from_device: self.device_id.clone(),
                method: VerificationMethod::Sas.to_string(),
            };
            self.channel
                .send(EventType::Start, serde_json::to_value(start)?)
                .await?;
        }
        tracing::info!("{} confirmed {}", self.device_id, self.target);
        self.channel
            .send(EventType::Done, serde_json::to_value(DoneContent::default())?)
            .await
    }

    async fn cancel(&mut self, reason: CancelContent) -> VerificationResult<()> {
        tracing::info!("{} cancelling: {}", self.device_id, reason.reason);
        self.channel
            .send(EventType::Cancel, serde_json::to_value(reason)?)
            .await
    }
}
