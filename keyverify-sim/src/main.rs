//! keyverify simulator - runs a full verification handshake between two
//! in-process devices.
//!
//! Usage: `keyverify-sim [in-room|to-device]`. Log verbosity follows `RUST_LOG`.

mod auto;
mod device;

use keyverify_client::{ChannelKind, MemoryHub};
use keyverify_core::{OwnIdentity, Phase, VerificationMethod, VerificationResult};
use tracing_subscriber::EnvFilter;

use crate::device::Device;

fn parse_kind(arg: Option<&str>) -> Option<ChannelKind> {
    match arg {
        None | Some("in-room") => Some(ChannelKind::InRoom),
        Some("to-device") => Some(ChannelKind::ToDevice),
        Some(_) => None,
    }
}

#[tokio::main]
async fn main() -> VerificationResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let kind = parse_kind(std::env::args().nth(1).as_deref())
        .expect("Invalid channel kind, expected in-room or to-device");
    tracing::info!("Simulating {:?} verification", kind);

    let hub = MemoryHub::new();
    let alice_id = OwnIdentity::new("@alice:example.org", "ALICE1");
    let bob_id = OwnIdentity::new("@bob:example.org", "BOB1");

    let alice_channel = Device::channel(kind, &hub, &alice_id, &bob_id.user_id, None);
    let txn = alice_channel.transaction_id().map(str::to_string);
    let bob_channel = Device::channel(kind, &hub, &bob_id, &alice_id.user_id, txn.as_deref());

    let mut alice = Device::join(&hub, alice_id, alice_channel);
    let mut bob = Device::join(&hub, bob_id, bob_channel);
    let finished = alice.request.wait_for(|s| s.phase == Phase::Done);

    alice.request.send_request().await?;
    alice.pump();
    bob.pump();

    bob.request.accept().await?;
    alice.pump();
    bob.pump();

    if let Some(verifier) = alice
        .request
        .begin_verification(VerificationMethod::Sas, None)?
    {
        verifier.verify().await?;
    }
    alice.pump();
    bob.pump();

    if let Some(verifier) = bob.request.verifier_mut() {
        verifier.verify().await?;
    }
    alice.pump();
    bob.pump();

    let outcome = finished.await?;
    tracing::info!(
        "Verification finished: alice {}, bob {}, methods {:?}",
        outcome.phase,
        bob.request.phase(),
        outcome.common_methods
    );
    Ok(())
}
