//! Demo command - a simulated wearable and handheld on one in-memory mesh.
//!
//! The handheld pings the wearable once it is found; the wearable answers the
//! ping by starting collection. State transitions and heart-rate values are
//! printed as the handheld sees them.

use anyhow::Result;
use counterpart_client::{
    ConnectionState, CounterpartConfig, HandheldApp, MemoryMesh, RemoteRequest, WearableApp,
};
use std::sync::Arc;
use std::time::Duration;

/// Run the demo command.
pub async fn run(config: CounterpartConfig, seconds: u64) -> Result<()> {
    let mesh = MemoryMesh::new();
    let phone = HandheldApp::start(Arc::new(mesh.join("phone")), &config).await;
    let mut wearable = WearableApp::start(Arc::new(mesh.join("watch")), config).await;

    let mut state = phone.connection_state();
    let mut heart_rate = phone.heart_rate();
    let mut pinged = false;
    println!("Connection: {}", *state.borrow_and_update());

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("Connection: {}", current);
                if !pinged && current != ConnectionState::NoDeviceFound {
                    pinged = phone.ping().await;
                }
            }
            changed = heart_rate.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("Heart rate: {}", *heart_rate.borrow_and_update());
            }
            request = wearable.next_request() => match request {
                Some(RemoteRequest::EnsureRunning { from }) => {
                    println!("Wearable: {} asked for collection", from);
                    if !wearable.is_collecting() {
                        if let Err(e) = wearable.start_collecting().await {
                            println!("Wearable: could not start collection: {}", e);
                        }
                    }
                }
                Some(RemoteRequest::Launch { from }) => {
                    println!("Wearable: {} asked to launch the app", from);
                }
                None => break,
            },
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted");
                break;
            }
        }
    }

    wearable.shutdown().await;
    phone.shutdown().await;
    println!("Demo finished");
    Ok(())
}
