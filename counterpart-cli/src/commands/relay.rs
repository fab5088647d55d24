//! Relay command - receive heart-rate messages over TCP.

use anyhow::{Context, Result};
use counterpart_client::RelayListener;

/// Run the relay command until interrupted.
pub async fn run(listen: &str) -> Result<()> {
    let listener = RelayListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind relay to {}", listen))?;
    let addr = listener.local_addr().context("Failed to read relay address")?;
    println!("Relay listening on {}", addr);

    let mut server = listener.serve();
    loop {
        tokio::select! {
            received = server.recv() => match received {
                Some(received) => {
                    println!("{}: {} bpm", received.peer, received.message.hr_value);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    server.shutdown().await;
    println!("Relay stopped");
    Ok(())
}
