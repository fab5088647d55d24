//! Send command - stream sensor readings to a relay.

use anyhow::{Context, Result};
use counterpart_client::{sensor, CounterpartConfig, HrSender, RelayHrSender};
use counterpart_types::HeartRate;

/// Run the send command.
///
/// Fails when the relay cannot be reached.
pub async fn run(config: &CounterpartConfig, relay: Option<&str>, count: u32) -> Result<()> {
    let address = relay.unwrap_or(&config.relay.address);
    let mut sender = RelayHrSender::new(address, config.relay_connect_timeout());
    if !sender.connect().await {
        anyhow::bail!("Could not connect to relay at {}", address);
    }

    let mut sensor = sensor::from_config(config);
    let mut readings = sensor.start().await.context("Failed to start sensor")?;

    let mut sent = 0;
    while sent < count {
        let Some(reading) = readings.recv().await else {
            break;
        };
        sender.send_value(reading).await;
        println!("Sent {}", reading);
        sent += 1;
    }

    sensor.stop().await;
    sender.send_value(HeartRate::NONE).await;
    sender.disconnect().await;
    println!("Sent {} readings to {}", sent, address);
    Ok(())
}
