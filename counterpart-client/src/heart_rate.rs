//! Heart-rate feed.
//!
//! Holds the heart-rate value shown to the user. Readings pushed into the feed
//! are published through a `watch` cell and revert to "no reading" once the
//! TTL passes without a newer sample.

use std::time::Duration;

use counterpart_core::{ExpiryAction, HeartRateValue};
use counterpart_types::HeartRate;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::timer;

/// Handle to a running feed. Cloning shares the same feed.
///
/// The feed task ends when the last handle is dropped.
#[derive(Clone)]
pub struct HeartRateFeed {
    inputs: mpsc::UnboundedSender<HeartRate>,
    value: watch::Receiver<HeartRate>,
}

impl HeartRateFeed {
    /// Spawn a feed whose readings expire after `ttl`.
    pub fn spawn(ttl: Duration) -> Self {
        let (inputs, rx) = mpsc::unbounded_channel();
        let (tx, value) = watch::channel(HeartRate::NONE);
        tokio::spawn(run(HeartRateValue::new(ttl), rx, tx));
        Self { inputs, value }
    }

    /// Push a new reading.
    pub fn push(&self, reading: HeartRate) {
        let _ = self.inputs.send(reading);
    }

    /// Reset to "no reading".
    pub fn reset(&self) {
        self.push(HeartRate::NONE);
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<HeartRate> {
        self.value.clone()
    }

    /// The value currently shown.
    pub fn current(&self) -> HeartRate {
        *self.value.borrow()
    }
}

async fn run(
    mut value: HeartRateValue,
    mut inputs: mpsc::UnboundedReceiver<HeartRate>,
    tx: watch::Sender<HeartRate>,
) {
    let mut expiry: Option<(u64, Instant)> = None;

    loop {
        let deadline = expiry.map(|(_, at)| at);
        tokio::select! {
            input = inputs.recv() => {
                let Some(reading) = input else {
                    break;
                };
                expiry = match value.set(reading) {
                    ExpiryAction::Schedule { generation, after } => {
                        Some((generation, Instant::now() + after))
                    }
                    ExpiryAction::Clear => None,
                };
                publish(&tx, value.current());
            }
            () = timer::sleep_until(deadline) => {
                if let Some((generation, _)) = expiry.take() {
                    if value.on_expired(generation) {
                        tracing::debug!("Heart-rate reading expired after {:?}", value.ttl());
                        publish(&tx, value.current());
                    }
                }
            }
        }
    }
}

fn publish(tx: &watch::Sender<HeartRate>, reading: HeartRate) {
    tx.send_if_modified(|current| {
        if *current == reading {
            return false;
        }
        *current = reading;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::wait_for;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn pushed_reading_is_visible() {
        let feed = HeartRateFeed::spawn(TTL);
        let mut rx = feed.subscribe();

        feed.push(HeartRate::from_bpm(72));

        assert_eq!(wait_for(&mut rx, |hr| !hr.is_none()).await.bpm(), 72);
    }

    #[tokio::test(start_paused = true)]
    async fn reading_expires_after_ttl() {
        let feed = HeartRateFeed::spawn(TTL);
        let mut rx = feed.subscribe();
        let pushed_at = Instant::now();
        feed.push(HeartRate::from_bpm(72));
        wait_for(&mut rx, |hr| !hr.is_none()).await;

        wait_for(&mut rx, |hr| hr.is_none()).await;

        assert!(pushed_at.elapsed() >= TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_reading_extends_window() {
        let feed = HeartRateFeed::spawn(TTL);
        let mut rx = feed.subscribe();
        feed.push(HeartRate::from_bpm(72));
        wait_for(&mut rx, |hr| hr.bpm() == 72).await;

        tokio::time::sleep(Duration::from_secs(8)).await;
        feed.push(HeartRate::from_bpm(75));
        wait_for(&mut rx, |hr| hr.bpm() == 75).await;

        // Past the first reading's TTL, the second is still shown.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(feed.current().bpm(), 75);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(feed.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_immediately() {
        let feed = HeartRateFeed::spawn(TTL);
        let mut rx = feed.subscribe();
        feed.push(HeartRate::from_bpm(90));
        wait_for(&mut rx, |hr| !hr.is_none()).await;

        feed.reset();

        wait_for(&mut rx, |hr| hr.is_none()).await;
    }
}
