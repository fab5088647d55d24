//! Heart-rate sensor collaborators.
//!
//! The wearable reads samples from a [`HeartRateSensor`]. Two implementations
//! ship here: a random-walk [`SimulatedSensor`] and a [`ScriptedSensor`] that
//! replays a fixed list of readings.

use std::time::Duration;

use async_trait::async_trait;
use counterpart_types::HeartRate;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{CounterpartConfig, SensorKind};
use crate::error::ClientError;

const READING_BUFFER: usize = 32;

/// Lowest BPM the simulated sensor produces.
pub const SIMULATED_MIN_BPM: u8 = 40;

/// Highest BPM the simulated sensor produces.
pub const SIMULATED_MAX_BPM: u8 = 200;

/// A source of heart-rate readings.
#[async_trait]
pub trait HeartRateSensor: Send {
    /// Begin sampling. Readings arrive on the returned receiver until
    /// [`stop`](Self::stop).
    async fn start(&mut self) -> Result<mpsc::Receiver<HeartRate>, ClientError>;

    /// Stop sampling and close the reading stream.
    async fn stop(&mut self);

    /// Deliver the latest reading again without waiting for the next sample.
    async fn flush(&mut self);

    /// The most recent reading.
    fn latest(&self) -> HeartRate;
}

/// Build the sensor described by `config`.
pub fn from_config(config: &CounterpartConfig) -> Box<dyn HeartRateSensor> {
    let interval = config.sensor_interval();
    let sensor = &config.sensor;
    match sensor.kind {
        SensorKind::Simulated => Box::new(SimulatedSensor::new(interval, sensor.baseline_bpm)),
        SensorKind::Scripted => Box::new(ScriptedSensor::new(interval, sensor.script.clone())),
    }
}

/// State shared by the sensor implementations.
struct Sampler {
    latest: watch::Sender<HeartRate>,
    readings: Option<mpsc::Sender<HeartRate>>,
    task: Option<JoinHandle<()>>,
}

impl Sampler {
    fn new() -> Self {
        let (latest, _) = watch::channel(HeartRate::NONE);
        Self {
            latest,
            readings: None,
            task: None,
        }
    }

    fn start<F>(&mut self, interval: Duration, mut next: F) -> Result<mpsc::Receiver<HeartRate>, ClientError>
    where
        F: FnMut(HeartRate) -> Option<HeartRate> + Send + 'static,
    {
        if self.task.is_some() {
            return Err(ClientError::Sensor("sensor already started".into()));
        }
        if interval.is_zero() {
            return Err(ClientError::Sensor("sampling interval must be non-zero".into()));
        }
        let (tx, rx) = mpsc::channel(READING_BUFFER);
        let latest = self.latest.clone();
        let readings = tx.clone();

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let current = *latest.borrow();
                let Some(reading) = next(current) else {
                    tracing::debug!("Sensor has no more readings");
                    break;
                };
                latest.send_replace(reading);
                if readings.send(reading).await.is_err() {
                    break;
                }
            }
        }));
        self.readings = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) {
        self.readings = None;
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::debug!("Sensor task ended with error: {}", e);
                }
            }
        }
        self.latest.send_replace(HeartRate::NONE);
    }

    async fn flush(&mut self) {
        if let Some(readings) = &self.readings {
            let latest = *self.latest.borrow();
            if readings.send(latest).await.is_err() {
                tracing::debug!("Sensor reader gone, flush dropped");
            }
        }
    }
}

/// Random walk around a baseline.
pub struct SimulatedSensor {
    interval: Duration,
    baseline: HeartRate,
    sampler: Sampler,
}

impl SimulatedSensor {
    /// Create a sensor sampling every `interval`, starting near `baseline_bpm`.
    pub fn new(interval: Duration, baseline_bpm: u8) -> Self {
        Self {
            interval,
            baseline: HeartRate::from_bpm(i32::from(baseline_bpm)),
            sampler: Sampler::new(),
        }
    }
}

#[async_trait]
impl HeartRateSensor for SimulatedSensor {
    async fn start(&mut self) -> Result<mpsc::Receiver<HeartRate>, ClientError> {
        let baseline = self.baseline;
        self.sampler.start(self.interval, move |current| {
            let from = if current.is_none() { baseline } else { current };
            Some(random_step(from))
        })
    }

    async fn stop(&mut self) {
        self.sampler.stop().await;
    }

    async fn flush(&mut self) {
        self.sampler.flush().await;
    }

    fn latest(&self) -> HeartRate {
        *self.sampler.latest.borrow()
    }
}

/// Move up to 2 BPM in either direction, staying within the simulated range.
fn random_step(from: HeartRate) -> HeartRate {
    let mut byte = [0u8; 1];
    let delta = match getrandom::getrandom(&mut byte) {
        Ok(()) => i32::from(byte[0] % 5) - 2,
        Err(_) => 0,
    };
    let next = (i32::from(from.bpm()) + delta)
        .clamp(i32::from(SIMULATED_MIN_BPM), i32::from(SIMULATED_MAX_BPM));
    HeartRate::from_bpm(next)
}

/// Replays a fixed list of readings, one per interval.
pub struct ScriptedSensor {
    interval: Duration,
    script: Vec<u8>,
    sampler: Sampler,
}

impl ScriptedSensor {
    /// Create a sensor that replays `script`.
    pub fn new(interval: Duration, script: Vec<u8>) -> Self {
        Self {
            interval,
            script,
            sampler: Sampler::new(),
        }
    }
}

#[async_trait]
impl HeartRateSensor for ScriptedSensor {
    async fn start(&mut self) -> Result<mpsc::Receiver<HeartRate>, ClientError> {
        let mut script = self.script.clone().into_iter();
        self.sampler
            .start(self.interval, move |_| script.next().map(HeartRate::from_byte))
    }

    async fn stop(&mut self) {
        self.sampler.stop().await;
    }

    async fn flush(&mut self) {
        self.sampler.flush().await;
    }

    fn latest(&self) -> HeartRate {
        *self.sampler.latest.borrow()
    }
}
