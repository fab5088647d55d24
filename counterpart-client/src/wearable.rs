//! Wearable side of the pairing.
//!
//! [`WearableApp`] advertises the wearable capability, follows the paired
//! handheld, keeps it informed through the liveness sender and, while
//! collection runs, pumps sensor readings into an [`HrSender`].

use std::sync::Arc;

use counterpart_types::{
    ControlMessage, HeartRate, MessageEvent, NodeId, PHONE_APP, WEAR_APP, WEAR_APP_ACTIVE,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{CounterpartConfig, SenderKind};
use crate::error::ClientError;
use crate::liveness::LivenessSender;
use crate::presence::PresenceTracker;
use crate::relay::RelayHrSender;
use crate::sender::{ChannelHrSender, HrSender};
use crate::sensor::{self, HeartRateSensor};
use crate::transport::{bounded, MeshTransport, NodeFilter, Subscription};

/// A request the handheld made of the wearable app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    /// Bring the app to the foreground.
    Launch {
        /// Requesting node.
        from: NodeId,
    },
    /// Make sure the collection service is running.
    EnsureRunning {
        /// Requesting node.
        from: NodeId,
    },
}

struct Collection {
    sensor: Box<dyn HeartRateSensor>,
    pump: JoinHandle<()>,
}

/// The wearable application.
pub struct WearableApp<T: ?Sized> {
    transport: Arc<T>,
    config: CounterpartConfig,
    phone: PresenceTracker,
    liveness: LivenessSender,
    listener: JoinHandle<()>,
    requests: mpsc::UnboundedReceiver<RemoteRequest>,
    local_hr: watch::Sender<HeartRate>,
    collection: Option<Collection>,
}

impl<T> WearableApp<T>
where
    T: MeshTransport + ?Sized + 'static,
{
    /// Advertise the wearable app and start following the handheld.
    pub async fn start(transport: Arc<T>, config: CounterpartConfig) -> Self {
        let call_timeout = config.call_timeout();
        if let Err(e) = bounded(call_timeout, transport.advertise(WEAR_APP)).await {
            tracing::warn!("Could not advertise {}: {}", WEAR_APP, e);
        }

        let phone = PresenceTracker::start(
            Arc::clone(&transport),
            NodeFilter::Capability(PHONE_APP),
            call_timeout,
        );
        let liveness = LivenessSender::start(
            Arc::clone(&transport),
            phone.subscribe(),
            config.keep_alive_interval(),
            call_timeout,
        );

        let (request_tx, requests) = mpsc::unbounded_channel();
        let listener = tokio::spawn(listen(transport.subscribe_messages(), request_tx));
        let (local_hr, _) = watch::channel(HeartRate::NONE);

        tracing::info!("Wearable {} started", transport.local_node());
        Self {
            transport,
            config,
            phone,
            liveness,
            listener,
            requests,
            local_hr,
            collection: None,
        }
    }

    /// Start collecting with the sensor and sender named in the configuration.
    pub async fn start_collecting(&mut self) -> Result<(), ClientError> {
        let sensor = sensor::from_config(&self.config);
        let sender: Box<dyn HrSender> = match self.config.sender.kind {
            SenderKind::Mesh => Box::new(ChannelHrSender::new(
                Arc::clone(&self.transport),
                self.phone.subscribe(),
                self.config.call_timeout(),
            )),
            SenderKind::Relay => Box::new(RelayHrSender::new(
                self.config.relay.address.clone(),
                self.config.relay_connect_timeout(),
            )),
        };
        self.start_collecting_with(sensor, sender).await
    }

    /// Start collecting from `sensor` into `sender`.
    ///
    /// # Errors
    ///
    /// [`ClientError::AlreadyCollecting`] if collection runs,
    /// [`ClientError::SenderUnavailable`] if the sender cannot connect, or the
    /// sensor's start error.
    pub async fn start_collecting_with(
        &mut self,
        mut sensor: Box<dyn HeartRateSensor>,
        mut sender: Box<dyn HrSender>,
    ) -> Result<(), ClientError> {
        if self.collection.is_some() {
            return Err(ClientError::AlreadyCollecting);
        }
        if !sender.connect().await {
            return Err(ClientError::SenderUnavailable);
        }
        let readings = match sensor.start().await {
            Ok(readings) => readings,
            Err(e) => {
                sender.disconnect().await;
                return Err(e);
            }
        };

        let call_timeout = self.config.call_timeout();
        if let Err(e) = bounded(call_timeout, self.transport.advertise(WEAR_APP_ACTIVE)).await {
            tracing::warn!("Could not advertise {}: {}", WEAR_APP_ACTIVE, e);
        }

        let pump = tokio::spawn(pump(readings, sender, self.local_hr.clone()));
        self.collection = Some(Collection { sensor, pump });
        tracing::info!("Heart-rate collection started");
        Ok(())
    }

    /// Stop collecting. The sender gets a final `0` before it disconnects.
    pub async fn stop_collecting(&mut self) {
        let Some(mut collection) = self.collection.take() else {
            return;
        };
        collection.sensor.stop().await;
        if let Err(e) = collection.pump.await {
            tracing::error!("Collection pump failed: {}", e);
        }

        let call_timeout = self.config.call_timeout();
        if let Err(e) = bounded(call_timeout, self.transport.withdraw(WEAR_APP_ACTIVE)).await {
            tracing::warn!("Could not withdraw {}: {}", WEAR_APP_ACTIVE, e);
        }
        self.local_hr.send_replace(HeartRate::NONE);
        tracing::info!("Heart-rate collection stopped");
    }

    /// Whether collection runs.
    pub fn is_collecting(&self) -> bool {
        self.collection.is_some()
    }

    /// Re-send the latest reading immediately.
    pub async fn flush(&mut self) {
        if let Some(collection) = self.collection.as_mut() {
            collection.sensor.flush().await;
        }
    }

    /// The heart rate shown on the wearable.
    pub fn heart_rate(&self) -> watch::Receiver<HeartRate> {
        self.local_hr.subscribe()
    }

    /// The paired handheld, if present.
    pub fn phone_node(&self) -> Option<NodeId> {
        self.phone.current()
    }

    /// Subscribe to handheld presence.
    pub fn phone(&self) -> watch::Receiver<Option<NodeId>> {
        self.phone.subscribe()
    }

    /// Wait for the next request from the handheld.
    pub async fn next_request(&mut self) -> Option<RemoteRequest> {
        self.requests.recv().await
    }

    /// Drain requests that already arrived.
    pub fn take_requests(&mut self) -> Vec<RemoteRequest> {
        let mut taken = Vec::new();
        while let Ok(request) = self.requests.try_recv() {
            taken.push(request);
        }
        taken
    }

    /// Stop collection and every background task, then withdraw the app.
    pub async fn shutdown(mut self) {
        self.stop_collecting().await;
        self.liveness.shutdown().await;
        self.phone.shutdown().await;
        self.listener.abort();
        let _ = self.listener.await;

        let call_timeout = self.config.call_timeout();
        if let Err(e) = bounded(call_timeout, self.transport.withdraw(WEAR_APP)).await {
            tracing::warn!("Could not withdraw {}: {}", WEAR_APP, e);
        }
        tracing::info!("Wearable {} stopped", self.transport.local_node());
    }
}

/// Forward sensor readings to the sender until the sensor stops.
async fn pump(
    mut readings: mpsc::Receiver<HeartRate>,
    mut sender: Box<dyn HrSender>,
    local_hr: watch::Sender<HeartRate>,
) {
    while let Some(reading) = readings.recv().await {
        local_hr.send_replace(reading);
        sender.send_value(reading).await;
    }
    sender.send_value(HeartRate::NONE).await;
    sender.disconnect().await;
}

async fn listen(mut messages: Subscription<MessageEvent>, requests: mpsc::UnboundedSender<RemoteRequest>) {
    while let Some(message) = messages.recv().await {
        let request = match message.decode() {
            Ok(ControlMessage::LaunchRemoteApp) => RemoteRequest::Launch {
                from: message.source,
            },
            Ok(ControlMessage::Ping) => RemoteRequest::EnsureRunning {
                from: message.source,
            },
            Ok(ControlMessage::WearStatus(_)) => continue,
            Err(e) => {
                tracing::debug!("Ignoring message from {}: {}", message.source, e);
                continue;
            }
        };
        tracing::info!("Remote request: {:?}", request);
        if requests.send(request).is_err() {
            break;
        }
    }
}
