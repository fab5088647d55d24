//! Liveness monitor.
//!
//! The wearable runs a [`LivenessSender`] that tells the paired handheld it is
//! alive on a fixed interval. The handheld runs a [`LivenessMonitor`] that
//! turns those signals (or the active capability) into a [`LivenessState`].
//!
//! The monitor only listens to the selected wearable. Losing that wearable, or
//! switching to a node other than the one last heard from, forgets the state.

use std::sync::Arc;
use std::time::Duration;

use counterpart_core::{LivenessState, LivenessTracker, TimerAction};
use counterpart_types::{ControlMessage, LivenessSignal, MessageEvent, NodeId, WEAR_APP_ACTIVE};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::LivenessSource;
use crate::presence::{PresenceTracker, WearableSelection};
use crate::timer;
use crate::transport::{bounded, MeshTransport, NodeFilter, Subscription};

/// Shortest keep-alive interval the sender will tick at.
pub const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(1);

/// Periodically sends `alive` to the selected node.
pub struct LivenessSender {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl LivenessSender {
    /// Start sending to whichever node `presence` selects.
    ///
    /// The first `alive` goes out as soon as a node appears. Intervals below
    /// [`MIN_KEEP_ALIVE_INTERVAL`] are raised to it.
    pub fn start<T>(
        transport: Arc<T>,
        mut presence: watch::Receiver<Option<NodeId>>,
        interval: Duration,
        call_timeout: Duration,
    ) -> Self
    where
        T: MeshTransport + ?Sized + 'static,
    {
        let (stop, mut stopped) = oneshot::channel::<()>();
        if interval < MIN_KEEP_ALIVE_INTERVAL {
            tracing::warn!(
                "Keep-alive interval {:?} too short, using {:?}",
                interval,
                MIN_KEEP_ALIVE_INTERVAL
            );
        }
        let interval = interval.max(MIN_KEEP_ALIVE_INTERVAL);

        let task = tokio::spawn(async move {
            let mut target = presence.borrow_and_update().clone();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut presence_open = true;
            tracing::info!("Liveness sender started (interval: {:?})", interval);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    changed = presence.changed(), if presence_open => {
                        if changed.is_err() {
                            presence_open = false;
                            continue;
                        }
                        let node = presence.borrow_and_update().clone();
                        if node != target {
                            target = node;
                            if target.is_some() {
                                ticker.reset_immediately();
                            }
                        }
                    }
                    _ = ticker.tick(), if target.is_some() => {
                        if let Some(node) = &target {
                            send_signal(&*transport, node, LivenessSignal::Alive, call_timeout).await;
                        }
                    }
                }
            }

            if let Some(node) = &target {
                send_signal(&*transport, node, LivenessSignal::Inactive, call_timeout).await;
            }
            tracing::info!("Liveness sender stopped");
        });

        Self { stop, task }
    }

    /// Stop sending; a final `inactive` goes out best-effort.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}

async fn send_signal<T>(transport: &T, node: &NodeId, signal: LivenessSignal, call_timeout: Duration)
where
    T: MeshTransport + ?Sized,
{
    let message = ControlMessage::WearStatus(signal);
    let payload = message.payload();
    match bounded(call_timeout, transport.send_message(node, message.path(), &payload)).await {
        Ok(_) => tracing::debug!("Sent {} to {}", signal.token(), node),
        Err(e) => tracing::warn!("Sending {} to {} failed: {}", signal.token(), node, e),
    }
}

/// Tracks whether the remote app is running.
pub struct LivenessMonitor {
    state: watch::Receiver<LivenessState>,
    task: JoinHandle<()>,
    tracker: Option<PresenceTracker>,
}

impl LivenessMonitor {
    /// Start a monitor reading from `source`.
    pub fn start<T>(
        transport: Arc<T>,
        source: LivenessSource,
        wearable: WearableSelection,
        interval: Duration,
        multiplier: u32,
        call_timeout: Duration,
    ) -> Self
    where
        T: MeshTransport + ?Sized + 'static,
    {
        match source {
            LivenessSource::Messages => {
                Self::from_messages(transport, wearable, interval, multiplier)
            }
            LivenessSource::Capability => Self::from_capability(transport, call_timeout),
        }
    }

    /// Active from each `alive` sent by `wearable` until `inactive` or
    /// `interval * multiplier` without another `alive`.
    ///
    /// While no wearable is selected, signals from any node are accepted.
    pub fn from_messages<T>(
        transport: Arc<T>,
        wearable: WearableSelection,
        interval: Duration,
        multiplier: u32,
    ) -> Self
    where
        T: MeshTransport + ?Sized + 'static,
    {
        let messages = transport.subscribe_messages();
        let (tx, state) = watch::channel(LivenessState::Unknown);
        let tracker = LivenessTracker::new(interval, multiplier);
        let task = tokio::spawn(watch_messages(tracker, messages, wearable, tx));
        Self {
            state,
            task,
            tracker: None,
        }
    }

    /// Active while some node advertises the active capability.
    pub fn from_capability<T>(transport: Arc<T>, call_timeout: Duration) -> Self
    where
        T: MeshTransport + ?Sized + 'static,
    {
        let tracker = PresenceTracker::start(
            transport,
            NodeFilter::Capability(WEAR_APP_ACTIVE),
            call_timeout,
        );
        let mut active_node = tracker.subscribe();
        let (tx, state) = watch::channel(LivenessState::Unknown);

        let task = tokio::spawn(async move {
            while active_node.changed().await.is_ok() {
                let active = active_node.borrow_and_update().is_some();
                publish(
                    &tx,
                    if active {
                        LivenessState::Active
                    } else {
                        LivenessState::Inactive
                    },
                );
            }
        });

        Self {
            state,
            task,
            tracker: Some(tracker),
        }
    }

    /// Subscribe to liveness changes.
    pub fn state(&self) -> watch::Receiver<LivenessState> {
        self.state.clone()
    }

    /// Current liveness.
    pub fn current(&self) -> LivenessState {
        *self.state.borrow()
    }

    /// Stop monitoring.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
        if let Some(tracker) = self.tracker {
            tracker.shutdown().await;
        }
    }
}

/// The single owner of the staleness deadline. Re-arming and firing happen in
/// this one task, so a reset can never race a firing timer.
async fn watch_messages(
    tracker: LivenessTracker,
    mut messages: Subscription<MessageEvent>,
    mut wearable: WearableSelection,
    tx: watch::Sender<LivenessState>,
) {
    let mut liveness = MessageLiveness {
        tracker,
        deadline: None,
        selected: wearable.current(),
        heard_from: None,
        tx,
    };
    let mut wearable_open = true;

    loop {
        let at = liveness.deadline.map(|(_, at)| at);
        tokio::select! {
            message = messages.recv() => {
                let Some(message) = message else {
                    break;
                };
                liveness.select(wearable.current());
                liveness.on_message(message);
            }
            changed = wearable.changed(), if wearable_open => {
                if changed {
                    liveness.select(wearable.current());
                } else {
                    wearable_open = false;
                }
            }
            () = timer::sleep_until(at) => liveness.on_deadline(),
        }
    }
}

struct MessageLiveness {
    tracker: LivenessTracker,
    deadline: Option<(u64, Instant)>,
    selected: Option<NodeId>,
    heard_from: Option<NodeId>,
    tx: watch::Sender<LivenessState>,
}

impl MessageLiveness {
    fn select(&mut self, next: Option<NodeId>) {
        if next == self.selected {
            return;
        }
        // Going from nothing to the node already heard from keeps the state.
        let stale = match (&next, &self.heard_from) {
            (None, _) => true,
            (Some(node), Some(source)) => node != source,
            (Some(_), None) => false,
        };
        self.selected = next;
        if stale {
            tracing::debug!("Wearable now {:?}, forgetting liveness", self.selected);
            self.heard_from = None;
            self.deadline = schedule(self.tracker.reset());
            publish(&self.tx, self.tracker.state());
        }
    }

    fn on_message(&mut self, message: MessageEvent) {
        let signal = match message.decode() {
            Ok(ControlMessage::WearStatus(signal)) => signal,
            Ok(_) => return,
            Err(e) => {
                tracing::trace!("Ignoring message from {}: {}", message.source, e);
                return;
            }
        };
        if self.selected.as_ref().is_some_and(|node| *node != message.source) {
            tracing::debug!("Ignoring {} from unselected {}", signal.token(), message.source);
            return;
        }
        tracing::debug!("{} from {}", signal.token(), message.source);
        self.heard_from = Some(message.source);
        self.deadline = schedule(self.tracker.on_signal(signal));
        publish(&self.tx, self.tracker.state());
    }

    fn on_deadline(&mut self) {
        if let Some((generation, _)) = self.deadline.take() {
            if self.tracker.on_timeout(generation) {
                tracing::info!("No alive within {:?}, remote inactive", self.tracker.timeout());
                publish(&self.tx, self.tracker.state());
            }
        }
    }
}

fn schedule(action: TimerAction) -> Option<(u64, Instant)> {
    match action {
        TimerAction::Arm { generation, after } => Some((generation, Instant::now() + after)),
        TimerAction::Cancel => None,
    }
}

fn publish(tx: &watch::Sender<LivenessState>, state: LivenessState) {
    tx.send_if_modified(|current| {
        if *current == state {
            return false;
        }
        tracing::info!("Remote liveness: {:?} -> {:?}", current, state);
        *current = state;
        true
    });
}
