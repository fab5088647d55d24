//! Session manager.
//!
//! Runs the pure [`Session`] machine from counterpart-core against a
//! [`MeshTransport`]. One actor task owns the machine, the channel writer and
//! the read loop, and interprets the machine's actions as transport I/O.
//!
//! ```text
//! presence ─┐
//! channel events ─┤
//! open results ─┼─▶ SessionActor ─▶ Session::on_event ─▶ actions ─▶ transport
//! read-loop end ─┤
//! commands ─┘
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use counterpart_core::{Session, SessionAction, SessionEvent, SessionRole, SessionState};
use counterpart_types::{Channel, ChannelEvent, HeartRate, NodeId, HR_CHANNEL_PATH};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::heart_rate::HeartRateFeed;
use crate::transport::{
    bounded, ChannelInput, ChannelOutput, MeshTransport, Subscription, TransportError,
};

enum Command {
    Write(HeartRate),
    Shutdown,
}

/// Handle to a running session actor.
pub struct SessionManager {
    role: SessionRole,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionManager {
    /// Start a session.
    ///
    /// `presence` supplies the selected remote node. A consumer pushes the
    /// samples it reads into `feed`.
    pub fn start<T>(
        transport: Arc<T>,
        role: SessionRole,
        presence: watch::Receiver<Option<NodeId>>,
        feed: Option<HeartRateFeed>,
        call_timeout: Duration,
    ) -> Self
    where
        T: MeshTransport + ?Sized + 'static,
    {
        // Register before spawning so no channel event is missed.
        let channel_events = transport.register_channel_callback();
        let (state_tx, state) = watch::channel(SessionState::Idle);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            transport,
            session: Session::new(role),
            call_timeout,
            feed,
            writer: None,
            reader: None,
            opens: JoinSet::new(),
            ended_tx,
            state_tx,
        };
        let task = tokio::spawn(actor.run(presence, channel_events, command_rx, ended_rx));

        Self {
            role,
            commands,
            state,
            task,
        }
    }

    /// The session's role.
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Subscribe to session state changes.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// The current session state.
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Queue a sample for the channel. Dropped if no channel is streaming.
    ///
    /// Returns `false` once the session has stopped.
    pub fn write(&self, reading: HeartRate) -> bool {
        self.commands.send(Command::Write(reading)).is_ok()
    }

    /// Close the channel, stop the read loop, unsubscribe and join the actor.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::error!("Session actor failed: {}", e);
            }
        }
    }
}

type OpenResult = (u64, Result<Channel, TransportError>);

struct SessionActor<T: ?Sized> {
    transport: Arc<T>,
    session: Session,
    call_timeout: Duration,
    feed: Option<HeartRateFeed>,
    writer: Option<(Channel, Box<dyn ChannelOutput>)>,
    reader: Option<JoinHandle<()>>,
    opens: JoinSet<OpenResult>,
    ended_tx: mpsc::UnboundedSender<Channel>,
    state_tx: watch::Sender<SessionState>,
}

impl<T> SessionActor<T>
where
    T: MeshTransport + ?Sized + 'static,
{
    async fn run(
        mut self,
        mut presence: watch::Receiver<Option<NodeId>>,
        mut channel_events: Subscription<ChannelEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut ended: mpsc::UnboundedReceiver<Channel>,
    ) {
        tracing::debug!("Session ({:?}) started", self.session.role());
        let initial = presence.borrow_and_update().clone();
        self.handle(SessionEvent::NodeSelected(initial)).await;
        let mut presence_open = true;

        loop {
            tokio::select! {
                changed = presence.changed(), if presence_open => match changed {
                    Ok(()) => {
                        let node = presence.borrow_and_update().clone();
                        self.handle(SessionEvent::NodeSelected(node)).await;
                    }
                    Err(_) => presence_open = false,
                },
                event = channel_events.recv() => match event {
                    Some(ChannelEvent::Opened(channel)) => {
                        tracing::debug!("Remote opened {:?}", channel);
                        self.handle(SessionEvent::RemoteOpened(channel)).await;
                    }
                    Some(ChannelEvent::Closed { channel, reason, app_code }) => {
                        tracing::debug!("{:?} closed: {} (code {})", channel, reason, app_code);
                        self.handle(SessionEvent::ChannelClosed { channel, reason }).await;
                    }
                    None => break,
                },
                Some(joined) = self.opens.join_next(), if !self.opens.is_empty() => {
                    if let Some(event) = open_event(joined) {
                        self.handle(event).await;
                    }
                }
                Some(channel) = ended.recv() => {
                    self.handle(SessionEvent::StreamEnded { channel }).await;
                }
                command = commands.recv() => match command {
                    Some(Command::Write(reading)) => self.write(reading).await,
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        self.handle(SessionEvent::Shutdown).await;
        self.opens.abort_all();
        while let Some(joined) = self.opens.join_next().await {
            if let Ok((_, Ok(channel))) = joined {
                self.close(&channel).await;
            }
        }
        tracing::debug!("Session ({:?}) stopped", self.session.role());
    }

    async fn handle(&mut self, event: SessionEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let role = self.session.role();
            let session = std::mem::replace(&mut self.session, Session::new(role));
            let (session, actions) = session.on_event(event);
            self.session = session;

            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    pending.push_back(follow_up);
                }
            }
        }

        let role = self.session.role();
        let state = self.session.state().clone();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::info!("Session ({:?}): {:?} -> {:?}", role, current, state);
            *current = state;
            true
        });
    }

    /// Perform one action. Returns an event to feed back when the action
    /// failed in a way the machine must hear about.
    async fn execute(&mut self, action: SessionAction) -> Option<SessionEvent> {
        match action {
            SessionAction::OpenChannel { node, attempt } => {
                tracing::info!("Opening heart-rate channel to {}", node);
                let transport = Arc::clone(&self.transport);
                let limit = self.call_timeout;
                self.opens.spawn(async move {
                    let result = bounded(limit, transport.open_channel(&node, HR_CHANNEL_PATH)).await;
                    (attempt, result)
                });
                None
            }
            SessionAction::CloseChannel { channel } => {
                self.close(&channel).await;
                None
            }
            SessionAction::AttachWriter { channel } => {
                match bounded(self.call_timeout, self.transport.output_stream(&channel)).await {
                    Ok(output) => {
                        self.writer = Some((channel, output));
                        None
                    }
                    Err(e) => {
                        tracing::warn!("No output stream for {:?}: {}", channel, e);
                        Some(SessionEvent::StreamEnded { channel })
                    }
                }
            }
            SessionAction::AttachReader { channel } => {
                match bounded(self.call_timeout, self.transport.input_stream(&channel)).await {
                    Ok(input) => {
                        let reader = tokio::spawn(read_loop(
                            input,
                            channel,
                            self.feed.clone(),
                            self.ended_tx.clone(),
                        ));
                        if let Some(previous) = self.reader.replace(reader) {
                            previous.abort();
                        }
                        None
                    }
                    Err(e) => {
                        tracing::warn!("No input stream for {:?}: {}", channel, e);
                        Some(SessionEvent::StreamEnded { channel })
                    }
                }
            }
            SessionAction::ReleaseStreams => {
                self.writer = None;
                if let Some(reader) = self.reader.take() {
                    reader.abort();
                }
                None
            }
            SessionAction::ResetHeartRate => {
                if let Some(feed) = &self.feed {
                    feed.reset();
                }
                None
            }
        }
    }

    async fn write(&mut self, reading: HeartRate) {
        let Some((channel, output)) = self.writer.as_mut() else {
            tracing::trace!("No streaming channel, dropping {}", reading);
            return;
        };
        let result = bounded(self.call_timeout, output.write(&[reading.to_byte()])).await;
        if let Err(e) = result {
            let channel = channel.clone();
            tracing::warn!("Write to {:?} failed: {}", channel, e);
            self.handle(SessionEvent::StreamEnded { channel }).await;
        }
    }

    async fn close(&self, channel: &Channel) {
        if let Err(e) = bounded(self.call_timeout, self.transport.close_channel(channel)).await {
            tracing::warn!("Closing {:?} failed: {}", channel, e);
        }
    }
}

fn open_event(joined: Result<OpenResult, tokio::task::JoinError>) -> Option<SessionEvent> {
    match joined {
        Ok((attempt, Ok(channel))) => Some(SessionEvent::OpenSucceeded { attempt, channel }),
        Ok((attempt, Err(e))) => {
            tracing::warn!("Opening heart-rate channel failed: {}", e);
            Some(SessionEvent::OpenFailed {
                attempt,
                error: e.to_string(),
            })
        }
        Err(e) => {
            if !e.is_cancelled() {
                tracing::error!("Channel open task failed: {}", e);
            }
            None
        }
    }
}

/// Forward every byte read from `input` into the feed until the stream ends.
async fn read_loop(
    mut input: Box<dyn ChannelInput>,
    channel: Channel,
    feed: Option<HeartRateFeed>,
    ended: mpsc::UnboundedSender<Channel>,
) {
    loop {
        match input.read().await {
            Ok(Some(bytes)) => {
                if let Some(feed) = &feed {
                    for byte in bytes {
                        feed.push(HeartRate::from_byte(byte));
                    }
                }
            }
            Ok(None) => {
                tracing::debug!("{:?}: end of stream", channel);
                break;
            }
            Err(e) => {
                tracing::warn!("{:?}: read failed: {}", channel, e);
                break;
            }
        }
    }
    let _ = ended.send(channel);
}
