//! Data-channel session state machine.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of the heart-rate channel. It takes events as input and produces
//! a new session plus a list of actions to execute.
//!
//! The actual I/O (opening channels, reading and writing bytes) is performed
//! by counterpart-client, not by this module.
//!
//! Two roles share the machine:
//! - [`SessionRole::Producer`] (wearable) opens the channel to the selected
//!   node and writes samples into it, reopening after a lost link.
//! - [`SessionRole::Consumer`] (handheld) accepts the channel the remote
//!   opened and reads samples out of it.

use counterpart_types::{Channel, CloseReason, NodeId};

/// Which end of the data channel this session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Opens the channel and writes samples.
    Producer,
    /// Accepts the channel and reads samples.
    Consumer,
}

/// Channel lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No channel and none being opened.
    Idle,
    /// A channel open is in flight.
    Opening {
        /// Node the channel is being opened to.
        node: NodeId,
        /// Identifies this open attempt so stale completions can be discarded.
        attempt: u64,
    },
    /// A channel is open and its stream is attached.
    Streaming {
        /// Remote node.
        node: NodeId,
        /// The open channel.
        channel: Channel,
    },
}

impl SessionState {
    /// The channel currently streaming, if any.
    pub fn channel(&self) -> Option<&Channel> {
        match self {
            Self::Streaming { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Check if a channel is streaming.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    /// Check if an open is in flight.
    pub fn is_opening(&self) -> bool {
        matches!(self, Self::Opening { .. })
    }
}

/// Inputs to the session machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The presence tracker published a (possibly unchanged) selection.
    NodeSelected(Option<NodeId>),
    /// A channel open completed.
    OpenSucceeded {
        /// The attempt that completed.
        attempt: u64,
        /// The opened channel.
        channel: Channel,
    },
    /// A channel open failed or timed out.
    OpenFailed {
        /// The attempt that failed.
        attempt: u64,
        /// Error message describing the failure.
        error: String,
    },
    /// The remote node opened a channel to us.
    RemoteOpened(Channel),
    /// The transport reported a channel closure.
    ChannelClosed {
        /// The channel that closed.
        channel: Channel,
        /// Why it closed.
        reason: CloseReason,
    },
    /// Reading or writing the channel stream ended or failed.
    StreamEnded {
        /// The channel whose stream ended.
        channel: Channel,
    },
    /// The owner is tearing the session down.
    Shutdown,
}

/// Actions to be executed by the session runtime.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open the heart-rate channel to `node`.
    OpenChannel {
        /// Target node.
        node: NodeId,
        /// Attempt number to report back with the result.
        attempt: u64,
    },
    /// Close a channel.
    CloseChannel {
        /// The channel to close.
        channel: Channel,
    },
    /// Acquire the output stream of `channel` for writing samples.
    AttachWriter {
        /// The streaming channel.
        channel: Channel,
    },
    /// Acquire the input stream of `channel` and start the read loop.
    AttachReader {
        /// The streaming channel.
        channel: Channel,
    },
    /// Drop any attached stream handle and stop the read loop.
    ReleaseStreams,
    /// Reset the exposed heart-rate value to "no reading".
    ResetHeartRate,
}

/// The session: role, lifecycle state, and the currently selected node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    role: SessionRole,
    state: SessionState,
    selected: Option<NodeId>,
    next_attempt: u64,
}

impl Session {
    /// Create an idle session for `role`.
    pub fn new(role: SessionRole) -> Self {
        Self {
            role,
            state: SessionState::Idle,
            selected: None,
            next_attempt: 1,
        }
    }

    /// The session's role.
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// The lifecycle state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The last node selection observed.
    pub fn selected(&self) -> Option<&NodeId> {
        self.selected.as_ref()
    }

    /// Process an event and return the new session plus actions to execute.
    ///
    /// This is a pure function - no side effects.
    pub fn on_event(mut self, event: SessionEvent) -> (Self, Vec<SessionAction>) {
        let mut actions = Vec::new();

        match event {
            SessionEvent::NodeSelected(selection) => {
                self.selected = selection.clone();
                match self.role {
                    SessionRole::Producer => self.producer_select(selection, &mut actions),
                    SessionRole::Consumer => self.consumer_select(selection, &mut actions),
                }
            }
            SessionEvent::OpenSucceeded { attempt, channel } => match &self.state {
                SessionState::Opening {
                    node,
                    attempt: current,
                } if *current == attempt && channel.node == *node => {
                    self.state = SessionState::Streaming {
                        node: node.clone(),
                        channel: channel.clone(),
                    };
                    actions.push(SessionAction::AttachWriter { channel });
                }
                // A completion nobody is waiting for any more.
                _ => actions.push(SessionAction::CloseChannel { channel }),
            },
            SessionEvent::OpenFailed { attempt, .. } => {
                if matches!(&self.state, SessionState::Opening { attempt: current, .. } if *current == attempt)
                {
                    self.state = SessionState::Idle;
                }
            }
            SessionEvent::RemoteOpened(channel) => {
                if self.role == SessionRole::Consumer {
                    self.consumer_accept(channel, &mut actions);
                }
            }
            SessionEvent::ChannelClosed { channel, reason } => {
                if self.state.channel() == Some(&channel) {
                    actions.push(SessionAction::ReleaseStreams);
                    match self.role {
                        SessionRole::Producer if reason == CloseReason::Disconnected => {
                            self.reopen(channel.node.clone(), &mut actions);
                        }
                        SessionRole::Producer => self.state = SessionState::Idle,
                        SessionRole::Consumer => {
                            self.state = SessionState::Idle;
                            actions.push(SessionAction::ResetHeartRate);
                        }
                    }
                }
            }
            SessionEvent::StreamEnded { channel } => {
                if self.state.channel() == Some(&channel) {
                    actions.push(SessionAction::ReleaseStreams);
                    actions.push(SessionAction::CloseChannel {
                        channel: channel.clone(),
                    });
                    match self.role {
                        SessionRole::Producer => self.reopen(channel.node.clone(), &mut actions),
                        SessionRole::Consumer => {
                            self.state = SessionState::Idle;
                            actions.push(SessionAction::ResetHeartRate);
                        }
                    }
                }
            }
            SessionEvent::Shutdown => {
                self.teardown(&mut actions);
                if self.role == SessionRole::Consumer {
                    actions.push(SessionAction::ResetHeartRate);
                }
            }
        }

        (self, actions)
    }

    fn producer_select(&mut self, selection: Option<NodeId>, actions: &mut Vec<SessionAction>) {
        let Some(node) = selection else {
            self.teardown(actions);
            return;
        };

        match &self.state {
            SessionState::Idle => self.open(node, actions),
            SessionState::Opening { node: current, .. }
            | SessionState::Streaming { node: current, .. }
                if *current == node => {}
            _ => {
                self.teardown(actions);
                self.open(node, actions);
            }
        }
    }

    fn consumer_select(&mut self, selection: Option<NodeId>, actions: &mut Vec<SessionAction>) {
        let keep = match (&self.state, &selection) {
            (SessionState::Streaming { node, .. }, Some(selected)) => node == selected,
            (SessionState::Streaming { .. }, None) => false,
            _ => true,
        };
        if !keep {
            self.teardown(actions);
            actions.push(SessionAction::ResetHeartRate);
        }
    }

    fn consumer_accept(&mut self, channel: Channel, actions: &mut Vec<SessionAction>) {
        let from_selected = match &self.selected {
            Some(selected) => *selected == channel.node,
            None => true,
        };
        if !channel.is_heart_rate() || !from_selected {
            actions.push(SessionAction::CloseChannel { channel });
            return;
        }

        self.teardown(actions);
        self.state = SessionState::Streaming {
            node: channel.node.clone(),
            channel: channel.clone(),
        };
        actions.push(SessionAction::AttachReader { channel });
    }

    fn open(&mut self, node: NodeId, actions: &mut Vec<SessionAction>) {
        let attempt = self.next_attempt;
        self.next_attempt = self.next_attempt.wrapping_add(1);
        self.state = SessionState::Opening {
            node: node.clone(),
            attempt,
        };
        actions.push(SessionAction::OpenChannel { node, attempt });
    }

    fn reopen(&mut self, node: NodeId, actions: &mut Vec<SessionAction>) {
        self.state = SessionState::Idle;
        self.open(node, actions);
    }

    /// Return to Idle, closing any streaming channel.
    fn teardown(&mut self, actions: &mut Vec<SessionAction>) {
        if let SessionState::Streaming { channel, .. } = &self.state {
            actions.push(SessionAction::ReleaseStreams);
            actions.push(SessionAction::CloseChannel {
                channel: channel.clone(),
            });
        }
        self.state = SessionState::Idle;
    }
}
