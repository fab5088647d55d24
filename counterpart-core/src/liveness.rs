//! Liveness tracking for the remote application.
//!
//! The remote periodically signals that it is alive. The tracker considers it
//! active from an `Alive` signal until either an `Inactive` signal arrives or
//! no further `Alive` arrives within the timeout.
//!
//! Timers are identified by generation: every signal bumps the generation, so
//! a timer armed before the latest signal is recognised as stale when it fires.

use std::time::Duration;

use counterpart_types::LivenessSignal;

/// Default interval between keep-alive signals.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Default multiplier applied to the keep-alive interval to get the timeout.
pub const DEFAULT_TIMEOUT_MULTIPLIER: u32 = 2;

/// Whether the remote application is believed to be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LivenessState {
    /// Nothing heard yet.
    #[default]
    Unknown,
    /// An alive signal arrived within the timeout.
    Active,
    /// Explicitly inactive or timed out.
    Inactive,
}

impl LivenessState {
    /// Check if the remote is considered alive.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Timer instructions produced by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// (Re)arm the timeout, replacing any earlier one.
    Arm {
        /// Generation to report back when the timer fires.
        generation: u64,
        /// Delay before firing.
        after: Duration,
    },
    /// Cancel any pending timeout.
    Cancel,
}

/// Pure liveness tracker.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    state: LivenessState,
    generation: u64,
    timeout: Duration,
}

impl LivenessTracker {
    /// Create a tracker that times out after `interval * multiplier`.
    pub fn new(interval: Duration, multiplier: u32) -> Self {
        Self {
            state: LivenessState::Unknown,
            generation: 0,
            timeout: interval.saturating_mul(multiplier.max(1)),
        }
    }

    /// Current liveness.
    pub fn state(&self) -> LivenessState {
        self.state
    }

    /// The timeout after which an alive remote is considered inactive.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current timer generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply a signal from the remote.
    pub fn on_signal(&mut self, signal: LivenessSignal) -> TimerAction {
        self.generation = self.generation.wrapping_add(1);
        match signal {
            LivenessSignal::Alive => {
                self.state = LivenessState::Active;
                TimerAction::Arm {
                    generation: self.generation,
                    after: self.timeout,
                }
            }
            LivenessSignal::Inactive => {
                self.state = LivenessState::Inactive;
                TimerAction::Cancel
            }
        }
    }

    /// A timer armed with `generation` fired.
    ///
    /// Returns `true` if this transitioned the remote to inactive.
    pub fn on_timeout(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != LivenessState::Active {
            return false;
        }
        self.state = LivenessState::Inactive;
        true
    }

    /// Forget everything, e.g. when the remote node disappears.
    pub fn reset(&mut self) -> TimerAction {
        self.generation = self.generation.wrapping_add(1);
        self.state = LivenessState::Unknown;
        TimerAction::Cancel
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_TIMEOUT_MULTIPLIER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed(action: TimerAction) -> u64 {
        match action {
            TimerAction::Arm { generation, .. } => generation,
            TimerAction::Cancel => panic!("expected timer to be armed"),
        }
    }

    #[test]
    fn default_timeout_is_twice_interval() {
        let tracker = LivenessTracker::default();
        assert_eq!(tracker.timeout(), Duration::from_secs(30));
        assert_eq!(tracker.state(), LivenessState::Unknown);
    }

    #[test]
    fn alive_becomes_active_and_arms_timer() {
        let mut tracker = LivenessTracker::new(Duration::from_secs(1), 2);
        let action = tracker.on_signal(LivenessSignal::Alive);

        assert!(tracker.state().is_active());
        assert_eq!(
            action,
            TimerAction::Arm {
                generation: tracker.generation(),
                after: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn inactive_is_immediate() {
        let mut tracker = LivenessTracker::default();
        tracker.on_signal(LivenessSignal::Alive);
        let action = tracker.on_signal(LivenessSignal::Inactive);

        assert_eq!(tracker.state(), LivenessState::Inactive);
        assert_eq!(action, TimerAction::Cancel);
    }

    #[test]
    fn timeout_without_alive_goes_inactive() {
        let mut tracker = LivenessTracker::default();
        let generation = armed(tracker.on_signal(LivenessSignal::Alive));

        assert!(tracker.on_timeout(generation));
        assert_eq!(tracker.state(), LivenessState::Inactive);
    }

    #[test]
    fn repeated_alive_supersedes_earlier_timer() {
        let mut tracker = LivenessTracker::default();
        let first = armed(tracker.on_signal(LivenessSignal::Alive));
        let second = armed(tracker.on_signal(LivenessSignal::Alive));

        assert_ne!(first, second);
        assert!(!tracker.on_timeout(first));
        assert!(tracker.state().is_active());

        assert!(tracker.on_timeout(second));
        assert!(!tracker.state().is_active());
    }

    #[test]
    fn timer_after_inactive_is_ignored() {
        let mut tracker = LivenessTracker::default();
        let generation = armed(tracker.on_signal(LivenessSignal::Alive));
        tracker.on_signal(LivenessSignal::Inactive);

        assert!(!tracker.on_timeout(generation));
        assert_eq!(tracker.state(), LivenessState::Inactive);
    }

    #[test]
    fn timeout_fires_only_once() {
        let mut tracker = LivenessTracker::default();
        let generation = armed(tracker.on_signal(LivenessSignal::Alive));

        assert!(tracker.on_timeout(generation));
        assert!(!tracker.on_timeout(generation));
    }

    #[test]
    fn reset_returns_to_unknown() {
        let mut tracker = LivenessTracker::default();
        let generation = armed(tracker.on_signal(LivenessSignal::Alive));

        assert_eq!(tracker.reset(), TimerAction::Cancel);
        assert_eq!(tracker.state(), LivenessState::Unknown);
        assert!(!tracker.on_timeout(generation));
    }

    #[test]
    fn zero_multiplier_is_treated_as_one() {
        let tracker = LivenessTracker::new(Duration::from_secs(5), 0);
        assert_eq!(tracker.timeout(), Duration::from_secs(5));
    }
}
