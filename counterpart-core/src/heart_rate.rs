//! Heart-rate value with a freshness window.
//!
//! A nonzero reading stays visible for the TTL after it was set, then reverts
//! to "no reading" exactly once. Setting a new value restarts the window.

use std::time::Duration;

use counterpart_types::HeartRate;

/// Default time a reading stays visible without being refreshed.
pub const DEFAULT_HEART_RATE_TTL: Duration = Duration::from_secs(10);

/// Expiry instructions produced by [`HeartRateValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    /// Schedule expiry of the reading with this generation.
    Schedule {
        /// Generation to report back on expiry.
        generation: u64,
        /// Delay before expiry.
        after: Duration,
    },
    /// No expiry pending.
    Clear,
}

/// The exposed heart-rate value and its expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct HeartRateValue {
    current: HeartRate,
    generation: u64,
    ttl: Duration,
}

impl HeartRateValue {
    /// Create an empty value with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            current: HeartRate::NONE,
            generation: 0,
            ttl,
        }
    }

    /// The current reading.
    pub fn current(&self) -> HeartRate {
        self.current
    }

    /// The TTL applied to nonzero readings.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Set a new reading.
    pub fn set(&mut self, value: HeartRate) -> ExpiryAction {
        self.generation = self.generation.wrapping_add(1);
        self.current = value;
        if value.is_none() {
            ExpiryAction::Clear
        } else {
            ExpiryAction::Schedule {
                generation: self.generation,
                after: self.ttl,
            }
        }
    }

    /// Reset to "no reading".
    pub fn reset(&mut self) -> ExpiryAction {
        self.set(HeartRate::NONE)
    }

    /// An expiry scheduled with `generation` elapsed.
    ///
    /// Returns `true` if the value changed.
    pub fn on_expired(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.current.is_none() {
            return false;
        }
        self.current = HeartRate::NONE;
        true
    }
}

impl Default for HeartRateValue {
    fn default() -> Self {
        Self::new(DEFAULT_HEART_RATE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let value = HeartRateValue::default();
        assert!(value.current().is_none());
        assert_eq!(value.ttl(), Duration::from_secs(10));
    }

    #[test]
    fn nonzero_reading_schedules_expiry() {
        let mut value = HeartRateValue::new(Duration::from_secs(3));
        let action = value.set(HeartRate::from_bpm(72));

        assert_eq!(value.current().bpm(), 72);
        assert!(matches!(
            action,
            ExpiryAction::Schedule { after, .. } if after == Duration::from_secs(3)
        ));
    }

    #[test]
    fn zero_reading_clears_expiry() {
        let mut value = HeartRateValue::default();
        value.set(HeartRate::from_bpm(72));
        assert_eq!(value.set(HeartRate::NONE), ExpiryAction::Clear);
    }

    #[test]
    fn expiry_reverts_exactly_once() {
        let mut value = HeartRateValue::default();
        let ExpiryAction::Schedule { generation, .. } = value.set(HeartRate::from_bpm(80)) else {
            panic!("expected schedule");
        };

        assert!(value.on_expired(generation));
        assert!(value.current().is_none());
        assert!(!value.on_expired(generation));
    }

    #[test]
    fn newer_reading_outlives_old_expiry() {
        let mut value = HeartRateValue::default();
        let ExpiryAction::Schedule { generation: old, .. } = value.set(HeartRate::from_bpm(80)) else {
            panic!("expected schedule");
        };
        value.set(HeartRate::from_bpm(81));

        assert!(!value.on_expired(old));
        assert_eq!(value.current().bpm(), 81);
    }

    #[test]
    fn reset_invalidates_pending_expiry() {
        let mut value = HeartRateValue::default();
        let ExpiryAction::Schedule { generation, .. } = value.set(HeartRate::from_bpm(80)) else {
            panic!("expected schedule");
        };

        assert_eq!(value.reset(), ExpiryAction::Clear);
        assert!(!value.on_expired(generation));
    }
}
