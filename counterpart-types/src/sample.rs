//! Heart-rate sample encoding for the data channel.
//!
//! One sample is one byte. `0` is reserved to mean "no reading" (sensor off
//! or session ended), so a literal BPM of zero cannot be expressed.

use std::fmt;

/// A heart-rate value as carried on the data channel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HeartRate(u8);

/// Interpretation of a received sample byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// No active reading: the sensor stopped or the session ended.
    NoReading,
    /// A live reading in beats per minute.
    Bpm(u8),
}

impl HeartRate {
    /// The "no reading" sentinel.
    pub const NONE: HeartRate = HeartRate(0);

    /// Encode a BPM value, clamping it into `0..=255`.
    pub fn from_bpm(bpm: i32) -> Self {
        Self(bpm.clamp(0, u8::MAX as i32) as u8)
    }

    /// Wrap a raw wire byte.
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// The wire byte.
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// The value as BPM, where 0 means no reading.
    pub fn bpm(self) -> u8 {
        self.0
    }

    /// Whether this is the "no reading" sentinel.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Interpret the value.
    pub fn reading(self) -> Reading {
        match self.0 {
            0 => Reading::NoReading,
            bpm => Reading::Bpm(bpm),
        }
    }
}

impl From<u8> for HeartRate {
    fn from(byte: u8) -> Self {
        Self(byte)
    }
}

impl fmt::Display for HeartRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reading() {
            Reading::NoReading => f.write_str("--"),
            Reading::Bpm(bpm) => write!(f, "{} bpm", bpm),
        }
    }
}

impl fmt::Debug for HeartRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeartRate({})", self.0)
    }
}
