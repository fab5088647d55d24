//! Capability names advertised on the device mesh.
//!
//! A capability is a named boolean fact a node advertises. Counterpart uses
//! one per installed app and one that is only present while the wearable is
//! actively collecting.

use std::fmt;

/// A capability name as advertised/queried on the mesh.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability(&'static str);

/// Advertised by a handheld with the Counterpart app installed.
pub const PHONE_APP: Capability = Capability("counterpart_phone_capability");

/// Advertised by a wearable with the Counterpart app installed.
pub const WEAR_APP: Capability = Capability("counterpart_wear_capability");

/// Advertised by a wearable only while heart-rate collection is running.
pub const WEAR_APP_ACTIVE: Capability = Capability("counterpart_wear_active_capability");

impl Capability {
    /// The advertised token.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names_are_distinct() {
        assert_ne!(PHONE_APP, WEAR_APP);
        assert_ne!(WEAR_APP, WEAR_APP_ACTIVE);
        assert_ne!(PHONE_APP.name(), WEAR_APP_ACTIVE.name());
    }

    #[test]
    fn display_is_the_token() {
        assert_eq!(WEAR_APP.to_string(), "counterpart_wear_capability");
    }
}
