//! Pin numbers, roles and the protected pin policy

use core::fmt;

use crate::error::{Error, RangeKind, Result};

/// A GPIO number on the probing device
pub type Pin = u8;

/// Maximum number of pins a single bus binds
pub const MAX_BUS_PINS: usize = 6;

/// Set of pins reserved for system use (buttons, internal flash, USB, ...)
///
/// Fixed per device model at startup and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtectedPins {
    /// One bit per possible [`Pin`] value
    words: [u64; 4],
}

impl ProtectedPins {
    /// An empty set
    pub const fn none() -> Self {
        Self { words: [0; 4] }
    }

    /// Build the set from a list of pins
    pub const fn from_slice(pins: &[Pin]) -> Self {
        let mut words = [0u64; 4];
        let mut i = 0;
        while i < pins.len() {
            let pin = pins[i] as usize;
            words[pin / 64] |= 1 << (pin % 64);
            i += 1;
        }
        Self { words }
    }

    /// Returns true if `pin` is reserved
    pub const fn contains(&self, pin: Pin) -> bool {
        let pin = pin as usize;
        self.words[pin / 64] & (1 << (pin % 64)) != 0
    }

    /// Iterate over the reserved pins in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Pin> + '_ {
        (0..=Pin::MAX).filter(move |&p| self.contains(p))
    }
}

/// Device pin range plus protected set; every pin request goes through here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinPolicy {
    max_pin: Pin,
    protected: ProtectedPins,
}

impl PinPolicy {
    /// Create a policy for pins `0..=max_pin`
    pub const fn new(max_pin: Pin, protected: ProtectedPins) -> Self {
        Self { max_pin, protected }
    }

    /// Highest usable pin number
    pub const fn max_pin(&self) -> Pin {
        self.max_pin
    }

    /// The reserved pins
    pub const fn protected(&self) -> &ProtectedPins {
        &self.protected
    }

    /// Check that `pin` exists and is not reserved
    pub fn validate(&self, pin: Pin) -> Result<Pin> {
        if pin > self.max_pin {
            return Err(Error::Range(RangeKind::Pin {
                pin,
                max: self.max_pin,
            }));
        }
        if self.protected.contains(pin) {
            return Err(Error::PinConflict { pin });
        }
        Ok(pin)
    }
}

/// Function a pin serves on a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    /// SPI controller-out / follower-in
    Mosi,
    /// SPI controller-in / follower-out
    Miso,
    /// SPI clock
    Sclk,
    /// SPI chip select
    Cs,
    /// I2C data
    Sda,
    /// I2C clock
    Scl,
    /// UART transmit
    Tx,
    /// UART receive
    Rx,
    /// Single shared data line (1-Wire, half-duplex UART)
    Data,
}

impl PinRole {
    /// Label used in prompts and logs
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Mosi => "MOSI",
            Self::Miso => "MISO",
            Self::Sclk => "SCLK",
            Self::Cs => "CS",
            Self::Sda => "SDA",
            Self::Scl => "SCL",
            Self::Tx => "TX",
            Self::Rx => "RX",
            Self::Data => "DATA",
        }
    }
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pins bound by one bus configuration, in binding order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PinMap {
    entries: heapless::Vec<(PinRole, Pin), MAX_BUS_PINS>,
}

impl PinMap {
    /// An empty map
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    /// Build a map from `(role, pin)` pairs; later duplicates of a role win
    pub fn from_pairs(pairs: &[(PinRole, Pin)]) -> Self {
        let mut map = Self::new();
        for &(role, pin) in pairs {
            map.set(role, pin);
        }
        map
    }

    /// Pin bound to `role`, if any
    pub fn get(&self, role: PinRole) -> Option<Pin> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|&(_, pin)| pin)
    }

    /// Bind `role` to `pin`, replacing any previous binding
    ///
    /// Returns false if the map is full.
    pub fn set(&mut self, role: PinRole, pin: Pin) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(r, _)| *r == role) {
            entry.1 = pin;
            return true;
        }
        self.entries.push((role, pin)).is_ok()
    }

    /// Remove the binding for `role`
    pub fn remove(&mut self, role: PinRole) {
        self.entries.retain(|(r, _)| *r != role);
    }

    /// Iterate over `(role, pin)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (PinRole, Pin)> + '_ {
        self.entries.iter().copied()
    }

    /// Number of bound pins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no pin is bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for PinMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (role, pin)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", role, pin)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    #[test]
    fn test_protected_set() {
        let set = ProtectedPins::from_slice(&[0, 19, 20, 70, 255]);
        assert!(set.contains(19));
        assert!(!set.contains(21));
        assert!(set.contains(70));
        assert!(!set.contains(71));
        assert_eq!(set.iter().collect::<Vec<_>>(), [0, 19, 20, 70, 255]);
    }

    #[test]
    fn test_high_protected_pin_is_rejected() {
        let policy = PinPolicy::new(80, ProtectedPins::from_slice(&[65]));
        assert_eq!(policy.validate(65), Err(Error::PinConflict { pin: 65 }));
        assert_eq!(policy.validate(64), Ok(64));
    }

    #[test]
    fn test_policy() {
        let policy = PinPolicy::new(48, ProtectedPins::from_slice(&[26, 27]));
        assert_eq!(policy.validate(11), Ok(11));
        assert_eq!(policy.validate(26), Err(Error::PinConflict { pin: 26 }));
        assert_eq!(
            policy.validate(49),
            Err(Error::Range(RangeKind::Pin { pin: 49, max: 48 }))
        );
    }

    #[test]
    fn test_pin_map_replace_and_display() {
        let mut map = PinMap::from_pairs(&[(PinRole::Mosi, 11), (PinRole::Miso, 13)]);
        assert!(map.set(PinRole::Mosi, 35));
        assert_eq!(map.get(PinRole::Mosi), Some(35));
        assert_eq!(map.len(), 2);
        map.remove(PinRole::Miso);
        assert_eq!(map.get(PinRole::Miso), None);
        assert_eq!(map.to_string(), "MOSI=35");
    }
}
