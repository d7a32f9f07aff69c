//! Bitbang SPI helpers
//!
//! Backends that drive SPI through software-controlled GPIO lines implement
//! [`BitbangSpi`] and get full-duplex mode 0 transfers from [`transfer_byte`].
//! Backends with a hardware SPI engine implement
//! [`SpiBus`](super::spi::SpiBus) directly instead.

/// Low-level line control for a bitbanged SPI controller
pub trait BitbangSpi {
    /// Set chip select (CS is active low, so `active=true` means CS=0)
    fn set_cs(&mut self, active: bool);

    /// Set clock line value
    fn set_sck(&mut self, high: bool);

    /// Set MOSI line value
    fn set_mosi(&mut self, high: bool);

    /// Get MISO line value
    fn get_miso(&self) -> bool;

    /// Delay for half a clock period
    fn half_period_delay(&self);

    /// Optional: Set SCK and MOSI atomically
    ///
    /// Default implementation calls `set_sck` then `set_mosi`.
    fn set_sck_set_mosi(&mut self, sck: bool, mosi: bool) {
        self.set_sck(sck);
        self.set_mosi(mosi);
    }

    /// Optional: Set SCK and get MISO atomically
    ///
    /// Default implementation calls `set_sck` then `get_miso`.
    fn set_sck_get_miso(&mut self, sck: bool) -> bool {
        self.set_sck(sck);
        self.get_miso()
    }
}

/// Exchange one byte in mode 0 (MSB first)
///
/// MOSI changes while SCK is low and MISO is sampled on the rising edge.
pub fn transfer_byte<M: BitbangSpi + ?Sized>(master: &mut M, byte: u8) -> u8 {
    let mut received = 0u8;
    for i in (0..8).rev() {
        let bit = (byte >> i) & 1 != 0;
        master.set_sck_set_mosi(false, bit);
        master.half_period_delay();
        received <<= 1;
        if master.set_sck_get_miso(true) {
            received |= 1;
        }
        master.half_period_delay();
    }
    master.set_sck(false);
    received
}

/// Half clock period in nanoseconds for a target frequency
///
/// Returns `None` for a zero frequency.
pub const fn half_period_ns(hz: u32) -> Option<u64> {
    if hz == 0 {
        return None;
    }
    Some(500_000_000 / hz as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MISO echoes what was on MOSI at the previous rising edge
    struct Loopback {
        sck: bool,
        mosi: bool,
        miso: bool,
        edges: usize,
    }

    impl BitbangSpi for Loopback {
        fn set_cs(&mut self, _active: bool) {}

        fn set_sck(&mut self, high: bool) {
            if high && !self.sck {
                self.edges += 1;
                self.miso = self.mosi;
            }
            self.sck = high;
        }

        fn set_mosi(&mut self, high: bool) {
            self.mosi = high;
        }

        fn get_miso(&self) -> bool {
            self.miso
        }

        fn half_period_delay(&self) {}
    }

    #[test]
    fn test_transfer_loopback() {
        let mut lines = Loopback {
            sck: false,
            mosi: false,
            miso: false,
            edges: 0,
        };
        assert_eq!(transfer_byte(&mut lines, 0xA5), 0xA5);
        assert_eq!(lines.edges, 8);
        assert!(!lines.sck);
    }

    #[test]
    fn test_half_period() {
        assert_eq!(half_period_ns(0), None);
        assert_eq!(half_period_ns(1_000_000), Some(500));
    }
}
