//! Per-protocol help

use std::io::{self, Write};

use busprobe_core::bus::Protocol;
use busprobe_core::command::{self, Verb};
use busprobe_core::device::DeviceProfile;

/// Write the verbs usable in `protocol` and the instruction syntax
pub fn print(out: &mut dyn Write, protocol: Protocol, profile: &DeviceProfile) -> io::Result<()> {
    writeln!(out, "{} commands:", protocol)?;
    for verb in Verb::for_protocol(protocol) {
        match verb.unavailable_reason(protocol, profile) {
            Some(reason) => writeln!(out, "  {:<8} ({})", verb.name(), reason)?,
            None => writeln!(out, "  {:<8} {}", verb.name(), verb.summary())?,
        }
    }
    writeln!(out)?;
    writeln!(out, "Instructions:")?;
    writeln!(out, "  [ ]       start / stop condition")?;
    writeln!(out, "  0xNN      write a byte (0xNN:4 writes it four times)")?;
    writeln!(out, "  r:N       read N bytes")?;
    if protocol == Protocol::I2c {
        writeln!(out, "  a:0xNN    7-bit address byte")?;
    }
    writeln!(out, "  f:N       set the bus clock to N Hz")?;
    writeln!(out)?;
    writeln!(out, "Example: {}", command::example(protocol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use busprobe_core::device::{M5STICK, S3_DEVKIT};

    fn help(protocol: Protocol, profile: &DeviceProfile) -> String {
        let mut out = Vec::new();
        print(&mut out, protocol, profile).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_spi_help() {
        let text = help(Protocol::Spi, &S3_DEVKIT);
        assert!(text.starts_with("SPI commands:\n"));
        assert!(text.contains("  sniff    Passively log SPI traffic"));
        assert!(!text.contains("bridge"));
        assert!(text.ends_with("Example: [0x9F r:3]\n"));
    }

    #[test]
    fn test_unavailable_verbs_are_marked() {
        let text = help(Protocol::Spi, &M5STICK);
        assert!(text.contains("  slave    (not supported on this device due to shared SPI bus)"));
        assert!(text.contains("  sdcard   (this device has no SD card support)"));
    }

    #[test]
    fn test_uart_help() {
        let text = help(Protocol::Uart, &S3_DEVKIT);
        assert!(text.contains("  bridge   Interactive UART bridge"));
        assert!(!text.contains("a:0xNN"));
    }
}
