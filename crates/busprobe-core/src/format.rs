//! Result formatting
//!
//! Bytes are shown as two-digit uppercase hex pairs separated by single
//! spaces.

use alloc::string::String;
use core::fmt::Write;

use crate::capture::CaptureLine;

/// Bytes per line in [`hex_dump`]
pub const DUMP_WIDTH: usize = 16;

/// `[0x9F, 0x01]` -> `"9F 01"`
pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// A captured packet prefixed with its line tag, e.g. `"[MOSI] 9F 01"`
pub fn tagged(line: CaptureLine, bytes: &[u8]) -> String {
    let mut out = String::from(line.tag());
    out.push_str(&hex_bytes(bytes));
    out
}

/// Addressed dump, [`DUMP_WIDTH`] bytes per line
///
/// ```text
/// 00000000: 00 11 22 33 44 55 66 77 88 99 AA BB CC DD EE FF
/// ```
pub fn hex_dump(base: u32, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(DUMP_WIDTH).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let addr = base.wrapping_add((i * DUMP_WIDTH) as u32);
        let _ = write!(out, "{:08X}: {}", addr, hex_bytes(chunk));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[0x9F, 0x01, 0xab]), "9F 01 AB");
        assert_eq!(hex_bytes(&[]), "");
    }

    #[test]
    fn test_tagged() {
        assert_eq!(tagged(CaptureLine::Miso, &[0xEF, 0x40]), "[MISO] EF 40");
    }

    #[test]
    fn test_hex_dump_lines() {
        let data: alloc::vec::Vec<u8> = (0..18).collect();
        let dump = hex_dump(0x100, &data);
        let lines: alloc::vec::Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000100: 00 01 02"));
        assert_eq!(lines[1], "00000110: 10 11");
    }
}
