//! Instruction text parser
//!
//! Compiles the bracket-delimited instruction language into [`ByteCode`]:
//!
//! ```text
//! [ <token> <token> ... ]
//! token := 0x<hex>            ; write literal
//!        | 0x<hex>:<decimal>  ; write literal repeated N times
//!        | r:<decimal>        ; read N words
//!        | f:<decimal>        ; set bus clock / baud rate
//!        | a:0x<hex>          ; address a 7-bit target
//! ```
//!
//! Several bracket groups may follow each other on one line. Nothing outside
//! a bracket pair is accepted. Parsing is all-or-nothing: on error no
//! sequence is produced, so callers never act on half an instruction.

use alloc::vec::Vec;

use crate::bytecode::ByteCode;
use crate::error::{Error, RangeKind, Result, SyntaxKind};

/// Default largest accepted `r:` count
pub const DEFAULT_MAX_READ: u32 = 4096;

/// Largest 7-bit target address
pub const MAX_ADDRESS: u32 = 0x7F;

/// Instruction parser with protocol limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parser {
    word_bits: u8,
    max_read: u32,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Parser for 8-bit words
    pub const fn new() -> Self {
        Self {
            word_bits: 8,
            max_read: DEFAULT_MAX_READ,
        }
    }

    /// Set the protocol word width in bits (1-32)
    pub const fn with_word_bits(mut self, bits: u8) -> Self {
        self.word_bits = bits;
        self
    }

    /// Set the largest accepted read count
    pub const fn with_max_read(mut self, max: u32) -> Self {
        self.max_read = max;
        self
    }

    fn max_value(&self) -> u32 {
        if self.word_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.word_bits) - 1
        }
    }

    /// Compile `text` into a ByteCode sequence
    pub fn parse(&self, text: &str) -> Result<Vec<ByteCode>> {
        let mut codes = Vec::new();
        let mut open: Option<usize> = None;
        let bytes = text.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            match bytes[pos] {
                b'[' => {
                    if open.is_some() {
                        return Err(Error::syntax(pos, SyntaxKind::NestedOpen));
                    }
                    open = Some(pos);
                    codes.push(ByteCode::start());
                    pos += 1;
                }
                b']' => {
                    if open.take().is_none() {
                        return Err(Error::syntax(pos, SyntaxKind::UnmatchedClose));
                    }
                    codes.push(ByteCode::stop());
                    pos += 1;
                }
                c if c.is_ascii_whitespace() => pos += 1,
                _ => {
                    let start = pos;
                    while pos < bytes.len()
                        && !bytes[pos].is_ascii_whitespace()
                        && bytes[pos] != b'['
                        && bytes[pos] != b']'
                    {
                        pos += 1;
                    }
                    if open.is_none() {
                        return Err(Error::syntax(start, SyntaxKind::OutsideBrackets));
                    }
                    codes.push(self.parse_token(&text[start..pos], start)?);
                }
            }
        }

        if let Some(at) = open {
            return Err(Error::syntax(at, SyntaxKind::UnmatchedOpen));
        }
        if codes.is_empty() {
            return Err(Error::syntax(0, SyntaxKind::Empty));
        }

        log::trace!("parsed {} bytecodes from {:?}", codes.len(), text);
        Ok(codes)
    }

    fn parse_token(&self, token: &str, offset: usize) -> Result<ByteCode> {
        if let Some(rest) = strip_prefix_ci(token, "0x") {
            let (literal, repeat) = match rest.split_once(':') {
                Some((literal, repeat)) => (literal, Some(repeat)),
                None => (rest, None),
            };
            let value = self.parse_hex(literal, offset)?;
            let count = match repeat {
                None => 1,
                Some(r) => match r.parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    _ => return Err(Error::syntax(offset, SyntaxKind::InvalidRepeat)),
                },
            };
            return Ok(ByteCode::write_repeated(value, count));
        }

        if let Some(rest) = strip_prefix_ci(token, "r:") {
            if rest.is_empty() {
                return Err(Error::syntax(offset, SyntaxKind::EmptyOperand));
            }
            let count = parse_decimal(rest)
                .ok_or(Error::syntax(offset, SyntaxKind::InvalidReadCount))?;
            if count > self.max_read {
                return Err(Error::Range(RangeKind::ReadCount {
                    count,
                    max: self.max_read,
                }));
            }
            return Ok(ByteCode::read(count));
        }

        if let Some(rest) = strip_prefix_ci(token, "f:") {
            if rest.is_empty() {
                return Err(Error::syntax(offset, SyntaxKind::EmptyOperand));
            }
            return match parse_decimal(rest) {
                Some(0) => Err(Error::Range(RangeKind::Parameter)),
                Some(hz) => Ok(ByteCode::set_clock(hz)),
                None => Err(Error::syntax(offset, SyntaxKind::UnexpectedToken)),
            };
        }

        if let Some(rest) = strip_prefix_ci(token, "a:") {
            let literal = strip_prefix_ci(rest, "0x")
                .ok_or(Error::syntax(offset, SyntaxKind::InvalidHex))?;
            let address = self.parse_hex_unbounded(literal, offset)?;
            if address > MAX_ADDRESS {
                return Err(Error::Range(RangeKind::Value {
                    value: address,
                    bits: 7,
                }));
            }
            return Ok(ByteCode::set_address(address));
        }

        Err(Error::syntax(offset, SyntaxKind::UnexpectedToken))
    }

    fn parse_hex(&self, literal: &str, offset: usize) -> Result<u32> {
        let value = self.parse_hex_unbounded(literal, offset)?;
        if value > self.max_value() {
            return Err(Error::Range(RangeKind::Value {
                value,
                bits: self.word_bits,
            }));
        }
        Ok(value)
    }

    fn parse_hex_unbounded(&self, literal: &str, offset: usize) -> Result<u32> {
        if literal.is_empty() {
            return Err(Error::syntax(offset, SyntaxKind::EmptyOperand));
        }
        if !literal.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::syntax(offset, SyntaxKind::InvalidHex));
        }
        // All digits are valid, so the only failure left is overflow
        u32::from_str_radix(literal, 16).map_err(|_| {
            Error::Range(RangeKind::Value {
                value: u32::MAX,
                bits: self.word_bits,
            })
        })
    }
}

/// Compile `text` with the default 8-bit parser
pub fn parse(text: &str) -> Result<Vec<ByteCode>> {
    Parser::new().parse(text)
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes()) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn parse_decimal(s: &str) -> Option<u32> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{to_canonical, OpKind};
    use alloc::format;
    use alloc::string::String;
    use alloc::vec;
    use proptest::prelude::*;

    #[test]
    fn test_jedec_instruction() {
        let codes = parse("[0x9F r:3]").unwrap();
        assert_eq!(
            codes,
            vec![
                ByteCode::start(),
                ByteCode::write(0x9F),
                ByteCode::read(3),
                ByteCode::stop(),
            ]
        );
    }

    #[test]
    fn test_empty_brackets_are_address_only() {
        assert_eq!(parse("[]").unwrap(), vec![ByteCode::start(), ByteCode::stop()]);
        assert_eq!(parse("  [ ]  ").unwrap().len(), 2);
    }

    #[test]
    fn test_short_literal_and_long_read() {
        let codes = parse("[0x1 r:255]").unwrap();
        assert_eq!(codes[1], ByteCode::write(0x01));
        assert_eq!(codes[2], ByteCode::read(255));
    }

    #[test]
    fn test_non_hex_literal() {
        let err = parse("[0xZZ r:3]").unwrap_err();
        assert_eq!(err, Error::syntax(1, SyntaxKind::InvalidHex));
    }

    #[test]
    fn test_bracket_errors() {
        assert_eq!(
            parse("[0x01").unwrap_err(),
            Error::syntax(0, SyntaxKind::UnmatchedOpen)
        );
        assert_eq!(
            parse("0x01]").unwrap_err(),
            Error::syntax(0, SyntaxKind::OutsideBrackets)
        );
        assert_eq!(
            parse("[0x01]]").unwrap_err(),
            Error::syntax(6, SyntaxKind::UnmatchedClose)
        );
        assert_eq!(
            parse("[[0x01]]").unwrap_err(),
            Error::syntax(1, SyntaxKind::NestedOpen)
        );
        assert_eq!(parse("   ").unwrap_err(), Error::syntax(0, SyntaxKind::Empty));
    }

    #[test]
    fn test_operand_errors() {
        assert_eq!(
            parse("[0x]").unwrap_err(),
            Error::syntax(1, SyntaxKind::EmptyOperand)
        );
        assert_eq!(
            parse("[r:]").unwrap_err(),
            Error::syntax(1, SyntaxKind::EmptyOperand)
        );
        assert_eq!(
            parse("[r:x3]").unwrap_err(),
            Error::syntax(1, SyntaxKind::InvalidReadCount)
        );
        assert_eq!(
            parse("[0x10:0]").unwrap_err(),
            Error::syntax(1, SyntaxKind::InvalidRepeat)
        );
        assert_eq!(
            parse("[hello]").unwrap_err(),
            Error::syntax(1, SyntaxKind::UnexpectedToken)
        );
    }

    #[test]
    fn test_range_errors() {
        assert_eq!(
            parse("[0x100]").unwrap_err(),
            Error::Range(RangeKind::Value { value: 0x100, bits: 8 })
        );
        assert!(Parser::new().with_word_bits(16).parse("[0x100]").is_ok());
        assert_eq!(
            parse("[r:5000]").unwrap_err(),
            Error::Range(RangeKind::ReadCount { count: 5000, max: DEFAULT_MAX_READ })
        );
        assert!(matches!(
            parse("[0x1FFFFFFFFF]").unwrap_err(),
            Error::Range(RangeKind::Value { .. })
        ));
        assert_eq!(
            parse("[a:0x80]").unwrap_err(),
            Error::Range(RangeKind::Value { value: 0x80, bits: 7 })
        );
    }

    #[test]
    fn test_extension_tokens() {
        let codes = parse("[a:0x50 f:400000 0xAA:3 R:0]").unwrap();
        assert_eq!(codes[1], ByteCode::set_address(0x50));
        assert_eq!(codes[2], ByteCode::set_clock(400_000));
        assert_eq!(codes[3], ByteCode::write_repeated(0xAA, 3));
        assert_eq!(codes[4].kind(), OpKind::ReadCount);
        assert_eq!(codes[4].count(), 0);
    }

    #[test]
    fn test_multiple_groups() {
        let codes = parse("[0xA0 0x00][0xA1 r:2]").unwrap();
        assert_eq!(codes.len(), 8);
        assert_eq!(codes[3], ByteCode::stop());
        assert_eq!(codes[4], ByteCode::start());
        assert_eq!(to_canonical(&codes), "[0xA0 0x00] [0xA1 r:2]");
    }

    fn token() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u32..=0xFF).prop_map(|v| format!("0x{:x}", v)),
            (0u32..=0xFF, 1u32..16).prop_map(|(v, n)| format!("0X{:X}:{}", v, n)),
            (0u32..=DEFAULT_MAX_READ).prop_map(|n| format!("r:{}", n)),
            (1u32..=1_000_000).prop_map(|hz| format!("f:{}", hz)),
            (0u32..=0x7F).prop_map(|a| format!("a:0x{:x}", a)),
        ]
    }

    fn group() -> impl Strategy<Value = String> {
        (proptest::collection::vec(token(), 0..8), "[ \t]{0,2}")
            .prop_map(|(tokens, pad)| format!("[{}{}{}]", pad, tokens.join("  "), pad))
    }

    proptest! {
        #[test]
        fn prop_canonical_form_is_idempotent(groups in proptest::collection::vec(group(), 1..4)) {
            let text = groups.concat();
            let codes = parse(&text).unwrap();
            let canonical = to_canonical(&codes);
            let reparsed = parse(&canonical).unwrap();
            prop_assert_eq!(&reparsed, &codes);
            prop_assert_eq!(to_canonical(&reparsed), canonical);
        }
    }
}
