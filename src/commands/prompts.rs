//! Pin and parameter prompts
//!
//! Asks for every pin the protocol binds, then its clock or line
//! parameters. Each answer is checked on the spot; a protected or
//! out-of-range pin, or a parameter outside the protocol limits, is
//! reported and asked again. An empty answer takes the value shown in
//! brackets.

use std::fmt::Display;
use std::io::Write;

use busprobe_core::bus::Protocol;
use busprobe_core::config::{
    BusConfiguration, BusParams, ConfigSource, Defaults, Parity, UartParams,
};
use busprobe_core::error::{Error, RangeKind, Result};
use busprobe_core::pins::{Pin, PinMap, PinPolicy};
use busprobe_core::settings::parse_frequency;
use busprobe_repl::{Input, LineSource};

/// [`ConfigSource`] backed by the user
pub struct Prompter<'a, L, W> {
    input: &'a mut L,
    out: &'a mut W,
    defaults: &'a Defaults,
}

impl<'a, L: LineSource, W: Write> Prompter<'a, L, W> {
    /// Prompt on `input`, reporting rejected answers on `out`
    pub fn new(input: &'a mut L, out: &'a mut W, defaults: &'a Defaults) -> Self {
        Self {
            input,
            out,
            defaults,
        }
    }

    /// Ask until `parse` accepts the answer
    ///
    /// Errors that call for a new answer are shown and the question
    /// repeats; anything else is returned.
    fn ask<T, F>(&mut self, question: &str, default: T, mut parse: F) -> Result<T>
    where
        T: Display,
        F: FnMut(&str) -> Result<T>,
    {
        let prompt = format!("{} [{}]: ", question, default);
        loop {
            let answer = match self.input.read_line(&prompt) {
                Ok(Input::Line(line)) => line,
                Ok(Input::Interrupted) | Ok(Input::Eof) => {
                    log::info!("Configuration cancelled");
                    return Err(Error::Settings);
                }
                Err(e) => {
                    log::warn!("Reading answer failed: {}", e);
                    return Err(Error::Settings);
                }
            };
            let answer = answer.trim();
            let result = if answer.is_empty() {
                parse(&default.to_string())
            } else {
                parse(answer)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.should_reprompt() => {
                    // Output errors must not end the prompt loop
                    let _ = writeln!(self.out, "{}", e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn ask_params(&mut self, params: BusParams) -> Result<BusParams> {
        let checked = |p: BusParams| p.validate().map(|()| p);
        match params {
            BusParams::Spi { frequency } => {
                let frequency = self.ask("SPI frequency (Hz)", frequency, |s| {
                    let frequency = parse_frequency(s).ok_or(Error::Range(RangeKind::Parameter))?;
                    checked(BusParams::Spi { frequency }).map(|_| frequency)
                })?;
                Ok(BusParams::Spi { frequency })
            }
            BusParams::I2c { frequency } => {
                let frequency = self.ask("I2C frequency (Hz)", frequency, |s| {
                    let frequency = parse_frequency(s).ok_or(Error::Range(RangeKind::Parameter))?;
                    checked(BusParams::I2c { frequency }).map(|_| frequency)
                })?;
                Ok(BusParams::I2c { frequency })
            }
            BusParams::Uart(mut uart) | BusParams::HdUart(mut uart) => {
                let wrap = |u| match params {
                    BusParams::HdUart(_) => BusParams::HdUart(u),
                    _ => BusParams::Uart(u),
                };
                uart.baud = self.ask("Baud rate", uart.baud, |s| {
                    let baud = number(s)?;
                    checked(wrap(UartParams { baud, ..uart })).map(|_| baud)
                })?;
                uart.data_bits = self.ask("Data bits (5-8)", uart.data_bits, |s| {
                    let data_bits = u8::try_from(number(s)?)
                        .map_err(|_| Error::Range(RangeKind::Parameter))?;
                    checked(wrap(UartParams { data_bits, ..uart }))
                        .map(|_| data_bits)
                })?;
                let parity = self.ask("Parity (N/E/O)", uart.parity.letter(), |s| {
                    let mut chars = s.chars();
                    match (chars.next().and_then(Parity::from_letter), chars.next()) {
                        (Some(parity), None) => Ok(parity.letter()),
                        _ => Err(Error::Range(RangeKind::Parameter)),
                    }
                })?;
                uart.parity = Parity::from_letter(parity).unwrap_or_default();
                uart.stop_bits = self.ask("Stop bits (1-2)", uart.stop_bits, |s| {
                    let stop_bits = u8::try_from(number(s)?)
                        .map_err(|_| Error::Range(RangeKind::Parameter))?;
                    checked(wrap(UartParams { stop_bits, ..uart }))
                        .map(|_| stop_bits)
                })?;
                Ok(wrap(uart))
            }
            BusParams::OneWire => Ok(BusParams::OneWire),
        }
    }
}

/// Parse a decimal or `0x` hexadecimal number
fn number(s: &str) -> Result<u32> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| Error::Range(RangeKind::Parameter))
}

impl<L: LineSource, W: Write> ConfigSource for Prompter<'_, L, W> {
    fn configure(
        &mut self,
        protocol: Protocol,
        current: Option<&BusConfiguration>,
        policy: &PinPolicy,
    ) -> Result<BusConfiguration> {
        let base = current
            .or_else(|| self.defaults.get(protocol))
            .cloned()
            .unwrap_or_else(|| BusConfiguration::new(PinMap::new(), BusParams::default_for(protocol)));

        let _ = writeln!(self.out, "Configure {}:", protocol);
        let mut pins = PinMap::new();
        for &role in protocol.pin_roles() {
            let default = base.pin(role).unwrap_or(0);
            let pin = self.ask(&format!("{} pin", role), default, |s| {
                let value = number(s)?;
                let pin = Pin::try_from(value).map_err(|_| {
                    Error::Range(RangeKind::Pin {
                        pin: Pin::MAX,
                        max: policy.max_pin(),
                    })
                })?;
                policy.validate(pin)?;
                if pins.iter().any(|(_, used)| used == pin) {
                    // Same pin twice
                    return Err(Error::Range(RangeKind::Parameter));
                }
                Ok(pin)
            })?;
            pins.set(role, pin);
        }

        let params = self.ask_params(base.params)?;
        Ok(BusConfiguration::new(pins, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busprobe_core::device::S3_DEVKIT;
    use busprobe_core::pins::{PinRole, ProtectedPins};
    use busprobe_repl::ScriptedInput;

    fn configure(
        profile: &busprobe_core::device::DeviceProfile,
        protocol: Protocol,
        answers: &[&str],
    ) -> (Result<BusConfiguration>, String) {
        let mut input = ScriptedInput::new(answers.iter().copied());
        let mut out = Vec::new();
        let defaults = profile.defaults();
        let result = Prompter::new(&mut input, &mut out, &defaults).configure(
            protocol,
            None,
            &profile.pin_policy(),
        );
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_defaults_accepted_with_empty_answers() {
        let (result, _) = configure(&S3_DEVKIT, Protocol::I2c, &["", "", ""]);
        assert_eq!(result.unwrap(), S3_DEVKIT.defaults().get(Protocol::I2c).cloned().unwrap());
    }

    #[test]
    fn test_every_protected_pin_is_rejected() {
        for pin in S3_DEVKIT.pin_policy().protected().iter() {
            let (result, out) = configure(&S3_DEVKIT, Protocol::OneWire, &[&pin.to_string(), "5"]);
            assert_eq!(result.unwrap().pin(PinRole::Data), Some(5));
            assert!(out.contains(&format!("pin {} is reserved/protected", pin)));
        }
    }

    #[test]
    fn test_protected_default_is_not_taken_silently() {
        let mut defaults = Defaults::new();
        defaults.set(BusConfiguration::new(
            PinMap::from_pairs(&[(PinRole::Data, 19)]),
            BusParams::OneWire,
        ));
        let policy = PinPolicy::new(48, ProtectedPins::from_slice(&[19]));
        let mut input = ScriptedInput::new(["", "5"]);
        let mut out = Vec::new();
        let config = Prompter::new(&mut input, &mut out, &defaults)
            .configure(Protocol::OneWire, None, &policy)
            .unwrap();
        assert_eq!(config.pin(PinRole::Data), Some(5));
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("pin 19 is reserved/protected"));
    }

    #[test]
    fn test_duplicate_and_garbage_pins() {
        let (result, out) = configure(&S3_DEVKIT, Protocol::Uart, &[
            "17", "17", "pin", "18", "", "", "", "",
        ]);
        let config = result.unwrap();
        assert_eq!(config.pin(PinRole::Rx), Some(18));
        assert_eq!(out.matches("bus parameter out of range").count(), 2);
    }

    #[test]
    fn test_uart_parameters() {
        let (result, out) = configure(&S3_DEVKIT, Protocol::HdUart, &[
            "", "9600", "9", "7", "x", "e", "2",
        ]);
        assert_eq!(
            result.unwrap().params,
            BusParams::HdUart(UartParams {
                baud: 9600,
                data_bits: 7,
                parity: Parity::Even,
                stop_bits: 2,
                ..UartParams::default()
            })
        );
        assert_eq!(out.matches("bus parameter out of range").count(), 2);
    }

    #[test]
    fn test_out_of_range_frequency_reprompts() {
        let (result, _) = configure(&S3_DEVKIT, Protocol::Spi, &[
            "", "", "", "", "100 MHz", "20MHz",
        ]);
        assert_eq!(
            result.unwrap().params,
            BusParams::Spi {
                frequency: 20_000_000
            }
        );
    }

    #[test]
    fn test_end_of_input_cancels() {
        let (result, _) = configure(&S3_DEVKIT, Protocol::Spi, &["11"]);
        assert_eq!(result, Err(Error::Settings));
    }
}
