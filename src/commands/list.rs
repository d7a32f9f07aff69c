//! List commands implementation

use crate::backends;
use busprobe_core::bus::Protocol;
use busprobe_core::device::{Peripherals, PROFILES};

/// List all device profiles
pub fn list_devices() {
    println!("Device profiles (first is the default):");
    println!();
    println!("{:<12} {:<26} {:>6}  Protocols", "Name", "Description", "Pins");
    println!("{}", "-".repeat(72));

    for profile in PROFILES {
        let mut protocols: Vec<&str> = Protocol::ALL
            .iter()
            .filter(|p| profile.supports(**p))
            .map(|p| p.name())
            .collect();
        if profile.peripherals.contains(Peripherals::SPI_FOLLOWER) {
            protocols.push("sniff");
        }
        if profile.peripherals.contains(Peripherals::SD_CARD) {
            protocols.push("sdcard");
        }
        println!(
            "{:<12} {:<26} {:>6}  {}",
            profile.name,
            profile.description,
            format!("0-{}", profile.max_pin),
            protocols.join(", ")
        );
        let protected: Vec<String> = profile.protected.iter().map(|p| p.to_string()).collect();
        println!("{:<12} protected: {}", "", protected.join(" "));
    }
}

/// List the backends compiled into this binary
pub fn list_backends() {
    println!("Available backends:");
    println!();
    for backend in backends::available_backends() {
        let aliases = if backend.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", backend.aliases.join(", "))
        };
        println!("  {:<11} - {}{}", backend.name, backend.description, aliases);
    }
}
