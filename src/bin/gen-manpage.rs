//! Man page generator for busprobe
//!
//! Writes `busprobe.1` plus one `busprobe-<subcommand>.1` page per
//! subcommand.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(cmd: clap::Command, dir: &Path, file: &str) -> std::io::Result<PathBuf> {
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;
    let path = dir.join(file);
    fs::write(&path, buffer)?;
    Ok(path)
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("man"), PathBuf::from);
    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    let mut pages = vec![render(cmd.clone(), &output_dir, "busprobe.1")?];
    for sub in cmd.get_subcommands() {
        let file = format!("busprobe-{}.1", sub.get_name());
        pages.push(render(sub.clone(), &output_dir, &file)?);
    }

    for page in &pages {
        println!("Generated {}", page.display());
    }
    println!("\nTo view: man -l {}", pages[0].display());
    Ok(())
}
