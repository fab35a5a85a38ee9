//! Output formatting helpers.
//!
//! Command results go to stdout; status lines for failed assets go to
//! stderr so piping `search` or `item get` output stays clean.

use std::io::{self, Write};

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a labeled field.
pub fn field(label: &str, value: &str) {
    println!("{}: {}", label.dimmed(), value);
}

/// Print a value as one line of compact JSON.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    write_json(serde_json::to_string(value)?)
}

/// Print a value as pretty-printed JSON.
pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    write_json(serde_json::to_string_pretty(value)?)
}

/// A closed stdout (e.g. `geocat search | head`) is not an error.
fn write_json(line: String) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match writeln!(stdout, "{line}") {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => std::process::exit(0),
        other => Ok(other?),
    }
}
