//! Terminal I/O utilities for CLI.

use std::io::{self, IsTerminal};

use stackops::Error;

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}

/// Human-readable failure on stderr, whether or not it is a terminal.
pub fn report_failure(err: &Error) {
    eprintln!("error: {}", err.message);
    for hint in &err.hints {
        eprintln!("  hint: {}", hint.message);
    }
}
