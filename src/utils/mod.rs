//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - PATH lookup for external tools
//! - `io` - File I/O with consistent error handling
//! - `shell` - Shell quoting for logged command lines
//! - `validation` - Input validation helpers

pub mod command;
pub mod io;
pub mod shell;
pub mod validation;
