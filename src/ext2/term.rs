//! Terminal reporting helpers.
//!
//! Colours are dropped when the corresponding stream is not a terminal.

use std::fmt;

/// ANSI escape: red foreground.
pub const ANSI_RED: &str = "\x1b[31m";
/// ANSI escape: green foreground.
pub const ANSI_GREEN: &str = "\x1b[32m";
/// ANSI escape: yellow foreground.
pub const ANSI_YELLOW: &str = "\x1b[33m";
/// ANSI escape: reset attributes.
pub const ANSI_RESET: &str = "\x1b[0m";
/// ANSI escape: move the cursor home and clear the screen.
pub const ANSI_CLEAR: &str = "\x1b[1;1H\x1b[2J";

/// Tells whether stdout is a terminal.
pub fn stdout_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDOUT_FILENO) == 1 }
}

/// Tells whether stderr is a terminal.
pub fn stderr_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDERR_FILENO) == 1 }
}

/// Prints an informational message to stdout.
pub fn log<M: fmt::Display>(msg: M) {
    if stdout_is_tty() {
        println!("{ANSI_GREEN}log{ANSI_RESET}: {msg}");
    } else {
        println!("log: {msg}");
    }
}

/// Prints a warning to stderr. Warnings do not interrupt the operation that
/// raised them.
pub fn warn<M: fmt::Display>(msg: M) {
    if stderr_is_tty() {
        eprintln!("{ANSI_YELLOW}warning{ANSI_RESET}: {msg}");
    } else {
        eprintln!("warning: {msg}");
    }
}

/// Prints an error to stderr.
pub fn report<M: fmt::Display>(msg: M) {
    if stderr_is_tty() {
        eprintln!("{ANSI_RED}error{ANSI_RESET}: {msg}");
    } else {
        eprintln!("error: {msg}");
    }
}
