//! Argument quoting for remote command execution.
//!
//! Strings passed to a shell through a session must survive both a native
//! command shell and the Meterpreter console. Wrapping in double quotes works
//! for both, except for a bare drive root like `C:\`, where the trailing
//! backslash would escape the closing quote.

use std::sync::LazyLock;

use regex::Regex;

static DRIVE_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^:]+:\\$").expect("drive root pattern is valid"));

/// Quote `input` for use as a single command-line argument.
#[must_use]
pub fn safe_string(input: &str) -> String {
    if DRIVE_ROOT.is_match(input) {
        return input.to_owned();
    }
    format!("\"{input}\"")
}

#[cfg(test)]
#[path = "quote_test.rs"]
mod tests;
