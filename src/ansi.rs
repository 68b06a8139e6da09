//! ANSI escape handling for captured tool output.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

fn ansi_regex() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").ok())
        .as_ref()
}

/// Remove color and style escape sequences.
#[must_use]
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    match ansi_regex() {
        Some(re) => re.replace_all(text, ""),
        None => Cow::Borrowed(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;31mError\x1b[0m: x"), "Error: x");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
