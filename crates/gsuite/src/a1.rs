//! A1 notation helpers

use std::sync::LazyLock;

use regex::Regex;

/// `Sheet!A1:B2`. Named ranges and open-ended ranges do not match.
static A1_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s!]+![A-Z]+\d+:[A-Z]+\d+$").expect("A1 pattern is a valid regex")
});

pub fn is_a1_range(s: &str) -> bool {
    A1_RANGE.is_match(s)
}

/// Spreadsheet column letters for a 1-based column number (27 → `AA`).
/// Zero and negative numbers give an empty string.
pub fn column_name(mut column: i64) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}
