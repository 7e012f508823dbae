//! ANSI color for diagnostic output.
//!
//! Diagnostics go to stderr with plain SGR escapes; rtmcc does no terminal
//! detection and leaves redirection concerns to the caller.

const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Cyan,
}

impl Color {
    fn sgr(self) -> u8 {
        match self {
            Color::Red => 31,
            Color::Green => 32,
            Color::Yellow => 33,
            Color::Blue => 34,
            Color::Cyan => 36,
        }
    }
}

/// Colors `text`, resetting at the end.
pub fn paint(color: Color, text: &str) -> String {
    format!("\x1b[{}m{}{}", color.sgr(), text, RESET)
}

/// Bold colored `text` as one combined SGR sequence.
pub fn bold(color: Color, text: &str) -> String {
    format!("\x1b[1;{}m{}{}", color.sgr(), text, RESET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_wraps_and_resets() {
        let s = paint(Color::Red, "bad");
        assert!(s.starts_with("\x1b[31m"));
        assert!(s.contains("bad"));
        assert!(s.ends_with("\x1b[0m"));
    }

    #[test]
    fn bold_emits_one_combined_sequence() {
        let s = bold(Color::Yellow, "warning");
        assert!(s.starts_with("\x1b[1;33m"));
        assert!(s.ends_with("\x1b[0m"));
    }

    #[test]
    fn colors_map_to_distinct_codes() {
        let codes: Vec<u8> = [
            Color::Red,
            Color::Green,
            Color::Yellow,
            Color::Blue,
            Color::Cyan,
        ]
        .iter()
        .map(|c| c.sgr())
        .collect();
        let mut deduped = codes.clone();
        deduped.dedup();
        assert_eq!(codes, deduped);
        assert_eq!(codes[0], 31);
    }
}
