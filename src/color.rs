//! ANSI color helpers for console output.

use std::io::IsTerminal;

/// Foreground colors used for labels and statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Color {
    /// No decoration.
    #[default]
    Default,
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    /// Colors handed out to successive log streams.
    const ROTATION: [Color; 6] = [
        Color::Cyan,
        Color::Yellow,
        Color::Green,
        Color::Magenta,
        Color::Blue,
        Color::Red,
    ];

    /// Pick a color for the `index`-th item, cycling through six colors.
    pub fn from_index(index: usize) -> Self {
        Self::ROTATION[index % Self::ROTATION.len()]
    }

    fn code(self) -> Option<u8> {
        match self {
            Color::Default => None,
            Color::Black => Some(30),
            Color::Red => Some(31),
            Color::Green => Some(32),
            Color::Yellow => Some(33),
            Color::Blue => Some(34),
            Color::Magenta => Some(35),
            Color::Cyan => Some(36),
            Color::White => Some(37),
        }
    }

    /// Wrap `text` in this color's escape sequence.
    pub fn paint(self, text: &str) -> String {
        match self.code() {
            Some(_) if text.is_empty() => String::new(),
            Some(code) => format!("\u{1b}[{}m{}\u{1b}[39m", code, text),
            None => text.to_string(),
        }
    }
}

/// Whether stderr output should be colored.
///
/// Honors `NO_COLOR` (https://no-color.org/), then falls back to whether
/// stderr is a terminal.
pub fn color_enabled_stderr() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint() {
        let table = [
            (Color::Black, 30),
            (Color::Red, 31),
            (Color::Green, 32),
            (Color::Yellow, 33),
            (Color::Blue, 34),
            (Color::Magenta, 35),
            (Color::Cyan, 36),
            (Color::White, 37),
        ];
        for (color, code) in table {
            assert_eq!(color.paint("Message"), format!("\u{1b}[{}mMessage\u{1b}[39m", code));
            assert_eq!(color.paint(""), "");
        }
        assert_eq!(Color::Default.paint("Message"), "Message");
    }

    #[test]
    fn test_from_index_cycles() {
        let expected = [
            Color::Cyan,
            Color::Yellow,
            Color::Green,
            Color::Magenta,
            Color::Blue,
            Color::Red,
        ];
        for (index, color) in expected.iter().enumerate() {
            assert_eq!(Color::from_index(index), *color);
            assert_eq!(Color::from_index(index + 6), *color);
        }
    }
}
