//! Operator-facing console output.
//!
//! All CLI-surface printing goes through an [`Output`] handle (as opposed to
//! diagnostic logging, which goes through the `log` facade). The handle can
//! target stdout or an in-memory buffer, which keeps rendering testable.

use std::io::IsTerminal;
use std::sync::Arc;

use anstyle::{AnsiColor, Style};
use parking_lot::Mutex;

/// Named colors used by the CLI output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Yellow,
    Green,
    Red,
    Cyan,
    Grey,
    White,
}

impl Color {
    fn style(self) -> Style {
        let color = match self {
            Self::Yellow => AnsiColor::Yellow,
            Self::Green => AnsiColor::Green,
            Self::Red => AnsiColor::Red,
            Self::Cyan => AnsiColor::Cyan,
            Self::Grey => AnsiColor::BrightBlack,
            Self::White => AnsiColor::White,
        };
        Style::new().fg_color(Some(color.into()))
    }
}

/// Console symbols, kept to the handful the CLI actually prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Pointer,
    Star,
    Bullet,
}

impl Symbol {
    fn glyph(self) -> &'static str {
        match self {
            Self::Pointer => "\u{276f}", // ❯
            Self::Star => "*",
            Self::Bullet => "\u{2022}", // •
        }
    }
}

#[derive(Clone)]
enum Target {
    Stdout,
    Buffer(Arc<Mutex<String>>),
}

/// Side-effecting console writer handed to commands and the registry.
#[derive(Clone)]
pub struct Output {
    target: Target,
    color: bool,
}

impl Output {
    /// An output handle writing to stdout, with colors only when stdout is
    /// a terminal.
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            target: Target::Stdout,
            color: std::io::stdout().is_terminal(),
        }
    }

    /// A capturing output handle for tests. Colors are disabled so captured
    /// text stays free of escape codes.
    #[must_use]
    pub fn buffer() -> Self {
        Self {
            target: Target::Buffer(Arc::new(Mutex::new(String::new()))),
            color: false,
        }
    }

    /// Everything written so far, when this handle targets a buffer.
    #[must_use]
    pub fn captured(&self) -> String {
        match &self.target {
            Target::Stdout => String::new(),
            Target::Buffer(buf) => buf.lock().clone(),
        }
    }

    /// Write one line.
    pub fn log(&self, line: &str) {
        match &self.target {
            Target::Stdout => println!("{line}"),
            Target::Buffer(buf) => {
                let mut buf = buf.lock();
                buf.push_str(line);
                buf.push('\n');
            }
        }
    }

    pub fn blank(&self) {
        self.log("");
    }

    /// Horizontal divider line.
    pub fn div(&self) {
        let line = "\u{2500}".repeat(60);
        self.log(&self.color(&line, Color::Grey));
    }

    /// A starred line, the standard shape for status messages.
    pub fn star(&self, message: &str) {
        self.log(&format!("  {} {}", self.symbol(Symbol::Star, Color::Yellow), message));
    }

    /// A pointed header line.
    pub fn chevron(&self, message: &str, color: Color) {
        self.log(&format!(
            " {} {}",
            self.symbol(Symbol::Pointer, color),
            self.bold(message)
        ));
    }

    /// Print a multi-line greeting block, padded with blank lines.
    pub fn greet(&self, greeting: &str) {
        self.blank();
        for line in greeting.lines() {
            self.log(line);
        }
        self.blank();
    }

    /// Wrap `text` in the given color when colors are enabled.
    #[must_use]
    pub fn color(&self, text: &str, color: Color) -> String {
        self.render(text, color.style())
    }

    #[must_use]
    pub fn bold(&self, text: &str) -> String {
        self.render(text, Style::new().bold())
    }

    /// A colored symbol glyph.
    #[must_use]
    pub fn symbol(&self, symbol: Symbol, color: Color) -> String {
        self.color(symbol.glyph(), color)
    }

    /// Indent every line of `text` by `level` spaces.
    #[must_use]
    pub fn indent(text: &str, level: usize) -> String {
        let pad = " ".repeat(level);
        text.lines()
            .map(|line| format!("{pad}{line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render(&self, text: &str, style: Style) -> String {
        if self.color {
            format!("{style}{text}{style:#}")
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_captures_lines() {
        let out = Output::buffer();
        out.log("first");
        out.star("second");
        out.blank();
        assert_eq!(out.captured(), "first\n  * second\n\n");
    }

    #[test]
    fn test_buffer_disables_color() {
        let out = Output::buffer();
        assert_eq!(out.color("plain", Color::Red), "plain");
        assert_eq!(out.bold("plain"), "plain");
    }

    #[test]
    fn test_indent_multiline() {
        let indented = Output::indent("a\nb", 2);
        assert_eq!(indented, "  a\n  b");
    }
}
