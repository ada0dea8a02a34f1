//! Severity colors and glyphs shared by the grid and the listing.

use ratatui::style::{Color, Modifier, Style};

use crate::matcher::Severity;

pub const OK: Color = Color::Green;
pub const CAUTION: Color = Color::Yellow;
pub const ALERT: Color = Color::Red;
pub const EMPTY: Color = Color::DarkGray;
pub const BORDER: Color = Color::Rgb(170, 170, 180);

pub const EMPTY_GLYPH: &str = "·";
pub const MISS: &str = "MISS";

pub fn severity_color(s: Severity) -> Color {
    match s {
        Severity::Ok => OK,
        Severity::Warning => CAUTION,
        Severity::Error | Severity::Missing => ALERT,
    }
}

pub fn severity_symbol(s: Severity) -> &'static str {
    match s {
        Severity::Ok => "✔",
        Severity::Warning => "▲",
        Severity::Error => "✖",
        Severity::Missing => "?",
    }
}

pub fn severity_style(s: Severity) -> Style {
    let style = Style::default().fg(severity_color(s));
    if s >= Severity::Error {
        style.add_modifier(Modifier::BOLD)
    } else {
        style
    }
}

/// crossterm equivalent for plain line output.
pub fn term_color(s: Severity) -> crossterm::style::Color {
    match s {
        Severity::Ok => crossterm::style::Color::Green,
        Severity::Warning => crossterm::style::Color::Yellow,
        Severity::Error | Severity::Missing => crossterm::style::Color::Red,
    }
}
