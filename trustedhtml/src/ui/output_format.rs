//! Status lines printed to stderr.
//!
//! Colors are applied only when the caller says the stream supports them,
//! so redirected output stays plain.
//!
//! License: MIT OR APACHE 2.0

use owo_colors::OwoColorize;
use std::io::{self, Write};

/// The kinds of status line the CLI prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Warn,
    Error,
}

impl MessageKind {
    fn label(&self) -> &'static str {
        match self {
            MessageKind::Info => "info",
            MessageKind::Warn => "warning",
            MessageKind::Error => "error",
        }
    }
}

pub fn print_message<W: Write>(writer: &mut W, kind: MessageKind, msg: &str, supports_color: bool) -> io::Result<()> {
    let label = kind.label();
    if !supports_color {
        return writeln!(writer, "[trustedhtml] {}: {}", label, msg);
    }
    match kind {
        MessageKind::Info => writeln!(writer, "[trustedhtml] {}: {}", label.cyan(), msg),
        MessageKind::Warn => writeln!(writer, "[trustedhtml] {}: {}", label.yellow().bold(), msg),
        MessageKind::Error => writeln!(writer, "[trustedhtml] {}: {}", label.red().bold(), msg.red()),
    }
}

pub fn print_info_message<W: Write>(writer: &mut W, msg: &str, supports_color: bool) -> io::Result<()> {
    print_message(writer, MessageKind::Info, msg, supports_color)
}

pub fn print_warn_message<W: Write>(writer: &mut W, msg: &str, supports_color: bool) -> io::Result<()> {
    print_message(writer, MessageKind::Warn, msg, supports_color)
}

pub fn print_error_message<W: Write>(writer: &mut W, msg: &str, supports_color: bool) -> io::Result<()> {
    print_message(writer, MessageKind::Error, msg, supports_color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_messages_have_no_escape_codes() {
        let mut out = Vec::new();
        print_error_message(&mut out, "boom", false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[trustedhtml] error: boom\n");
    }

    #[test]
    fn test_colored_messages_contain_escape_codes() {
        let mut out = Vec::new();
        print_warn_message(&mut out, "careful", true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains('\u{1b}'));
        assert!(text.contains("careful"));
    }
}
