use std::fmt::Display;

use chrono::{DateTime, TimeZone};

/// Turns a received line into terminal-safe text.
///
/// NUL padding around the line is dropped (the beacon terminates each payload
/// with one), other control characters are escaped.
pub fn printable(line: &[u8]) -> String {
    let start = line.iter().position(|&b| b != 0).unwrap_or(line.len());
    let end = line.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);
    let text = String::from_utf8_lossy(&line[start..end]);

    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() && c != '\t' {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn stamp<Tz: TimeZone>(time: &DateTime<Tz>, text: &str) -> String
where
    Tz::Offset: Display,
{
    format!("[{}] {text}", time.format("%H:%M:%S"))
}

/// Prepares a typed message for the wire, `None` if there is nothing to send.
pub fn outgoing(message: &str) -> Option<String> {
    let message = message.trim();
    if message.is_empty() {
        return None;
    }
    Some(format!("{message}\n"))
}
