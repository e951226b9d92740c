//! Python string-literal emission.
//!
//! Every non-ASCII code point is escaped (`\xNN`, `\uNNNN`, `\UNNNNNNNN`) so
//! the output file is pure ASCII regardless of source encoding. A surrogate
//! pair in the source arrives here as a single scalar value and is emitted
//! as one `\U` escape.

use std::fmt::Write;

/// Render a string as a double-quoted Python literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' '..='~' => out.push(c),
            c if (c as u32) < 0x100 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if (c as u32) <= 0xffff => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => {
                let _ = write!(out, "\\U{:08x}", c as u32);
            }
        }
    }
    out.push('"');
    out
}
