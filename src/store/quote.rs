//! Literal rendering for values embedded in statement text.
//!
//! Statements are executed with bound parameters; these functions define how
//! the same statement reads when every parameter is written out as a literal.
//! That rendering is what gets logged, and it must stay safe to paste into a
//! MySQL client: text is single-quoted with backslash escapes for `\`, `'`
//! and `"`, numbers are left bare, and `NULL` is the null literal.
//!
//! Everything here is pure.

use super::{Dialect, Value};

/// The store's null literal.
pub const NULL_LITERAL: &str = "NULL";

/// Escape backslashes, single quotes and double quotes with a backslash.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escape and wrap text in single quotes.
pub fn quote_text(text: &str) -> String {
    format!("'{}'", escape(text))
}

/// Render a value as a literal.
pub fn quote(value: &Value) -> String {
    match value {
        Value::Null => NULL_LITERAL.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Float(f) if f.is_finite() => format_float(*f),
        // NaN and infinities have no bare numeric form
        Value::Float(f) => quote_text(&f.to_string()),
        Value::Text(_) | Value::Date(_) | Value::DateTime(_) | Value::Time(_) => {
            quote_text(&value.to_string())
        }
        Value::Bytes(b) => format!("X'{}'", hex::encode_upper(b)),
    }
}

/// Quote an identifier (table or column name) for the given dialect.
///
/// The dialect's quote character is doubled when it appears in the name.
pub fn quote_identifier(dialect: Dialect, name: &str) -> String {
    let q = dialect.identifier_quote();
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push(q);
    for c in name.chars() {
        if c == q {
            quoted.push(q);
        }
        quoted.push(c);
    }
    quoted.push(q);
    quoted
}

fn format_float(f: f64) -> String {
    // `Display` for f64 is the shortest string that parses back to the same
    // value, but it prints whole numbers without a fractional part.
    let s = f.to_string();
    if s.contains(['.', 'e', 'E']) {
        s
    } else {
        format!("{s}.0")
    }
}
