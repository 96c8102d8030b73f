//! JSON text for list and map literals.
//!
//! Stored JSON literals must compare equal across writers, so the text form
//! escapes `/` as `\/` and every non-ASCII character as lowercase `\uXXXX`
//! (surrogate pairs above the BMP). Map keys keep insertion order.

use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;

use super::Value;

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Text(s) | Value::Expr(s) => serializer.serialize_str(s),
            Value::List(items) => serializer.collect_seq(items),
            Value::Map(map) => serializer.collect_map(map.iter()),
        }
    }
}

/// Compact output with `/` and non-ASCII escaped.
struct EscapingFormatter;

impl Formatter for EscapingFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch != '/' && ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            if ch == '/' {
                writer.write_all(b"\\/")?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

impl Value {
    /// Encode as JSON text, escaped for storage as a literal.
    pub fn encode_json(&self) -> String {
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, EscapingFormatter);
        match self.serialize(&mut serializer) {
            // Output is pure ASCII.
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_encode_json_escapes_slash_and_non_ascii() {
        let value = Value::List(vec!["a/b".into(), "é".into(), "😀".into()]);
        assert_eq!(value.encode_json(), r#"["a\/b","\u00e9","\ud83d\ude00"]"#);
    }

    #[test]
    fn test_encode_json_keeps_key_order() {
        let value = Value::Map(params! { "z" => 1, "a/" => Value::Null, "m" => vec![true] });
        assert_eq!(value.encode_json(), r#"{"z":1,"a\/":null,"m":[true]}"#);
    }

    #[test]
    fn test_encode_json_keeps_ascii_escapes() {
        let value = Value::List(vec!["say \"hi\"\n".into()]);
        assert_eq!(value.encode_json(), r#"["say \"hi\"\n"]"#);
    }
}
