// Canonical node value: one byte-sequence type with a single decode entry point.
use std::borrow::Cow;

use bstr::BStr;
use bytes::Bytes;

pub const NO_VALUE: &str = "<no value>";

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Value(Bytes);

impl Value {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decoded text; invalid UTF-8 sequences become U+FFFD.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Escaped byte form, e.g. `"SMITH^M\xff"`.
    pub fn escaped(&self) -> String {
        format!("{:?}", BStr::new(&self.0))
    }

    /// Rendering used by explorers: escaped bytes when `raw` or when the
    /// bytes are not valid UTF-8, plain text otherwise.
    pub fn display(&self, raw: bool) -> String {
        if raw {
            return self.escaped();
        }
        match std::str::from_utf8(&self.0) {
            Ok(text) => text.to_string(),
            Err(_) => self.escaped(),
        }
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

/// Display for an optional value, `<no value>` when absent.
pub fn display_optional(value: Option<&Value>, raw: bool) -> String {
    value
        .map(|value| value.display(raw))
        .unwrap_or_else(|| NO_VALUE.to_string())
}

#[cfg(test)]
mod tests {
    use super::{NO_VALUE, Value, display_optional};

    #[test]
    fn text_and_bytes_normalize_to_same_value() {
        let from_text = Value::from("SMITH,JOHN^M");
        let from_bytes = Value::from(b"SMITH,JOHN^M".to_vec());
        assert_eq!(from_text, from_bytes);
        assert_eq!(from_text.text(), "SMITH,JOHN^M");
    }

    #[test]
    fn raw_display_escapes_bytes() {
        let value = Value::from(&b"A^\xffB"[..]);
        let escaped = value.display(true);
        assert!(escaped.starts_with("\"A^"));
        assert!(escaped.to_ascii_lowercase().contains("\\xff"));
        assert_eq!(value.display(false), value.escaped());
        assert_eq!(Value::from("plain").display(false), "plain");
    }

    #[test]
    fn absent_value_has_marker() {
        assert_eq!(display_optional(None, false), NO_VALUE);
        assert_eq!(display_optional(Some(&Value::from("x")), false), "x");
    }
}
