//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation. Dictionary keys are
//! written in sorted order so revisions are reproducible.

use crate::object::{Dictionary, Object, ObjectRef};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

/// Raw, pre-formatted dictionary values whose position in the output
/// must be known (signature placeholders).
pub struct RawEntry<'a> {
    /// Dictionary key without the leading slash
    pub key: &'a str,
    /// Bytes written verbatim as the value
    pub value: &'a [u8],
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging and tests).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).into_owned()
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, reference: ObjectRef, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", reference.id, reference.gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    /// Serialize an indirect dictionary followed by raw entries.
    ///
    /// Returns the bytes and, for every raw entry, the offset of its value
    /// relative to the start of the returned buffer.
    pub fn serialize_indirect_with_raw(
        &self,
        reference: ObjectRef,
        dict: &Dictionary,
        raw: &[RawEntry<'_>],
    ) -> (Vec<u8>, Vec<usize>) {
        let mut buf = format!("{} {} obj\n<<", reference.id, reference.gen).into_bytes();
        self.write_entries(&mut buf, dict);
        let mut offsets = Vec::with_capacity(raw.len());
        for entry in raw {
            self.entry_separator(&mut buf);
            self.write_name(&mut buf, entry.key);
            buf.push(b' ');
            offsets.push(buf.len());
            buf.extend_from_slice(entry.value);
        }
        if !self.compact {
            buf.push(b'\n');
        }
        buf.extend_from_slice(b">>\nendobj\n");
        (buf, offsets)
    }

    fn write_object(&self, w: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => w.extend_from_slice(b"null"),
            Object::Boolean(b) => w.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => w.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => self.write_string(w, s),
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => w.extend_from_slice(r.to_string().as_bytes()),
        }
    }

    fn write_real(&self, w: &mut Vec<u8>, value: f64) {
        if value.fract() == 0.0 {
            w.extend_from_slice((value as i64).to_string().as_bytes());
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            w.extend_from_slice(trimmed.as_bytes());
        }
    }

    /// Literal syntax for printable text, hex syntax for binary data.
    fn write_string(&self, w: &mut Vec<u8>, data: &[u8]) {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            w.push(b'(');
            for &byte in data {
                match byte {
                    b'(' => w.extend_from_slice(b"\\("),
                    b')' => w.extend_from_slice(b"\\)"),
                    b'\\' => w.extend_from_slice(b"\\\\"),
                    b'\n' => w.extend_from_slice(b"\\n"),
                    b'\r' => w.extend_from_slice(b"\\r"),
                    b'\t' => w.extend_from_slice(b"\\t"),
                    _ => w.push(byte),
                }
            }
            w.push(b')');
        } else {
            w.push(b'<');
            w.extend_from_slice(bytes_to_hex(data).as_bytes());
            w.push(b'>');
        }
    }

    fn write_name(&self, w: &mut Vec<u8>, name: &str) {
        w.push(b'/');
        for byte in name.bytes() {
            match byte {
                b'!'
                | b'"'
                | b'$'..=b'&'
                | b'\''..=b'.'
                | b'0'..=b'9'
                | b';'
                | b'?'
                | b'@'
                | b'A'..=b'Z'
                | b'^'..=b'z'
                | b'|'
                | b'~' => w.push(byte),
                _ => w.extend_from_slice(format!("#{:02X}", byte).as_bytes()),
            }
        }
    }

    fn write_array(&self, w: &mut Vec<u8>, arr: &[Object]) {
        w.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                w.push(b' ');
            }
            self.write_object(w, obj);
        }
        w.push(b']');
    }

    fn entry_separator(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(if self.compact { b" " } else { b"\n  " });
    }

    fn write_entries(&self, w: &mut Vec<u8>, dict: &Dictionary) {
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(value) = dict.get(key) {
                self.entry_separator(w);
                self.write_name(w, key);
                w.push(b' ');
                self.write_object(w, value);
            }
        }
    }

    fn write_dictionary(&self, w: &mut Vec<u8>, dict: &Dictionary) {
        w.extend_from_slice(b"<<");
        self.write_entries(w, dict);
        if !self.compact && !dict.is_empty() {
            w.push(b'\n');
        }
        w.extend_from_slice(b">>");
    }

    /// `/Length` always reflects the data actually written.
    fn write_stream(&self, w: &mut Vec<u8>, dict: &Dictionary, data: &[u8]) {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict_with_length);
        w.extend_from_slice(b"\nstream\n");
        w.extend_from_slice(data);
        w.extend_from_slice(b"\nendstream");
    }
}

/// Upper-case hex encoding.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_scalars() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::Null), "null");
        assert_eq!(s.serialize_to_string(&Object::Boolean(true)), "true");
        assert_eq!(s.serialize_to_string(&Object::Integer(-123)), "-123");
        assert_eq!(s.serialize_to_string(&Object::Real(1.0)), "1");
        assert_eq!(s.serialize_to_string(&Object::Real(0.5)), "0.5");
    }

    #[test]
    fn test_serialize_strings() {
        let s = ObjectSerializer::new();
        assert_eq!(
            s.serialize_to_string(&Object::text("Test (parens)")),
            "(Test \\(parens\\))"
        );
        assert_eq!(s.serialize_to_string(&Object::String(vec![0x00, 0xFF, 0x80])), "<00FF80>");
    }

    #[test]
    fn test_serialize_name_with_special_chars() {
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize_to_string(&Object::name("adbe.pkcs7.detached")), "/adbe.pkcs7.detached");
        assert_eq!(s.serialize_to_string(&Object::name("A B")), "/A#20B");
    }

    #[test]
    fn test_serialize_dictionary_sorted() {
        let s = ObjectSerializer::compact();
        let dict = Object::dict(vec![
            ("Type", Object::name("DSS")),
            ("Certs", Object::Array(vec![Object::Reference(ObjectRef::new(10, 0))])),
        ]);
        assert_eq!(s.serialize_to_string(&dict), "<< /Certs [10 0 R] /Type /DSS>>");
    }

    #[test]
    fn test_serialize_stream_sets_length() {
        let s = ObjectSerializer::compact();
        let mut dict = Dictionary::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"stream data"),
        };
        let result = s.serialize_to_string(&stream);
        assert!(result.contains("/Length 11"));
        assert!(result.contains("\nstream\nstream data\nendstream"));
    }

    #[test]
    fn test_raw_entry_offsets() {
        let s = ObjectSerializer::compact();
        let dict = match Object::dict(vec![("Type", Object::name("Sig"))]) {
            Object::Dictionary(d) => d,
            _ => unreachable!(),
        };
        let (bytes, offsets) = s.serialize_indirect_with_raw(
            ObjectRef::new(5, 0),
            &dict,
            &[RawEntry {
                key: "Contents",
                value: b"<0000>",
            }],
        );
        assert_eq!(&bytes[offsets[0]..offsets[0] + 6], b"<0000>");
        assert!(bytes.starts_with(b"5 0 obj\n<<"));
        assert!(bytes.ends_with(b">>\nendobj\n"));
    }
}
