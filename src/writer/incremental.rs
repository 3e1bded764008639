//! Incremental update sections.
//!
//! An update copies the previous revision byte for byte, appends new or
//! replaced objects, then a classic cross-reference section whose trailer
//! points back at the previous one through `/Prev`.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::writer::object_serializer::{ObjectSerializer, RawEntry};

/// Builder for one incremental revision.
pub struct IncrementalWriter {
    out: Vec<u8>,
    entries: Vec<(ObjectRef, usize)>,
    serializer: ObjectSerializer,
}

impl IncrementalWriter {
    /// Start a revision on top of `base`.
    pub fn new(base: &[u8]) -> Self {
        let mut out = Vec::with_capacity(base.len() + 16 * 1024);
        out.extend_from_slice(base);
        if !matches!(out.last(), Some(b'\n') | Some(b'\r')) {
            out.push(b'\n');
        }
        Self {
            out,
            entries: Vec::new(),
            serializer: ObjectSerializer::compact(),
        }
    }

    /// Current absolute write position.
    pub fn position(&self) -> usize {
        self.out.len()
    }

    /// Append an indirect object.
    pub fn write_object(&mut self, reference: ObjectRef, obj: &Object) {
        self.entries.push((reference, self.out.len()));
        let bytes = self.serializer.serialize_indirect(reference, obj);
        self.out.extend_from_slice(&bytes);
    }

    /// Append a dictionary with raw trailing entries and return the absolute
    /// offsets of the raw values.
    pub fn write_object_with_raw(
        &mut self,
        reference: ObjectRef,
        dict: &Dictionary,
        raw: &[RawEntry<'_>],
    ) -> Vec<usize> {
        let start = self.out.len();
        self.entries.push((reference, start));
        let (bytes, offsets) = self.serializer.serialize_indirect_with_raw(reference, dict, raw);
        self.out.extend_from_slice(&bytes);
        offsets.into_iter().map(|o| o + start).collect()
    }

    /// Write the cross-reference section and trailer and return the whole
    /// document.
    ///
    /// `trailer` must already carry `/Size`, `/Root` and `/Prev`.
    pub fn finish(mut self, trailer: &Dictionary) -> Vec<u8> {
        let xref_offset = self.out.len();
        self.entries.sort_by_key(|(r, _)| r.id);

        self.out.extend_from_slice(b"xref\n");
        let mut i = 0;
        while i < self.entries.len() {
            let mut j = i + 1;
            while j < self.entries.len() && self.entries[j].0.id == self.entries[j - 1].0.id + 1 {
                j += 1;
            }
            self.out
                .extend_from_slice(format!("{} {}\n", self.entries[i].0.id, j - i).as_bytes());
            for (reference, offset) in &self.entries[i..j] {
                self.out
                    .extend_from_slice(format!("{:010} {:05} n \n", offset, reference.gen).as_bytes());
            }
            i = j;
        }

        self.out.extend_from_slice(b"trailer\n");
        let trailer_bytes = ObjectSerializer::new().serialize(&Object::Dictionary(trailer.clone()));
        self.out.extend_from_slice(&trailer_bytes);
        self.out
            .extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        self.out
    }
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_startxref(bytes: &[u8]) -> Result<u64> {
    let keyword = b"startxref";
    let pos = bytes
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| Error::InvalidPdf("Could not find startxref".to_string()))?;

    let digits: String = bytes[pos + keyword.len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();

    digits
        .parse::<u64>()
        .map_err(|_| Error::InvalidPdf("Malformed startxref offset".to_string()))
}
