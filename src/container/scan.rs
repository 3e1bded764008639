//! Object index built by scanning the file.
//!
//! Every revision appended by an incremental update redefines objects
//! further down the file, so the last definition of an object number wins.
//! Compressed object streams are expanded in place of their container.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser::{parse_indirect_object, parse_object};

lazy_static! {
    /// "N G obj" object headers
    static ref RE_OBJ_HEADER: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(\d+)\s+(\d+)\s+obj").unwrap();

    /// "trailer <<" keywords
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"trailer\s*<<").unwrap();
}

/// Objects and trailer of the latest revision.
#[derive(Debug, Default)]
pub struct ObjectIndex {
    /// Object number to (generation, value)
    pub objects: HashMap<u32, (u16, Object)>,
    /// Trailer dictionary of the latest revision
    pub trailer: Dictionary,
}

fn parse_number(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// A header must start at a token boundary.
fn is_header_boundary(contents: &[u8], start: usize) -> bool {
    start == 0 || matches!(contents[start - 1], b'\n' | b'\r' | b' ' | b'\t' | b'>' | b']' | b')')
}

/// Scan `contents` for indirect objects and the trailer.
pub fn scan(contents: &[u8]) -> Result<ObjectIndex> {
    log::debug!("Scanning {} bytes for objects", contents.len());

    let mut found: Vec<(usize, u32, u16, Object)> = Vec::new();
    let mut pos = 0;

    while let Some(capture) = RE_OBJ_HEADER.captures_at(contents, pos) {
        let (full, id, gen) = match (capture.get(0), capture.get(1), capture.get(2)) {
            (Some(full), Some(id), Some(gen)) => (full, id, gen),
            _ => break,
        };
        pos = full.end();
        if !is_header_boundary(contents, full.start()) {
            continue;
        }
        let (id, gen) = match (parse_number(id.as_bytes()), parse_number(gen.as_bytes())) {
            (Some(id), Some(gen)) if id <= u32::MAX as u64 && gen <= u16::MAX as u64 => {
                (id as u32, gen as u16)
            },
            _ => continue,
        };

        match parse_indirect_object(&contents[full.start()..]) {
            Ok((rest, (_, object))) => {
                // Stream payloads may contain header look-alikes.
                pos = contents.len() - rest.len();
                if is_object_stream(&object) {
                    match parse_object_stream(&object) {
                        Ok(inner) => {
                            for (inner_id, inner_obj) in inner {
                                found.push((full.start(), inner_id, 0, inner_obj));
                            }
                        },
                        Err(e) => log::warn!("Skipping object stream {} {}: {}", id, gen, e),
                    }
                }
                found.push((full.start(), id, gen, object));
            },
            Err(e) => {
                log::debug!("Skipping unparsable object {} {} at {}: {:?}", id, gen, full.start(), e);
            },
        }
    }

    if found.is_empty() {
        return Err(Error::InvalidPdf("No objects found in document".to_string()));
    }

    let mut index = ObjectIndex::default();
    found.sort_by_key(|(offset, ..)| *offset);
    for (_, id, gen, object) in found {
        index.objects.insert(id, (gen, object));
    }

    index.trailer = find_trailer(contents, &index)?;
    log::debug!("Indexed {} objects", index.objects.len());
    Ok(index)
}

fn is_object_stream(object: &Object) -> bool {
    matches!(object, Object::Stream { dict, .. }
        if dict.get("Type").and_then(Object::as_name) == Some("ObjStm"))
}

/// Expand a `/Type /ObjStm` stream into its objects.
pub fn parse_object_stream(stream: &Object) -> Result<Vec<(u32, Object)>> {
    let dict = stream
        .as_dict()
        .ok_or_else(|| Error::InvalidPdf("Object stream is not a stream".to_string()))?;
    let count = dict
        .get("N")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /N entry".to_string()))?;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /First entry".to_string()))?;

    let data = stream.decode_stream_data()?;
    let first = first as usize;
    if first > data.len() {
        return Err(Error::InvalidPdf(format!("invalid object stream /First value: {}", first)));
    }

    let header = String::from_utf8_lossy(&data[..first]);
    let numbers: Vec<usize> = header
        .split_ascii_whitespace()
        .filter_map(|n| n.parse().ok())
        .collect();
    if numbers.len() < count as usize * 2 {
        return Err(Error::InvalidPdf("object stream header is truncated".to_string()));
    }

    numbers
        .chunks(2)
        .take(count as usize)
        .map(|pair| {
            let start = first + pair[1];
            let slice = data.get(start..).ok_or_else(|| {
                Error::InvalidPdf(format!("object {} offset outside object stream", pair[0]))
            })?;
            let (_, object) = parse_object(slice).map_err(|e| Error::ParseError {
                offset: start,
                reason: format!("object stream member {}: {:?}", pair[0], e),
            })?;
            Ok((pair[0] as u32, object))
        })
        .collect()
}

/// Trailer of the latest revision.
///
/// Classic files carry a `trailer` dictionary; files using cross-reference
/// streams carry the same keys in the `/Type /XRef` stream dictionary. When
/// neither is usable a minimal trailer pointing at the catalog is built.
fn find_trailer(contents: &[u8], index: &ObjectIndex) -> Result<Dictionary> {
    let classic = RE_TRAILER.find_iter(contents).last().and_then(|m| {
        let keyword_end = m.start() + "trailer".len();
        match parse_object(&contents[keyword_end..]) {
            Ok((_, Object::Dictionary(dict))) => Some((m.start(), dict)),
            _ => None,
        }
    });

    let xref_stream = index
        .objects
        .values()
        .filter_map(|(_, obj)| match obj {
            Object::Stream { dict, .. }
                if dict.get("Type").and_then(Object::as_name) == Some("XRef") =>
            {
                Some(dict)
            },
            _ => None,
        })
        .max_by_key(|dict| dict.get("Size").and_then(Object::as_integer).unwrap_or(0));

    let startxref = crate::writer::find_startxref(contents).ok().map(|o| o as usize);
    let trailer = match (classic, xref_stream) {
        // The last startxref points either at a classic section or an xref stream.
        (Some((offset, dict)), Some(stream_dict)) => {
            if startxref.map_or(true, |s| s <= offset) {
                dict
            } else {
                stream_dict.clone()
            }
        },
        (Some((_, dict)), None) => dict,
        (None, Some(stream_dict)) => stream_dict.clone(),
        (None, None) => Dictionary::new(),
    };

    if trailer.get("Root").and_then(Object::as_reference).is_some() {
        return Ok(trailer);
    }

    log::info!("No usable trailer, locating catalog by scan");
    let catalog = index
        .objects
        .iter()
        .find(|(_, (_, obj))| {
            obj.as_dict().and_then(|d| d.get("Type")).and_then(Object::as_name) == Some("Catalog")
        })
        .map(|(id, (gen, _))| ObjectRef::new(*id, *gen))
        .ok_or_else(|| Error::InvalidPdf("Could not find document catalog".to_string()))?;

    let mut minimal = Dictionary::new();
    minimal.insert("Root".to_string(), Object::Reference(catalog));
    minimal.insert("Size".to_string(), Object::Integer(index.objects.len() as i64 + 1));
    Ok(minimal)
}
