//! PDF container writing incremental updates.
//!
//! Reads are served from an [`ObjectIndex`] built by scanning the file; every
//! write produces a new revision appended after the existing bytes with a
//! classic cross-reference section.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use chrono::{DateTime, Utc};

use super::scan::{self, ObjectIndex};
use super::{
    trim_contents, Blob, DocumentContainer, DssContents, DssWrite, PreparedSignature,
    SignatureField, SignatureRequest, StoredBlob, VriEntry,
};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::signatures::{ByteRangeCalculator, SignatureSubFilter};
use crate::writer::{find_startxref, IncrementalWriter, RawEntry};

/// Annotation flags of a signature widget: Print | Locked.
const SIGNATURE_WIDGET_FLAGS: i64 = 132;

/// AcroForm `/SigFlags`: SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;

/// Depth limit for field and page trees.
const MAX_TREE_DEPTH: usize = 32;

/// A parsed PDF open for incremental updates.
#[derive(Debug)]
pub struct IncrementalDocument {
    bytes: Vec<u8>,
    index: ObjectIndex,
    next_id: u32,
}

/// PDF date string, `D:YYYYMMDDHHmmSS+00'00'`.
pub(crate) fn pdf_date(time: &DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

/// Text string to Rust string; UTF-16BE when it starts with a byte order mark.
fn decode_text(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn references(objects: &[ObjectRef]) -> Object {
    Object::Array(objects.iter().copied().map(Object::Reference).collect())
}

/// One signature field node collected from the AcroForm tree.
struct FieldNode {
    name: String,
    dict: Dictionary,
    is_signature: bool,
}

impl IncrementalDocument {
    /// Parse `bytes`.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let index = scan::scan(&bytes)?;
        let max_id = index.objects.keys().copied().max().unwrap_or(0);
        let size = index
            .trailer
            .get("Size")
            .and_then(Object::as_integer)
            .unwrap_or(0)
            .max(0) as u32;
        let next_id = size.max(max_id + 1);
        log::debug!("Opened document: {} bytes, next object id {}", bytes.len(), next_id);
        Ok(Self {
            bytes,
            index,
            next_id,
        })
    }

    /// Give back the document bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Load an indirect object.
    pub fn get(&self, reference: ObjectRef) -> Result<&Object> {
        self.index
            .objects
            .get(&reference.id)
            .map(|(_, obj)| obj)
            .ok_or(Error::ObjectNotFound(reference.id, reference.gen))
    }

    /// Follow `obj` when it is a reference.
    fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        match obj {
            Object::Reference(r) => self.get(*r),
            other => Ok(other),
        }
    }

    fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        self.resolve(obj).ok().and_then(Object::as_dict)
    }

    fn catalog_ref(&self) -> Result<ObjectRef> {
        self.index
            .trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("Trailer missing /Root".to_string()))
    }

    fn catalog(&self) -> Result<Dictionary> {
        self.get(self.catalog_ref()?)?
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("Catalog is not a dictionary".to_string()))
    }

    /// Page references in document order.
    pub fn page_refs(&self) -> Result<Vec<ObjectRef>> {
        let catalog = self.catalog()?;
        let pages_ref = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("Catalog missing /Pages".to_string()))?;
        let mut refs = Vec::new();
        self.collect_page_refs(pages_ref, &mut refs, 0)?;
        Ok(refs)
    }

    fn collect_page_refs(&self, node: ObjectRef, refs: &mut Vec<ObjectRef>, depth: usize) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            return Err(Error::InvalidPdf("Page tree too deep".to_string()));
        }
        let dict = match self.get(node)?.as_dict() {
            Some(dict) => dict,
            None => return Ok(()),
        };
        match dict.get("Type").and_then(Object::as_name) {
            Some("Page") => refs.push(node),
            _ => {
                if let Some(kids) = dict.get("Kids").and_then(Object::as_array) {
                    for kid in kids.iter().filter_map(Object::as_reference) {
                        self.collect_page_refs(kid, refs, depth + 1)?;
                    }
                }
            },
        }
        Ok(())
    }

    /// Terminal form fields with fully qualified names.
    fn form_fields(&self) -> Result<Vec<FieldNode>> {
        let catalog = self.catalog()?;
        let acroform = match catalog.get("AcroForm").and_then(|a| self.resolve_dict(a)) {
            Some(acroform) => acroform,
            None => return Ok(Vec::new()),
        };
        let fields = match acroform.get("Fields").map(|f| self.resolve(f)).transpose()? {
            Some(Object::Array(fields)) => fields.clone(),
            _ => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        for field in &fields {
            self.collect_fields(field, None, false, &mut out, 0)?;
        }
        Ok(out)
    }

    fn collect_fields(
        &self,
        node: &Object,
        parent_name: Option<&str>,
        inherited_sig: bool,
        out: &mut Vec<FieldNode>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            return Err(Error::InvalidPdf("Field tree too deep".to_string()));
        }
        let dict = match self.resolve_dict(node) {
            Some(dict) => dict,
            None => return Ok(()),
        };
        let partial = dict.get("T").and_then(Object::as_string).map(decode_text);
        let name = match (parent_name, partial) {
            (Some(parent), Some(partial)) => format!("{}.{}", parent, partial),
            (None, Some(partial)) => partial,
            (Some(parent), None) => parent.to_string(),
            (None, None) => String::new(),
        };
        let is_signature = match dict.get("FT").and_then(Object::as_name) {
            Some(ft) => ft == "Sig",
            None => inherited_sig,
        };

        let named_kids: Vec<&Object> = dict
            .get("Kids")
            .and_then(Object::as_array)
            .map(|kids| {
                kids.iter()
                    .filter(|kid| {
                        self.resolve_dict(kid).map_or(false, |d| d.contains_key("T"))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if named_kids.is_empty() {
            out.push(FieldNode {
                name,
                dict: dict.clone(),
                is_signature,
            });
        } else {
            for kid in named_kids {
                self.collect_fields(kid, Some(&name), is_signature, out, depth + 1)?;
            }
        }
        Ok(())
    }

    fn signature_field(&self, node: &FieldNode) -> Result<Option<SignatureField>> {
        let value = match node.dict.get("V") {
            Some(value) => value,
            None => return Ok(None),
        };
        let signature_ref = value.as_reference();
        let sig = match self.resolve(value)?.as_dict() {
            Some(sig) => sig,
            None => return Ok(None),
        };

        let byte_range: Vec<i64> = sig
            .get("ByteRange")
            .and_then(Object::as_array)
            .map(|arr| arr.iter().filter_map(Object::as_integer).collect())
            .unwrap_or_default();
        let byte_range: [i64; 4] = match byte_range.try_into() {
            Ok(range) => range,
            Err(_) => {
                log::warn!("Signature field {} has no usable /ByteRange", node.name);
                return Ok(None);
            },
        };
        let contents = sig.get("Contents").and_then(Object::as_string).map(trim_contents);
        let contents = match contents {
            Some(contents) if !contents.is_empty() => contents,
            _ => return Ok(None),
        };
        let text = |name: &str| sig.get(name).and_then(Object::as_string).map(decode_text);

        Ok(Some(SignatureField {
            name: node.name.clone(),
            signature_ref,
            sub_filter: sig
                .get("SubFilter")
                .and_then(Object::as_name)
                .and_then(SignatureSubFilter::from_pdf_name),
            byte_range,
            contents,
            signer_name: text("Name"),
            reason: text("Reason"),
            location: text("Location"),
            signing_time: text("M"),
        }))
    }

    fn allocate(&self, next: &mut u32) -> ObjectRef {
        let reference = ObjectRef::new(*next, 0);
        *next += 1;
        reference
    }

    /// Trailer of the new revision.
    fn trailer(&self, size: u32) -> Result<Dictionary> {
        let mut trailer = Dictionary::new();
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        trailer.insert("Root".to_string(), Object::Reference(self.catalog_ref()?));
        trailer.insert("Prev".to_string(), Object::Integer(find_startxref(&self.bytes)? as i64));
        for name in ["Info", "ID"] {
            if let Some(value) = self.index.trailer.get(name) {
                trailer.insert(name.to_string(), value.clone());
            }
        }
        Ok(trailer)
    }

    /// Merge the ESIC developer extension into the catalog.
    fn add_extension(&self, catalog: &mut Dictionary) {
        let mut extensions = catalog
            .get("Extensions")
            .and_then(|e| self.resolve_dict(e))
            .cloned()
            .unwrap_or_default();
        extensions.insert(
            "ESIC".to_string(),
            Object::dict(vec![
                ("BaseVersion", Object::name("1.7")),
                ("ExtensionLevel", Object::Integer(5)),
            ]),
        );
        catalog.insert("Extensions".to_string(), Object::Dictionary(extensions));
    }

    fn unique_field_name(&self, requested: Option<&str>, existing: &HashSet<String>) -> Result<String> {
        if let Some(name) = requested {
            if existing.contains(name) {
                return Err(Error::InvalidPdf(format!("Field {} already exists", name)));
            }
            return Ok(name.to_string());
        }
        Ok((1..)
            .map(|n| format!("Signature{}", n))
            .find(|candidate| !existing.contains(candidate))
            .unwrap_or_default())
    }
}

impl DocumentContainer for IncrementalDocument {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn signatures(&self) -> Result<Vec<SignatureField>> {
        let mut signatures = Vec::new();
        for node in self.form_fields()?.iter().filter(|n| n.is_signature) {
            if let Some(field) = self.signature_field(node)? {
                signatures.push(field);
            }
        }
        signatures.sort_by_key(|s| s.byte_range[2] + s.byte_range[3]);
        Ok(signatures)
    }

    fn read_dss(&self) -> Result<Option<DssContents>> {
        let catalog = self.catalog()?;
        let dss = match catalog.get("DSS").and_then(|d| self.resolve_dict(d)) {
            Some(dss) => dss,
            None => return Ok(None),
        };

        let blobs = |name: &str| -> Result<Vec<StoredBlob>> {
            let array = match dss.get(name).map(|a| self.resolve(a)).transpose()? {
                Some(Object::Array(array)) => array,
                _ => return Ok(Vec::new()),
            };
            array
                .iter()
                .filter_map(Object::as_reference)
                .map(|reference| {
                    Ok(StoredBlob {
                        reference,
                        data: self.get(reference)?.decode_stream_data()?,
                    })
                })
                .collect()
        };

        let refs = |entry: &Dictionary, name: &str| -> Vec<ObjectRef> {
            entry
                .get(name)
                .and_then(|a| self.resolve(a).ok())
                .and_then(Object::as_array)
                .map(|arr| arr.iter().filter_map(Object::as_reference).collect())
                .unwrap_or_default()
        };

        let mut vri = BTreeMap::new();
        if let Some(vri_dict) = dss.get("VRI").and_then(|v| self.resolve_dict(v)) {
            for (name, value) in vri_dict {
                if let Some(entry) = self.resolve_dict(value) {
                    vri.insert(
                        name.to_uppercase(),
                        VriEntry {
                            certs: refs(entry, "Cert"),
                            ocsps: refs(entry, "OCSP"),
                            crls: refs(entry, "CRL"),
                            created: entry.get("TU").and_then(Object::as_string).map(decode_text),
                        },
                    );
                }
            }
        }

        Ok(Some(DssContents {
            certs: blobs("Certs")?,
            ocsps: blobs("OCSPs")?,
            crls: blobs("CRLs")?,
            vri,
        }))
    }

    fn prepare_signature(&self, request: &SignatureRequest) -> Result<PreparedSignature> {
        let catalog_ref = self.catalog_ref()?;
        let mut catalog = self.catalog()?;
        let existing: HashSet<String> = self.form_fields()?.into_iter().map(|f| f.name).collect();
        let field_name =
            self.unique_field_name(request.properties.field_name.as_deref(), &existing)?;

        let pages = self.page_refs()?;
        let page_ref = *pages.get(request.properties.page).ok_or_else(|| {
            Error::InvalidPdf(format!(
                "Page {} out of range ({} pages)",
                request.properties.page,
                pages.len()
            ))
        })?;

        let mut next = self.next_id;
        let sig_ref = self.allocate(&mut next);
        let field_ref = self.allocate(&mut next);
        let mut writer = IncrementalWriter::new(&self.bytes);

        // Signature dictionary with both placeholders last.
        let is_timestamp = request.sub_filter.is_document_timestamp();
        let mut sig = Dictionary::new();
        sig.insert("Type".to_string(), Object::name(if is_timestamp { "DocTimeStamp" } else { "Sig" }));
        sig.insert("Filter".to_string(), Object::name("Adobe.PPKLite"));
        sig.insert("SubFilter".to_string(), Object::name(request.sub_filter.as_pdf_name()));
        if !is_timestamp {
            sig.insert("M".to_string(), Object::text(&pdf_date(&request.signing_time)));
            let props = &request.properties;
            for (name, value) in [
                ("Reason", &props.reason),
                ("Location", &props.location),
                ("ContactInfo", &props.contact_info),
                ("Name", &props.signer_name),
            ] {
                if let Some(value) = value {
                    sig.insert(name.to_string(), Object::text(value));
                }
            }
        }
        let calculator = ByteRangeCalculator::new(request.estimated_size);
        let byte_range_placeholder = ByteRangeCalculator::generate_byte_range_placeholder();
        let contents_placeholder = calculator.generate_placeholder();
        let offsets = writer.write_object_with_raw(
            sig_ref,
            &sig,
            &[
                RawEntry {
                    key: "ByteRange",
                    value: byte_range_placeholder.as_bytes(),
                },
                RawEntry {
                    key: "Contents",
                    value: contents_placeholder.as_bytes(),
                },
            ],
        );
        let (byte_range_offset, contents_offset) = (offsets[0], offsets[1]);

        // Merged field and widget annotation.
        let rect = match request.properties.rect {
            Some(r) => vec![r.x, r.y, r.x + r.width, r.y + r.height],
            None => vec![0.0; 4],
        };
        let field = Object::dict(vec![
            ("FT", Object::name("Sig")),
            ("T", Object::text(&field_name)),
            ("V", Object::Reference(sig_ref)),
            ("Type", Object::name("Annot")),
            ("Subtype", Object::name("Widget")),
            ("Rect", Object::Array(rect.into_iter().map(|v| Object::Real(v as f64)).collect())),
            ("F", Object::Integer(SIGNATURE_WIDGET_FLAGS)),
            ("P", Object::Reference(page_ref)),
        ]);
        writer.write_object(field_ref, &field);

        // Page /Annots.
        let mut page = self
            .get(page_ref)?
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("Page is not a dictionary".to_string()))?;
        match page.get("Annots").cloned() {
            Some(Object::Reference(annots_ref)) => {
                let mut annots = self.get(annots_ref)?.as_array().cloned().unwrap_or_default();
                annots.push(Object::Reference(field_ref));
                writer.write_object(annots_ref, &Object::Array(annots));
            },
            other => {
                let mut annots = other.as_ref().and_then(Object::as_array).cloned().unwrap_or_default();
                annots.push(Object::Reference(field_ref));
                page.insert("Annots".to_string(), Object::Array(annots));
                writer.write_object(page_ref, &Object::Dictionary(page));
            },
        }

        // AcroForm /Fields and /SigFlags.
        let mut catalog_changed = false;
        let acroform_ref = catalog.get("AcroForm").and_then(Object::as_reference);
        let mut acroform = catalog
            .get("AcroForm")
            .and_then(|a| self.resolve_dict(a))
            .cloned()
            .unwrap_or_default();
        let mut fields = match acroform.get("Fields").map(|f| self.resolve(f)).transpose()? {
            Some(Object::Array(fields)) => fields.clone(),
            _ => Vec::new(),
        };
        fields.push(Object::Reference(field_ref));
        acroform.insert("Fields".to_string(), Object::Array(fields));
        acroform.insert("SigFlags".to_string(), Object::Integer(SIG_FLAGS));
        match acroform_ref {
            Some(reference) => writer.write_object(reference, &Object::Dictionary(acroform)),
            None => {
                catalog.insert("AcroForm".to_string(), Object::Dictionary(acroform));
                catalog_changed = true;
            },
        }

        if is_timestamp {
            self.add_extension(&mut catalog);
            catalog_changed = true;
        }
        if catalog_changed {
            writer.write_object(catalog_ref, &Object::Dictionary(catalog));
        }

        let mut bytes = writer.finish(&self.trailer(next)?);
        let byte_range = calculator.calculate_byte_range(bytes.len(), contents_offset);
        ByteRangeCalculator::fill_byte_range(&mut bytes, byte_range_offset, &byte_range)?;

        log::debug!(
            "Prepared {} field {} with {} byte placeholder",
            request.sub_filter.as_pdf_name(),
            field_name,
            calculator.placeholder_size()
        );
        Ok(PreparedSignature {
            bytes,
            contents_offset,
            calculator,
            byte_range,
            field_name,
        })
    }

    fn append_dss(&self, dss: &DssWrite) -> Result<Vec<u8>> {
        let catalog_ref = self.catalog_ref()?;
        let mut catalog = self.catalog()?;
        let mut next = self.next_id;
        let mut writer = IncrementalWriter::new(&self.bytes);

        let mut write_blobs = |blobs: &[Blob], writer: &mut IncrementalWriter| -> Result<Vec<ObjectRef>> {
            blobs
                .iter()
                .map(|blob| match blob {
                    Blob::Existing(reference) => Ok(*reference),
                    Blob::New(data) => {
                        let reference = ObjectRef::new(next, 0);
                        next += 1;
                        let mut dict = Dictionary::new();
                        dict.insert("Filter".to_string(), Object::name("FlateDecode"));
                        let stream = Object::Stream {
                            dict,
                            data: bytes::Bytes::from(deflate(data)?),
                        };
                        writer.write_object(reference, &stream);
                        Ok(reference)
                    },
                })
                .collect()
        };
        let certs = write_blobs(&dss.certs, &mut writer)?;
        let ocsps = write_blobs(&dss.ocsps, &mut writer)?;
        let crls = write_blobs(&dss.crls, &mut writer)?;

        let pick = |all: &[ObjectRef], indices: &[usize]| -> Result<Vec<ObjectRef>> {
            indices
                .iter()
                .map(|&i| {
                    all.get(i)
                        .copied()
                        .ok_or_else(|| Error::InvalidPdf(format!("VRI index {} out of range", i)))
                })
                .collect()
        };
        let mut vri = Dictionary::new();
        for (vri_key, entry) in &dss.vri {
            let mut dict = Dictionary::new();
            for (name, list) in [
                ("Cert", pick(&certs, &entry.certs)?),
                ("OCSP", pick(&ocsps, &entry.ocsps)?),
                ("CRL", pick(&crls, &entry.crls)?),
            ] {
                if !list.is_empty() {
                    dict.insert(name.to_string(), references(&list));
                }
            }
            dict.insert("TU".to_string(), Object::text(&pdf_date(&entry.created)));
            vri.insert(vri_key.clone(), Object::Dictionary(dict));
        }

        let mut dss_dict = Dictionary::new();
        dss_dict.insert("Type".to_string(), Object::name("DSS"));
        for (name, list) in [("Certs", &certs), ("OCSPs", &ocsps), ("CRLs", &crls)] {
            if !list.is_empty() {
                dss_dict.insert(name.to_string(), references(list));
            }
        }
        if !vri.is_empty() {
            dss_dict.insert("VRI".to_string(), Object::Dictionary(vri));
        }
        let dss_ref = ObjectRef::new(next, 0);
        next += 1;
        writer.write_object(dss_ref, &Object::Dictionary(dss_dict));

        catalog.insert("DSS".to_string(), Object::Reference(dss_ref));
        self.add_extension(&mut catalog);
        writer.write_object(catalog_ref, &Object::Dictionary(catalog));

        log::debug!(
            "Appending DSS: {} certificates, {} OCSP responses, {} CRLs, {} VRI entries",
            certs.len(),
            ocsps.len(),
            crls.len(),
            dss.vri.len()
        );
        Ok(writer.finish(&self.trailer(next)?))
    }
}
