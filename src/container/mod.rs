//! Document container boundary.
//!
//! The signing engine never touches PDF syntax directly. It asks a
//! [`DocumentContainer`] for the signatures and the document security store
//! already present, and for two kinds of new revision: one carrying a
//! signature placeholder, and one carrying an updated DSS. Every revision is
//! an incremental update, so earlier bytes are never rewritten.

mod document;
mod scan;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::asn1;
use crate::crypto::CryptoProvider;
use crate::error::Result;
use crate::object::ObjectRef;
use crate::signatures::{ByteRangeCalculator, DigestAlgorithm, SignatureSubFilter, SignerProperties};

pub use document::IncrementalDocument;

/// A signature field whose value is a signature dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureField {
    /// Fully qualified field name
    pub name: String,
    /// Signature dictionary object
    pub signature_ref: Option<ObjectRef>,
    /// `/SubFilter` of the signature dictionary
    pub sub_filter: Option<SignatureSubFilter>,
    /// `/ByteRange`
    pub byte_range: [i64; 4],
    /// `/Contents` with the placeholder padding removed
    pub contents: Vec<u8>,
    /// `/Name`
    pub signer_name: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/M`, as written in the document
    pub signing_time: Option<String>,
}

impl SignatureField {
    /// Key of the VRI dictionary for this signature: upper-case hex SHA-1
    /// of the `/Contents` value.
    pub fn vri_key(&self, provider: &dyn CryptoProvider) -> String {
        vri_key(&self.contents, provider)
    }

    /// `/Type /DocTimeStamp` layer.
    pub fn is_document_timestamp(&self) -> bool {
        self.sub_filter.map_or(false, |s| s.is_document_timestamp())
    }

    /// The byte range ends at the end of a document of `len` bytes.
    pub fn covers(&self, len: usize) -> bool {
        ByteRangeCalculator::validate_byte_range(&self.byte_range, len).is_ok()
    }
}

/// VRI key for a DER signature value.
pub fn vri_key(contents: &[u8], provider: &dyn CryptoProvider) -> String {
    crate::writer::bytes_to_hex(&provider.digest(DigestAlgorithm::Sha1, contents))
}

/// Strip the zero padding a `/Contents` placeholder leaves after the DER.
pub(crate) fn trim_contents(raw: &[u8]) -> Vec<u8> {
    match asn1::encoded_length(raw) {
        Ok(len) if len <= raw.len() => raw[..len].to_vec(),
        _ => {
            let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            raw[..end].to_vec()
        },
    }
}

/// What a new signature layer should look like.
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    /// `/SubFilter`; [`SignatureSubFilter::Rfc3161`] produces a document timestamp
    pub sub_filter: SignatureSubFilter,
    /// Field name, page placement and descriptive entries
    pub properties: SignerProperties,
    /// Bytes reserved for the DER value in `/Contents`
    pub estimated_size: usize,
    /// Value of `/M`
    pub signing_time: DateTime<Utc>,
}

impl SignatureRequest {
    /// Request for an approval signature.
    pub fn approval(properties: SignerProperties, estimated_size: usize) -> Self {
        let signing_time = properties.signing_time.unwrap_or_else(Utc::now);
        Self {
            sub_filter: SignatureSubFilter::CadesDetached,
            properties,
            estimated_size,
            signing_time,
        }
    }

    /// Request for a document timestamp.
    pub fn document_timestamp(estimated_size: usize) -> Self {
        Self {
            sub_filter: SignatureSubFilter::Rfc3161,
            properties: SignerProperties::new(),
            estimated_size,
            signing_time: Utc::now(),
        }
    }
}

/// A revision with a reserved, still empty `/Contents`.
#[derive(Debug, Clone)]
pub struct PreparedSignature {
    /// Whole document, new revision included
    pub bytes: Vec<u8>,
    /// Offset of the `<` opening the `/Contents` placeholder
    pub contents_offset: usize,
    /// Placeholder geometry
    pub calculator: ByteRangeCalculator,
    /// Byte range already written into the revision
    pub byte_range: [i64; 4],
    /// Name of the signature field
    pub field_name: String,
}

impl PreparedSignature {
    /// The bytes the signature must cover.
    pub fn signed_bytes(&self) -> Result<Vec<u8>> {
        ByteRangeCalculator::extract_signed_bytes(&self.bytes, &self.byte_range)
    }

    /// Write `der` into the placeholder and return the finished document.
    pub fn embed(mut self, der: &[u8]) -> Result<Vec<u8>> {
        self.calculator.insert_signature(&mut self.bytes, self.contents_offset, der)?;
        Ok(self.bytes)
    }
}

/// A DSS stream read from the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Stream object
    pub reference: ObjectRef,
    /// Decoded stream data
    pub data: Vec<u8>,
}

/// A VRI dictionary read from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VriEntry {
    /// `/Cert` references
    pub certs: Vec<ObjectRef>,
    /// `/OCSP` references
    pub ocsps: Vec<ObjectRef>,
    /// `/CRL` references
    pub crls: Vec<ObjectRef>,
    /// `/TU`, as written in the document
    pub created: Option<String>,
}

/// The `/DSS` dictionary of the latest revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DssContents {
    /// `/Certs`
    pub certs: Vec<StoredBlob>,
    /// `/OCSPs`
    pub ocsps: Vec<StoredBlob>,
    /// `/CRLs`
    pub crls: Vec<StoredBlob>,
    /// `/VRI`, keyed by upper-case hex
    pub vri: BTreeMap<String, VriEntry>,
}

/// An entry of a DSS to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blob {
    /// Stream already present in the document
    Existing(ObjectRef),
    /// Data for a new stream
    New(Vec<u8>),
}

/// A VRI to write; indices point into the matching [`DssWrite`] list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VriWrite {
    /// Indices into [`DssWrite::certs`]
    pub certs: Vec<usize>,
    /// Indices into [`DssWrite::ocsps`]
    pub ocsps: Vec<usize>,
    /// Indices into [`DssWrite::crls`]
    pub crls: Vec<usize>,
    /// `/TU`
    pub created: DateTime<Utc>,
}

/// Full contents of the DSS revision to append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DssWrite {
    /// `/Certs`
    pub certs: Vec<Blob>,
    /// `/OCSPs`
    pub ocsps: Vec<Blob>,
    /// `/CRLs`
    pub crls: Vec<Blob>,
    /// `/VRI` entries, in key order
    pub vri: Vec<(String, VriWrite)>,
}

/// Document object model and incremental-save machinery used by the engine.
pub trait DocumentContainer {
    /// Current document bytes.
    fn bytes(&self) -> &[u8];

    /// Signature fields carrying a signature value, in append order.
    fn signatures(&self) -> Result<Vec<SignatureField>>;

    /// The document security store of the latest revision.
    fn read_dss(&self) -> Result<Option<DssContents>>;

    /// Append a revision with a signature field and placeholders.
    fn prepare_signature(&self, request: &SignatureRequest) -> Result<PreparedSignature>;

    /// Append a revision carrying `dss` and return the new document.
    fn append_dss(&self, dss: &DssWrite) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;

    #[test]
    fn test_trim_contents_uses_der_length() {
        let mut raw = vec![0x30, 0x03, 0x02, 0x01, 0x00];
        raw.extend_from_slice(&[0; 16]);
        assert_eq!(trim_contents(&raw), vec![0x30, 0x03, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_trim_contents_falls_back_to_zero_strip() {
        assert_eq!(trim_contents(&[0xFF, 0x01, 0x00, 0x00]), vec![0xFF, 0x01]);
        assert!(trim_contents(&[0, 0, 0]).is_empty());
    }

    #[test]
    fn test_vri_key_is_upper_hex_sha1() {
        let key = vri_key(b"abc", &DefaultCryptoProvider::new());
        assert_eq!(key, "A9993E364706816ABA3E25717850C26C9CD0D89D");
    }

    #[test]
    fn test_field_covers() {
        let field = SignatureField {
            name: "Signature1".to_string(),
            signature_ref: None,
            sub_filter: Some(SignatureSubFilter::Rfc3161),
            byte_range: [0, 10, 30, 20],
            contents: Vec::new(),
            signer_name: None,
            reason: None,
            location: None,
            signing_time: None,
        };
        assert!(field.covers(50));
        assert!(!field.covers(60));
        assert!(field.is_document_timestamp());
    }
}
