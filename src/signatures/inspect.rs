//! Read-only inspection of signature layers and the document security store.

use serde::Serialize;

use super::byterange::ByteRangeCalculator;
use crate::cades;
use crate::container::{DocumentContainer, SignatureField};
use crate::crypto::{CryptoProvider, DefaultCryptoProvider};
use crate::error::Result;
use crate::ltv::DocumentSecurityStore;

/// One signature or document timestamp layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    /// Fully qualified field name
    pub field_name: String,
    /// `signature` or `document-timestamp`
    pub kind: &'static str,
    /// `/SubFilter`
    pub sub_filter: Option<&'static str>,
    /// `/ByteRange`
    pub byte_range: [i64; 4],
    /// Key of the layer's VRI dictionary
    pub vri_key: String,
    /// The DSS holds a VRI for this layer
    pub has_vri: bool,
    /// The byte range runs to the end of the file
    pub covers_whole_document: bool,
    /// The signed digest matches the bytes in the byte range; `None` when
    /// the signature value cannot be read
    pub digest_matches: Option<bool>,
    /// Certificates embedded in the CMS container
    pub embedded_certificates: usize,
    /// A signature timestamp token is attached
    pub has_signature_timestamp: bool,
    /// `/Name`
    pub signer_name: Option<String>,
    /// `/M`
    pub signing_time: Option<String>,
}

/// Counts of the document security store.
#[derive(Debug, Clone, Serialize)]
pub struct DssReport {
    /// `/Certs`
    pub certificates: usize,
    /// `/OCSPs`
    pub ocsps: usize,
    /// `/CRLs`
    pub crls: usize,
    /// `/VRI` keys
    pub vri_keys: Vec<String>,
}

/// Report over a whole document.
#[derive(Debug, Clone, Serialize)]
pub struct LtvReport {
    /// File size in bytes
    pub file_size: usize,
    /// Layers in append order
    pub layers: Vec<LayerReport>,
    /// Document security store, when present
    pub dss: Option<DssReport>,
}

impl LtvReport {
    /// Every layer has a VRI.
    pub fn is_fully_indexed(&self) -> bool {
        !self.layers.is_empty() && self.layers.iter().all(|l| l.has_vri)
    }
}

/// Builds [`LtvReport`]s.
pub struct SignatureInspector {
    provider: Box<dyn CryptoProvider>,
}

impl SignatureInspector {
    /// Inspector using the default crypto provider.
    pub fn new() -> Self {
        Self {
            provider: Box::new(DefaultCryptoProvider::new()),
        }
    }

    /// Inspect `document`.
    pub fn inspect(&self, document: &dyn DocumentContainer) -> Result<LtvReport> {
        let bytes = document.bytes();
        let store = document
            .read_dss()?
            .map(|contents| DocumentSecurityStore::from_contents(&contents, self.provider.as_ref()));

        let layers = document
            .signatures()?
            .iter()
            .map(|field| self.layer(bytes, field, store.as_ref()))
            .collect();

        let dss = store.map(|store| DssReport {
            certificates: store.certificate_count(),
            ocsps: store.ocsp_count(),
            crls: store.crl_count(),
            vri_keys: store.vri_keys().map(str::to_string).collect(),
        });

        Ok(LtvReport {
            file_size: bytes.len(),
            layers,
            dss,
        })
    }

    fn layer(&self, bytes: &[u8], field: &SignatureField, store: Option<&DocumentSecurityStore>) -> LayerReport {
        let vri_key = field.vri_key(self.provider.as_ref());
        let view = cades::parse_signed_data(&field.contents).ok();

        LayerReport {
            field_name: field.name.clone(),
            kind: if field.is_document_timestamp() {
                "document-timestamp"
            } else {
                "signature"
            },
            sub_filter: field.sub_filter.map(|s| s.as_pdf_name()),
            byte_range: field.byte_range,
            has_vri: store.map_or(false, |s| s.vri(&vri_key).is_some()),
            vri_key,
            covers_whole_document: field.covers(bytes.len()),
            digest_matches: view.as_ref().and_then(|v| self.digest_matches(bytes, field, v)),
            embedded_certificates: view.as_ref().map_or(0, |v| v.certificates.len()),
            has_signature_timestamp: view.as_ref().map_or(false, |v| v.timestamp_token().is_some()),
            signer_name: field.signer_name.clone(),
            signing_time: field.signing_time.clone(),
        }
    }

    fn digest_matches(&self, bytes: &[u8], field: &SignatureField, view: &cades::SignedDataView) -> Option<bool> {
        let signed = ByteRangeCalculator::extract_signed_bytes(bytes, &field.byte_range).ok()?;
        if field.is_document_timestamp() {
            let tst = view.tst_info().ok()?;
            let algorithm = tst.digest_algorithm()?;
            Some(self.provider.digest(algorithm, &signed) == tst.imprint())
        } else {
            let algorithm = view.digest_algorithm?;
            Some(Some(self.provider.digest(algorithm, &signed)) == view.message_digest())
        }
    }
}

impl Default for SignatureInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::IncrementalDocument;

    #[test]
    fn test_unsigned_document_report() {
        let pdf = b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
trailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";
        let document = IncrementalDocument::open(pdf.to_vec()).unwrap();
        let report = SignatureInspector::new().inspect(&document).unwrap();
        assert_eq!(report.file_size, pdf.len());
        assert!(report.layers.is_empty());
        assert!(report.dss.is_none());
        assert!(!report.is_fully_indexed());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["layers"], serde_json::json!([]));
        assert!(json["dss"].is_null());
    }
}
