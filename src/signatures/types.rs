//! Digital signature types and data structures.

use chrono::{DateTime, Utc};

use der::asn1::ObjectIdentifier;
use pkcs8::AssociatedOid;

/// Digest algorithm used for signing and timestamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    /// SHA-1 (only for VRI keys and OCSP CertIDs)
    Sha1,
    /// SHA-256 (recommended)
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// OID of this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => sha1::Sha1::OID,
            DigestAlgorithm::Sha256 => sha2::Sha256::OID,
            DigestAlgorithm::Sha384 => sha2::Sha384::OID,
            DigestAlgorithm::Sha512 => sha2::Sha512::OID,
        }
    }

    /// Look up an algorithm by OID.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|algorithm| algorithm.oid() == *oid)
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }
}

/// Signature sub-filter type (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached, found in documents signed elsewhere
    Pkcs7Detached,
    /// ETSI.CAdES.detached, PAdES approval signature
    #[default]
    CadesDetached,
    /// ETSI.RFC3161, document timestamp
    Rfc3161,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
            SignatureSubFilter::Rfc3161 => "ETSI.RFC3161",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            "ETSI.RFC3161" => Some(SignatureSubFilter::Rfc3161),
            _ => None,
        }
    }

    /// Whether layers with this sub-filter are document timestamps.
    pub fn is_document_timestamp(&self) -> bool {
        matches!(self, SignatureSubFilter::Rfc3161)
    }
}

/// PAdES baseline level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BaselineLevel {
    /// B-B: bare CAdES signature
    B,
    /// B-T: signature timestamp added
    T,
    /// B-LT: revocation evidence embedded
    Lt,
    /// B-LTA: archive document timestamp added
    Lta,
}

impl BaselineLevel {
    /// Short profile label.
    pub fn label(&self) -> &'static str {
        match self {
            BaselineLevel::B => "B",
            BaselineLevel::T => "T",
            BaselineLevel::Lt => "LT",
            BaselineLevel::Lta => "LTA",
        }
    }

    /// Full profile name.
    pub fn profile(&self) -> &'static str {
        match self {
            BaselineLevel::B => "PAdES-B-B",
            BaselineLevel::T => "PAdES-B-T",
            BaselineLevel::Lt => "PAdES-B-LT",
            BaselineLevel::Lta => "PAdES-B-LTA",
        }
    }

    /// Whether the level carries a signature timestamp.
    pub fn needs_timestamp(&self) -> bool {
        *self >= BaselineLevel::T
    }

    /// Whether the level embeds revocation evidence.
    pub fn needs_revocation(&self) -> bool {
        *self >= BaselineLevel::Lt
    }
}

/// Widget rectangle in default user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Lower-left x
    pub x: f32,
    /// Lower-left y
    pub y: f32,
    /// Width of rectangle
    pub width: f32,
    /// Height of rectangle
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle from position and dimensions.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Signing metadata for an approval signature.
///
/// Consumed as-is; a signature without a rectangle gets an invisible widget.
#[derive(Debug, Clone, Default)]
pub struct SignerProperties {
    /// Signature field name; the first free `SignatureN` when unset
    pub field_name: Option<String>,
    /// Page (0-indexed) carrying the widget
    pub page: usize,
    /// Widget rectangle
    pub rect: Option<Rect>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Name of the signer (if different from certificate CN)
    pub signer_name: Option<String>,
    /// Claimed signing time; defaults to now
    pub signing_time: Option<DateTime<Utc>>,
}

impl SignerProperties {
    /// Create empty properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signature field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }

    /// Place a visible widget on `page`.
    pub fn with_page_rect(mut self, page: usize, rect: Rect) -> Self {
        self.page = page;
        self.rect = Some(rect);
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set contact information.
    pub fn with_contact_info(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = Some(contact.into());
        self
    }

    /// Set the signer name.
    pub fn with_signer_name(mut self, name: impl Into<String>) -> Self {
        self.signer_name = Some(name.into());
        self
    }

    /// Set the claimed signing time.
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }
}
