//! Cryptographic boundary.
//!
//! Everything above this module works with [`Certificate`] values and the
//! [`CryptoProvider`] / [`ExternalSignature`] traits; the concrete backends
//! ([`DefaultCryptoProvider`], [`PrivateKeySignature`]) can be swapped.

mod key;
mod provider;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::signatures::DigestAlgorithm;

pub use key::{ExternalSignature, PrivateKeySignature, SignatureAlgorithm};
pub use provider::DefaultCryptoProvider;

/// Fields of an X.509 certificate the engine relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// DER-encoded subject Name
    pub subject: Vec<u8>,
    /// DER-encoded issuer Name
    pub issuer: Vec<u8>,
    /// Serial number as INTEGER content octets
    pub serial: Vec<u8>,
    /// Subject common name, when present
    pub common_name: Option<String>,
    /// End of validity
    pub not_after: DateTime<Utc>,
    /// OCSP responder URLs (Authority Information Access)
    pub ocsp_urls: Vec<String>,
    /// CRL URLs (CRL Distribution Points)
    pub crl_urls: Vec<String>,
    /// Subject public key bits, unused-bits octet excluded
    pub subject_public_key: Vec<u8>,
}

/// A certificate with its inspected fields.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    info: CertificateInfo,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Inspect a DER-encoded certificate.
    pub fn from_der(der: Vec<u8>, provider: &dyn CryptoProvider) -> Result<Self> {
        let info = provider.inspect_certificate(&der)?;
        Ok(Self { der, info })
    }

    /// DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Inspected fields.
    pub fn info(&self) -> &CertificateInfo {
        &self.info
    }

    /// Subject and issuer names are identical.
    pub fn is_self_issued(&self) -> bool {
        self.info.subject == self.info.issuer
    }

    /// `issuer`'s subject names this certificate's issuer.
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        self.info.issuer == issuer.info.subject
    }

    /// Carries an OCSP or CRL access location.
    pub fn has_revocation_info(&self) -> bool {
        !self.info.ocsp_urls.is_empty() || !self.info.crl_urls.is_empty()
    }

    /// Display label for logs.
    pub fn label(&self) -> String {
        match &self.info.common_name {
            Some(cn) => cn.clone(),
            None => format!("serial {}", crate::writer::bytes_to_hex(&self.info.serial)),
        }
    }
}

/// Certificate chain, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    certificates: Vec<Certificate>,
}

impl CertificateChain {
    /// Create a chain; it must contain at least the leaf.
    pub fn new(certificates: Vec<Certificate>) -> Result<Self> {
        if certificates.is_empty() {
            return Err(Error::Certificate("Certificate chain is empty".to_string()));
        }
        Ok(Self { certificates })
    }

    /// Inspect DER-encoded certificates, leaf first.
    pub fn from_der(ders: Vec<Vec<u8>>, provider: &dyn CryptoProvider) -> Result<Self> {
        let certificates = ders
            .into_iter()
            .map(|der| Certificate::from_der(der, provider))
            .collect::<Result<Vec<_>>>()?;
        Self::new(certificates)
    }

    /// Signing certificate.
    pub fn leaf(&self) -> &Certificate {
        &self.certificates[0]
    }

    /// All certificates, leaf first.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Number of certificates.
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Iterate leaf first.
    pub fn iter(&self) -> std::slice::Iter<'_, Certificate> {
        self.certificates.iter()
    }

    /// Some certificate in the chain carries an OCSP or CRL location.
    pub fn has_revocation_info(&self) -> bool {
        self.certificates.iter().any(Certificate::has_revocation_info)
    }
}

/// Status reported for the certificate in an OCSP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspCertStatus {
    /// good
    Good,
    /// revoked at the given time
    Revoked(DateTime<Utc>),
    /// unknown
    Unknown,
}

/// Fields of a successful OCSP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspInfo {
    /// CertID hash algorithm
    pub hash_algorithm: Option<DigestAlgorithm>,
    /// CertID issuerNameHash
    pub issuer_name_hash: Vec<u8>,
    /// CertID serialNumber content octets
    pub serial: Vec<u8>,
    /// Certificate status
    pub cert_status: OcspCertStatus,
    /// producedAt
    pub produced_at: DateTime<Utc>,
    /// thisUpdate
    pub this_update: DateTime<Utc>,
    /// nextUpdate
    pub next_update: Option<DateTime<Utc>>,
    /// Responder certificates embedded in the response
    pub certificates: Vec<Vec<u8>>,
}

/// Fields of a CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlInfo {
    /// DER-encoded issuer Name
    pub issuer: Vec<u8>,
    /// CRL number extension, big-endian
    pub crl_number: Option<Vec<u8>>,
    /// thisUpdate
    pub this_update: DateTime<Utc>,
    /// nextUpdate
    pub next_update: Option<DateTime<Utc>>,
    /// Serial numbers of revoked certificates
    pub revoked_serials: Vec<Vec<u8>>,
}

/// Cryptographic primitives and parsers used by the engine.
pub trait CryptoProvider {
    /// Hash `data`.
    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8>;

    /// Inspect a DER-encoded X.509 certificate.
    fn inspect_certificate(&self, der: &[u8]) -> Result<CertificateInfo>;

    /// Inspect a DER-encoded OCSPResponse or BasicOCSPResponse.
    fn inspect_ocsp(&self, der: &[u8]) -> Result<OcspInfo>;

    /// Inspect a DER-encoded CRL.
    fn inspect_crl(&self, der: &[u8]) -> Result<CrlInfo>;
}
