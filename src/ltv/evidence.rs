//! Revocation evidence gathered during one operation.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::crypto::{Certificate, CrlInfo, CryptoProvider, OcspInfo};
use crate::signatures::DigestAlgorithm;

/// Identity of an evidence item: (issuer, serial, producedAt).
///
/// OCSP responses use the CertID issuer name hash and serial; CRLs use the
/// SHA-1 of the issuer name, the CRL number and `thisUpdate`. Items that
/// cannot be inspected are keyed by the SHA-256 of their bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvidenceKey {
    /// Issuer identity
    pub issuer: Vec<u8>,
    /// Serial number (or CRL number)
    pub serial: Vec<u8>,
    /// Production time, seconds since the epoch
    pub produced_at: i64,
}

/// Kind of an evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceKind {
    /// OCSPResponse
    Ocsp,
    /// CertificateList
    Crl,
}

/// Which certificates an item speaks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceScope {
    /// One certificate, as named in an OCSP CertID
    Certificate {
        /// CertID hash algorithm
        hash_algorithm: DigestAlgorithm,
        /// CertID issuerNameHash
        issuer_name_hash: Vec<u8>,
        /// CertID serialNumber
        serial: Vec<u8>,
    },
    /// Every certificate of one issuer
    Issuer(Vec<u8>),
    /// Not inspectable
    Unknown,
}

/// One OCSP response or CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceItem {
    /// OCSP or CRL
    pub kind: EvidenceKind,
    /// Deduplication identity
    pub key: EvidenceKey,
    /// DER encoding
    pub data: Vec<u8>,
    /// Covered certificates
    pub scope: EvidenceScope,
    /// Time the status was asserted (`thisUpdate`)
    pub this_update: Option<DateTime<Utc>>,
    /// `nextUpdate`
    pub next_update: Option<DateTime<Utc>>,
    /// Certificates embedded in the response (OCSP responder chain)
    pub certificates: Vec<Vec<u8>>,
}

fn content_key(data: &[u8], provider: &dyn CryptoProvider) -> EvidenceKey {
    EvidenceKey {
        issuer: Vec::new(),
        serial: provider.digest(DigestAlgorithm::Sha256, data),
        produced_at: 0,
    }
}

impl EvidenceItem {
    /// Classify an OCSP response.
    pub fn ocsp(data: Vec<u8>, provider: &dyn CryptoProvider) -> Self {
        match provider.inspect_ocsp(&data) {
            Ok(info) => Self::inspected_ocsp(data, info),
            Err(e) => {
                log::warn!("Keeping uninspectable OCSP response by content: {}", e);
                Self::opaque(EvidenceKind::Ocsp, data, provider)
            },
        }
    }

    /// Classify a CRL.
    pub fn crl(data: Vec<u8>, provider: &dyn CryptoProvider) -> Self {
        match provider.inspect_crl(&data) {
            Ok(info) => Self::inspected_crl(data, info, provider),
            Err(e) => {
                log::warn!("Keeping uninspectable CRL by content: {}", e);
                Self::opaque(EvidenceKind::Crl, data, provider)
            },
        }
    }

    /// Item for an OCSP response already inspected as `info`.
    pub fn inspected_ocsp(data: Vec<u8>, info: OcspInfo) -> Self {
        Self {
            kind: EvidenceKind::Ocsp,
            key: EvidenceKey {
                issuer: info.issuer_name_hash.clone(),
                serial: info.serial.clone(),
                produced_at: info.produced_at.timestamp(),
            },
            scope: EvidenceScope::Certificate {
                hash_algorithm: info.hash_algorithm.unwrap_or(DigestAlgorithm::Sha1),
                issuer_name_hash: info.issuer_name_hash,
                serial: info.serial,
            },
            this_update: Some(info.this_update),
            next_update: info.next_update,
            certificates: info.certificates,
            data,
        }
    }

    /// Item for a CRL already inspected as `info`.
    pub fn inspected_crl(data: Vec<u8>, info: CrlInfo, provider: &dyn CryptoProvider) -> Self {
        Self {
            kind: EvidenceKind::Crl,
            key: EvidenceKey {
                issuer: provider.digest(DigestAlgorithm::Sha1, &info.issuer),
                serial: info.crl_number.unwrap_or_default(),
                produced_at: info.this_update.timestamp(),
            },
            scope: EvidenceScope::Issuer(info.issuer),
            this_update: Some(info.this_update),
            next_update: info.next_update,
            certificates: Vec::new(),
            data,
        }
    }

    fn opaque(kind: EvidenceKind, data: Vec<u8>, provider: &dyn CryptoProvider) -> Self {
        Self {
            kind,
            key: content_key(&data, provider),
            scope: EvidenceScope::Unknown,
            this_update: None,
            next_update: None,
            certificates: Vec::new(),
            data,
        }
    }

    /// The item asserts the status of `certificate`.
    pub fn covers(&self, certificate: &Certificate, provider: &dyn CryptoProvider) -> bool {
        match &self.scope {
            EvidenceScope::Certificate {
                hash_algorithm,
                issuer_name_hash,
                serial,
            } => {
                *serial == certificate.info().serial
                    && *issuer_name_hash == provider.digest(*hash_algorithm, &certificate.info().issuer)
            },
            EvidenceScope::Issuer(issuer) => *issuer == certificate.info().issuer,
            EvidenceScope::Unknown => false,
        }
    }
}

/// A certificate for which no evidence could be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceGap {
    /// Certificate label
    pub certificate: String,
    /// Why nothing was obtained
    pub reason: String,
}

/// One batch of evidence, deduplicated by [`EvidenceKey`].
#[derive(Debug, Clone, Default)]
pub struct RevocationEvidence {
    items: IndexMap<(EvidenceKind, EvidenceKey), EvidenceItem>,
    gaps: Vec<EvidenceGap>,
}

impl RevocationEvidence {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `item` unless an item with the same kind and key is present.
    ///
    /// Returns whether the item was added.
    pub fn push(&mut self, item: EvidenceItem) -> bool {
        match self.items.entry((item.kind, item.key.clone())) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(item);
                true
            },
        }
    }

    /// Record a certificate without evidence.
    pub fn push_gap(&mut self, certificate: &Certificate, reason: impl Into<String>) {
        let gap = EvidenceGap {
            certificate: certificate.label(),
            reason: reason.into(),
        };
        log::warn!("No revocation evidence for {}: {}", gap.certificate, gap.reason);
        self.gaps.push(gap);
    }

    /// All items, in collection order.
    pub fn items(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items.values()
    }

    /// OCSP responses.
    pub fn ocsps(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items().filter(|i| i.kind == EvidenceKind::Ocsp)
    }

    /// CRLs.
    pub fn crls(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items().filter(|i| i.kind == EvidenceKind::Crl)
    }

    /// Certificates without evidence.
    pub fn gaps(&self) -> &[EvidenceGap] {
        &self.gaps
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// No item was collected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;

    #[test]
    fn test_opaque_items_keyed_by_content() {
        let provider = DefaultCryptoProvider::new();
        let a = EvidenceItem::crl(b"not a crl".to_vec(), &provider);
        let b = EvidenceItem::crl(b"not a crl".to_vec(), &provider);
        let c = EvidenceItem::crl(b"other".to_vec(), &provider);
        assert_eq!(a.key, b.key);
        assert_ne!(a.key, c.key);
        assert_eq!(a.scope, EvidenceScope::Unknown);
        assert!(a.key.issuer.is_empty());
    }

    #[test]
    fn test_push_deduplicates_by_kind_and_key() {
        let provider = DefaultCryptoProvider::new();
        let mut evidence = RevocationEvidence::new();
        assert!(evidence.push(EvidenceItem::ocsp(b"x".to_vec(), &provider)));
        assert!(!evidence.push(EvidenceItem::ocsp(b"x".to_vec(), &provider)));
        assert!(evidence.push(EvidenceItem::crl(b"x".to_vec(), &provider)));
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence.ocsps().count(), 1);
        assert_eq!(evidence.crls().count(), 1);
    }
}
