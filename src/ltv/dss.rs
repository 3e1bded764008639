//! Document security store merging.
//!
//! The store only ever grows. Certificates are identified by their SHA-256
//! fingerprint and evidence by its [`EvidenceKey`], so folding the same
//! material in twice leaves the store unchanged.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use indexmap::{IndexMap, IndexSet};

use super::evidence::{EvidenceItem, EvidenceKey, EvidenceKind, RevocationEvidence};
use crate::container::{Blob, DssContents, DssWrite, VriWrite};
use crate::crypto::{Certificate, CryptoProvider};
use crate::object::ObjectRef;
use crate::signatures::DigestAlgorithm;

/// SHA-256 of a certificate.
pub type Fingerprint = Vec<u8>;

#[derive(Debug, Clone)]
struct StoredCertificate {
    der: Vec<u8>,
    object: Option<ObjectRef>,
}

#[derive(Debug, Clone)]
struct StoredEvidence {
    item: EvidenceItem,
    object: Option<ObjectRef>,
}

/// Entries of one signature's VRI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VriRecord {
    /// Certificate fingerprints
    pub certs: IndexSet<Fingerprint>,
    /// OCSP response keys
    pub ocsps: IndexSet<EvidenceKey>,
    /// CRL keys
    pub crls: IndexSet<EvidenceKey>,
    /// `/TU`
    pub created: DateTime<Utc>,
}

impl VriRecord {
    fn new(created: DateTime<Utc>) -> Self {
        Self {
            certs: IndexSet::new(),
            ocsps: IndexSet::new(),
            crls: IndexSet::new(),
            created,
        }
    }
}

/// Cumulative union of certificates, OCSP responses and CRLs.
#[derive(Debug, Clone, Default)]
pub struct DocumentSecurityStore {
    certs: IndexMap<Fingerprint, StoredCertificate>,
    ocsps: IndexMap<EvidenceKey, StoredEvidence>,
    crls: IndexMap<EvidenceKey, StoredEvidence>,
    vri: BTreeMap<String, VriRecord>,
}

fn parse_pdf_date(text: &str) -> Option<DateTime<Utc>> {
    let digits = text.strip_prefix("D:").unwrap_or(text).get(..14)?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl DocumentSecurityStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store embedded in a document.
    ///
    /// Loaded entries keep their object references and are not rewritten.
    pub fn from_contents(contents: &DssContents, provider: &dyn CryptoProvider) -> Self {
        let mut store = Self::new();
        let mut cert_ids: BTreeMap<ObjectRef, Fingerprint> = BTreeMap::new();
        let mut ocsp_ids: BTreeMap<ObjectRef, EvidenceKey> = BTreeMap::new();
        let mut crl_ids: BTreeMap<ObjectRef, EvidenceKey> = BTreeMap::new();

        for blob in &contents.certs {
            let fingerprint = store.insert_certificate(&blob.data, Some(blob.reference), provider);
            cert_ids.insert(blob.reference, fingerprint);
        }
        for blob in &contents.ocsps {
            let item = EvidenceItem::ocsp(blob.data.clone(), provider);
            ocsp_ids.insert(blob.reference, item.key.clone());
            store.ocsps.entry(item.key.clone()).or_insert(StoredEvidence {
                item,
                object: Some(blob.reference),
            });
        }
        for blob in &contents.crls {
            let item = EvidenceItem::crl(blob.data.clone(), provider);
            crl_ids.insert(blob.reference, item.key.clone());
            store.crls.entry(item.key.clone()).or_insert(StoredEvidence {
                item,
                object: Some(blob.reference),
            });
        }

        for (key, entry) in &contents.vri {
            let created = entry
                .created
                .as_deref()
                .and_then(parse_pdf_date)
                .unwrap_or_else(Utc::now);
            let mut record = VriRecord::new(created);
            record.certs.extend(entry.certs.iter().filter_map(|r| cert_ids.get(r).cloned()));
            record.ocsps.extend(entry.ocsps.iter().filter_map(|r| ocsp_ids.get(r).cloned()));
            record.crls.extend(entry.crls.iter().filter_map(|r| crl_ids.get(r).cloned()));
            store.vri.insert(key.to_uppercase(), record);
        }
        store
    }

    fn insert_certificate(
        &mut self,
        der: &[u8],
        object: Option<ObjectRef>,
        provider: &dyn CryptoProvider,
    ) -> Fingerprint {
        let fingerprint = provider.digest(DigestAlgorithm::Sha256, der);
        self.certs
            .entry(fingerprint.clone())
            .or_insert_with(|| StoredCertificate {
                der: der.to_vec(),
                object,
            });
        fingerprint
    }

    fn insert_evidence(&mut self, item: &EvidenceItem) {
        let map = match item.kind {
            EvidenceKind::Ocsp => &mut self.ocsps,
            EvidenceKind::Crl => &mut self.crls,
        };
        map.entry(item.key.clone()).or_insert_with(|| StoredEvidence {
            item: item.clone(),
            object: None,
        });
    }

    /// Add a certificate.
    pub fn add_certificate(&mut self, der: &[u8], provider: &dyn CryptoProvider) -> Fingerprint {
        self.insert_certificate(der, None, provider)
    }

    /// Fold a batch of evidence into the store, responder certificates included.
    pub fn merge(&mut self, evidence: &RevocationEvidence, provider: &dyn CryptoProvider) {
        for item in evidence.items() {
            self.insert_evidence(item);
            for der in &item.certificates {
                self.insert_certificate(der, None, provider);
            }
        }
    }

    /// Merge `evidence` and index it, with `certificates`, under `vri_key`.
    ///
    /// An existing VRI keeps its entries and gains the new ones.
    pub fn record_vri(
        &mut self,
        vri_key: &str,
        certificates: &[&[u8]],
        evidence: &RevocationEvidence,
        created: DateTime<Utc>,
        provider: &dyn CryptoProvider,
    ) {
        self.merge(evidence, provider);
        let responder_certs = evidence
            .items()
            .flat_map(|item| item.certificates.iter().map(Vec::as_slice));
        let certs: Vec<Fingerprint> = certificates
            .iter()
            .copied()
            .chain(responder_certs)
            .map(|der| self.insert_certificate(der, None, provider))
            .collect();

        let record = self
            .vri
            .entry(vri_key.to_uppercase())
            .or_insert_with(|| VriRecord::new(created));
        record.certs.extend(certs);
        for item in evidence.items() {
            match item.kind {
                EvidenceKind::Ocsp => record.ocsps.insert(item.key.clone()),
                EvidenceKind::Crl => record.crls.insert(item.key.clone()),
            };
        }
    }

    /// Number of certificates.
    pub fn certificate_count(&self) -> usize {
        self.certs.len()
    }

    /// Number of OCSP responses.
    pub fn ocsp_count(&self) -> usize {
        self.ocsps.len()
    }

    /// Number of CRLs.
    pub fn crl_count(&self) -> usize {
        self.crls.len()
    }

    /// VRI keys.
    pub fn vri_keys(&self) -> impl Iterator<Item = &str> {
        self.vri.keys().map(String::as_str)
    }

    /// VRI for a signature.
    pub fn vri(&self, key: &str) -> Option<&VriRecord> {
        self.vri.get(&key.to_uppercase())
    }

    /// Certificates a VRI references, as DER.
    pub fn vri_certificates(&self, key: &str) -> Vec<&[u8]> {
        self.vri(key)
            .map(|record| {
                record
                    .certs
                    .iter()
                    .filter_map(|fp| self.certs.get(fp))
                    .map(|stored| stored.der.as_slice())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Evidence a VRI references.
    pub fn vri_evidence(&self, key: &str) -> Vec<&EvidenceItem> {
        self.vri(key)
            .map(|record| {
                record
                    .ocsps
                    .iter()
                    .filter_map(|k| self.ocsps.get(k))
                    .chain(record.crls.iter().filter_map(|k| self.crls.get(k)))
                    .map(|stored| &stored.item)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All certificates, as DER.
    pub fn certificates(&self) -> impl Iterator<Item = &[u8]> {
        self.certs.values().map(|c| c.der.as_slice())
    }

    /// Every certificate that parses.
    pub fn parsed_certificates(&self, provider: &dyn CryptoProvider) -> Vec<Certificate> {
        self.certificates()
            .filter_map(|der| Certificate::from_der(der.to_vec(), provider).ok())
            .collect()
    }

    /// Plan for the next DSS revision.
    pub fn to_write(&self) -> DssWrite {
        fn blob(data: &[u8], object: Option<ObjectRef>) -> Blob {
            match object {
                Some(reference) => Blob::Existing(reference),
                None => Blob::New(data.to_vec()),
            }
        }

        let vri = self
            .vri
            .iter()
            .map(|(key, record)| {
                let write = VriWrite {
                    certs: record.certs.iter().filter_map(|fp| self.certs.get_index_of(fp)).collect(),
                    ocsps: record.ocsps.iter().filter_map(|k| self.ocsps.get_index_of(k)).collect(),
                    crls: record.crls.iter().filter_map(|k| self.crls.get_index_of(k)).collect(),
                    created: record.created,
                };
                (key.clone(), write)
            })
            .collect();

        DssWrite {
            certs: self.certs.values().map(|c| blob(&c.der, c.object)).collect(),
            ocsps: self.ocsps.values().map(|e| blob(&e.item.data, e.object)).collect(),
            crls: self.crls.values().map(|e| blob(&e.item.data, e.object)).collect(),
            vri,
        }
    }
}
