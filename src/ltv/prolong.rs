//! Prolongation of LTV-enabled signatures.
//!
//! A signature is eligible when the document security store indexes it in a
//! VRI. Prolongation refreshes the evidence of eligible signatures that is
//! missing or about to lapse, then the caller seals everything with a new
//! document timestamp.

use chrono::{DateTime, Duration, Utc};

use super::collector::RevocationEvidenceCollector;
use super::dss::DocumentSecurityStore;
use crate::cades;
use crate::container::{DocumentContainer, SignatureField};
use crate::crypto::{Certificate, CryptoProvider};
use crate::error::{Error, Result};
use crate::ltv::RevocationEvidence;

/// A signature whose evidence must be (re)collected.
#[derive(Debug, Clone)]
pub struct PendingSignature {
    /// Field name
    pub field_name: String,
    /// VRI key
    pub vri_key: String,
    /// Certificates to collect evidence for
    pub certificates: Vec<Certificate>,
}

/// State of a document before prolongation.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// Store read from the document
    pub store: DocumentSecurityStore,
    /// Number of signatures indexed by a VRI
    pub eligible: usize,
    /// Indexed signatures with missing or lapsing evidence
    pub stale: Vec<PendingSignature>,
    /// Document timestamps without a VRI
    pub unindexed_timestamps: Vec<PendingSignature>,
}

impl Assessment {
    /// Some evidence must be fetched.
    pub fn needs_revocation(&self) -> bool {
        !self.stale.is_empty() || !self.unindexed_timestamps.is_empty()
    }

    /// Certificates evidence will be fetched for.
    pub fn pending_certificates(&self) -> Vec<Certificate> {
        let mut out: Vec<Certificate> = Vec::new();
        for cert in self
            .stale
            .iter()
            .chain(self.unindexed_timestamps.iter())
            .flat_map(|p| p.certificates.iter())
        {
            if !out.contains(cert) {
                out.push(cert.clone());
            }
        }
        out
    }
}

/// Locates LTV-enabled signatures and extends their validity.
pub struct ProlongationEngine<'a> {
    provider: &'a dyn CryptoProvider,
    refresh_margin: Duration,
    now: DateTime<Utc>,
}

impl<'a> ProlongationEngine<'a> {
    /// Engine judging staleness against the current time.
    pub fn new(provider: &'a dyn CryptoProvider, refresh_margin: Duration) -> Self {
        Self {
            provider,
            refresh_margin,
            now: Utc::now(),
        }
    }

    /// Judge staleness as of `now`.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Read the document and decide what needs refreshing.
    ///
    /// Fails with [`Error::NoSignaturesToProlong`] when no signature is
    /// indexed in the document security store.
    pub fn assess(&self, document: &dyn DocumentContainer) -> Result<Assessment> {
        let signatures = document.signatures()?;
        let store = match document.read_dss()? {
            Some(contents) => DocumentSecurityStore::from_contents(&contents, self.provider),
            None => return Err(Error::NoSignaturesToProlong),
        };

        let mut eligible = 0;
        let mut stale = Vec::new();
        let mut unindexed_timestamps = Vec::new();
        for signature in &signatures {
            let key = signature.vri_key(self.provider);
            if store.vri(&key).is_some() {
                eligible += 1;
                if let Some(pending) = self.check_signature(signature, &key, &store) {
                    stale.push(pending);
                }
            } else if signature.is_document_timestamp() {
                match self.token_certificates(signature) {
                    Ok(certificates) => unindexed_timestamps.push(PendingSignature {
                        field_name: signature.name.clone(),
                        vri_key: key,
                        certificates,
                    }),
                    Err(e) => log::warn!("Cannot read timestamp {}: {}", signature.name, e),
                }
            }
        }

        if eligible == 0 {
            return Err(Error::NoSignaturesToProlong);
        }
        log::info!(
            "{} of {} signatures are LTV-enabled, {} need fresh evidence",
            eligible,
            signatures.len(),
            stale.len()
        );
        Ok(Assessment {
            store,
            eligible,
            stale,
            unindexed_timestamps,
        })
    }

    /// Collect evidence for every pending signature and fold it into the store.
    pub fn refresh(
        &self,
        assessment: Assessment,
        collector: &RevocationEvidenceCollector<'_>,
    ) -> DocumentSecurityStore {
        let mut store = assessment.store;
        let pool = store.parsed_certificates(self.provider);

        for pending in &assessment.stale {
            log::debug!("Refreshing evidence of {}", pending.field_name);
            let evidence = collector.collect(&pending.certificates, &pool);
            store.record_vri(&pending.vri_key, &[], &evidence, self.now, self.provider);
        }
        for pending in &assessment.unindexed_timestamps {
            log::debug!("Indexing document timestamp {}", pending.field_name);
            let evidence = if collector.has_clients() {
                collector.collect(&pending.certificates, &pool)
            } else {
                RevocationEvidence::new()
            };
            let ders: Vec<&[u8]> = pending.certificates.iter().map(Certificate::der).collect();
            store.record_vri(&pending.vri_key, &ders, &evidence, self.now, self.provider);
        }
        store
    }

    fn token_certificates(&self, signature: &SignatureField) -> Result<Vec<Certificate>> {
        cades::parse_signed_data(&signature.contents)?
            .certificates
            .into_iter()
            .map(|der| Certificate::from_der(der, self.provider))
            .collect()
    }

    /// `Some` when the signature's VRI lacks evidence for a certificate, its
    /// evidence lapses within the margin, or a certificate expires within it.
    fn check_signature(
        &self,
        signature: &SignatureField,
        key: &str,
        store: &DocumentSecurityStore,
    ) -> Option<PendingSignature> {
        let deadline = self.now + self.refresh_margin;
        let certificates: Vec<Certificate> = store
            .vri_certificates(key)
            .into_iter()
            .filter_map(|der| Certificate::from_der(der.to_vec(), self.provider).ok())
            .collect();
        let evidence = store.vri_evidence(key);

        let mut reasons = Vec::new();
        for cert in &certificates {
            if cert.info().not_after <= deadline {
                reasons.push(format!("{} expires {}", cert.label(), cert.info().not_after));
            }
            if cert.is_self_issued() {
                continue;
            }
            let newest = evidence
                .iter()
                .filter(|item| item.covers(cert, self.provider))
                .max_by_key(|item| item.this_update);
            match newest {
                None => reasons.push(format!("no evidence for {}", cert.label())),
                Some(item) => {
                    if let Some(next_update) = item.next_update {
                        if next_update <= deadline {
                            reasons.push(format!("evidence for {} lapses {}", cert.label(), next_update));
                        }
                    }
                },
            }
        }

        if reasons.is_empty() {
            log::debug!("Evidence of {} is current", signature.name);
            return None;
        }
        log::info!("Signature {} is stale: {}", signature.name, reasons.join("; "));
        Some(PendingSignature {
            field_name: signature.name.clone(),
            vri_key: key.to_string(),
            certificates,
        })
    }
}
