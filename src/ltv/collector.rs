//! Revocation evidence collection.

use super::evidence::{EvidenceItem, RevocationEvidence};
use crate::clients::{CrlClient, OcspClient};
use crate::crypto::{Certificate, CryptoProvider, OcspCertStatus};
use crate::error::{Error, Result};

/// Gathers OCSP responses and CRLs for certificates.
///
/// OCSP is tried first; CRLs are fetched when no usable OCSP response
/// comes back.
/// A failure for one certificate is recorded as a gap and never aborts the
/// rest of the batch.
pub struct RevocationEvidenceCollector<'a> {
    provider: &'a dyn CryptoProvider,
    ocsp: Option<&'a dyn OcspClient>,
    crl: Option<&'a dyn CrlClient>,
}

impl<'a> RevocationEvidenceCollector<'a> {
    /// Create a collector.
    pub fn new(
        provider: &'a dyn CryptoProvider,
        ocsp: Option<&'a dyn OcspClient>,
        crl: Option<&'a dyn CrlClient>,
    ) -> Self {
        Self { provider, ocsp, crl }
    }

    /// Whether any client is available.
    pub fn has_clients(&self) -> bool {
        self.ocsp.is_some() || self.crl.is_some()
    }

    /// Collect evidence for every certificate of `targets`.
    ///
    /// Issuers are looked up by name in `targets` and `pool`. Self-issued
    /// certificates are trust anchors and are skipped.
    pub fn collect(&self, targets: &[Certificate], pool: &[Certificate]) -> RevocationEvidence {
        let mut evidence = RevocationEvidence::new();
        for certificate in targets {
            if certificate.is_self_issued() {
                log::debug!("Skipping trust anchor {}", certificate.label());
                continue;
            }
            let issuer = targets
                .iter()
                .chain(pool.iter())
                .find(|candidate| *candidate != certificate && certificate.is_issued_by(candidate));

            let mut failures = Vec::new();
            if self.try_ocsp(certificate, issuer, &mut evidence, &mut failures) {
                continue;
            }
            if self.try_crl(certificate, &mut evidence, &mut failures) {
                continue;
            }
            evidence.push_gap(certificate, failures.join("; "));
        }
        log::info!(
            "Collected {} revocation items, {} gaps",
            evidence.len(),
            evidence.gaps().len()
        );
        evidence
    }

    /// [`Self::collect`], failing with [`Error::RevocationUnavailable`] when
    /// nothing at all was obtained.
    pub fn collect_mandatory(
        &self,
        targets: &[Certificate],
        pool: &[Certificate],
    ) -> Result<RevocationEvidence> {
        let evidence = self.collect(targets, pool);
        if evidence.is_empty() {
            return Err(Error::RevocationUnavailable);
        }
        Ok(evidence)
    }

    fn try_ocsp(
        &self,
        certificate: &Certificate,
        issuer: Option<&Certificate>,
        evidence: &mut RevocationEvidence,
        failures: &mut Vec<String>,
    ) -> bool {
        let (client, issuer) = match (self.ocsp, issuer) {
            (Some(client), Some(issuer)) => (client, issuer),
            (None, _) => return false,
            (Some(_), None) => {
                failures.push("OCSP: issuer not available".to_string());
                return false;
            },
        };
        log::debug!("Fetching OCSP response for {}", certificate.label());
        let data = match client.fetch(certificate, issuer) {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                failures.push("OCSP: empty response".to_string());
                return false;
            },
            Err(e) => {
                failures.push(format!("OCSP: {}", e));
                return false;
            },
        };
        let info = match self.provider.inspect_ocsp(&data) {
            Ok(info) => info,
            Err(e) => {
                failures.push(format!("OCSP: {}", e));
                return false;
            },
        };
        match &info.cert_status {
            OcspCertStatus::Good => {},
            OcspCertStatus::Revoked(at) => log::warn!("OCSP reports {} revoked at {}", certificate.label(), at),
            OcspCertStatus::Unknown => log::warn!("OCSP responder does not know {}", certificate.label()),
        }
        evidence.push(EvidenceItem::inspected_ocsp(data, info));
        true
    }

    fn try_crl(
        &self,
        certificate: &Certificate,
        evidence: &mut RevocationEvidence,
        failures: &mut Vec<String>,
    ) -> bool {
        let client = match self.crl {
            Some(client) => client,
            None => {
                if self.ocsp.is_none() {
                    failures.push("no OCSP or CRL client".to_string());
                }
                return false;
            },
        };
        log::debug!("Fetching CRLs for {}", certificate.label());
        match client.fetch(certificate) {
            Ok(crls) if !crls.is_empty() => {
                for data in crls {
                    let item = match self.provider.inspect_crl(&data) {
                        Ok(info) => {
                            if info.revoked_serials.contains(&certificate.info().serial) {
                                log::warn!("CRL lists {} as revoked", certificate.label());
                            }
                            EvidenceItem::inspected_crl(data, info, self.provider)
                        },
                        Err(_) => EvidenceItem::crl(data, self.provider),
                    };
                    evidence.push(item);
                }
                true
            },
            Ok(_) => {
                failures.push("CRL: none returned".to_string());
                false
            },
            Err(e) => {
                failures.push(format!("CRL: {}", e));
                false
            },
        }
    }
}
