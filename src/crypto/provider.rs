//! Default crypto backend: RustCrypto hashes, `x509-parser` for
//! certificates and CRLs, and `der` decoding for OCSP responses.

use chrono::{DateTime, TimeZone, Utc};
use der::{Decode, Encode};
use sha2::Digest;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_OCSP;
use x509_parser::{parse_x509_certificate, parse_x509_crl};

use super::{CertificateInfo, CrlInfo, CryptoProvider, OcspCertStatus, OcspInfo};
use crate::asn1;
use crate::asn1::ocsp::{BasicOcspResponse, CertStatus, OcspResponse};
use crate::error::{Error, Result};
use crate::signatures::DigestAlgorithm;

/// Provider backed by `sha1`, `sha2` and `x509-parser`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCryptoProvider;

impl DefaultCryptoProvider {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| Error::Certificate(format!("Timestamp out of range: {}", timestamp)))
}

impl CryptoProvider for DefaultCryptoProvider {
    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
        match algorithm {
            DigestAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    fn inspect_certificate(&self, der: &[u8]) -> Result<CertificateInfo> {
        let (_, cert) = parse_x509_certificate(der)
            .map_err(|e| Error::Certificate(format!("Failed to parse certificate: {}", e)))?;

        let mut ocsp_urls = Vec::new();
        let mut crl_urls = Vec::new();
        for extension in cert.extensions() {
            match extension.parsed_extension() {
                ParsedExtension::AuthorityInfoAccess(aia) => {
                    for desc in &aia.accessdescs {
                        if desc.access_method == OID_PKIX_ACCESS_DESCRIPTOR_OCSP {
                            if let GeneralName::URI(uri) = &desc.access_location {
                                ocsp_urls.push(uri.to_string());
                            }
                        }
                    }
                },
                ParsedExtension::CRLDistributionPoints(cdp) => {
                    for point in cdp.points.iter() {
                        if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                            for name in names {
                                if let GeneralName::URI(uri) = name {
                                    crl_urls.push(uri.to_string());
                                }
                            }
                        }
                    }
                },
                _ => {},
            }
        }

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        Ok(CertificateInfo {
            subject: cert.subject().as_raw().to_vec(),
            issuer: cert.issuer().as_raw().to_vec(),
            serial: cert.tbs_certificate.raw_serial().to_vec(),
            common_name,
            not_after: to_utc(cert.validity().not_after.timestamp())?,
            ocsp_urls,
            crl_urls,
            subject_public_key: cert.public_key().subject_public_key.data.to_vec(),
        })
    }

    fn inspect_ocsp(&self, der: &[u8]) -> Result<OcspInfo> {
        let basic = match OcspResponse::from_der(der) {
            Ok(response) => response.basic()?,
            Err(envelope) => BasicOcspResponse::from_der(der)
                .map_err(|_| Error::Asn1(format!("Malformed OCSP response: {}", envelope)))?,
        };
        basic_response_info(basic)
    }

    fn inspect_crl(&self, der: &[u8]) -> Result<CrlInfo> {
        let (_, crl) = parse_x509_crl(der)
            .map_err(|e| Error::Certificate(format!("Failed to parse CRL: {}", e)))?;

        let next_update = match crl.next_update() {
            Some(time) => Some(to_utc(time.timestamp())?),
            None => None,
        };

        Ok(CrlInfo {
            issuer: crl.issuer().as_raw().to_vec(),
            crl_number: crl.crl_number().map(|n| n.to_bytes_be()),
            this_update: to_utc(crl.last_update().timestamp())?,
            next_update,
            revoked_serials: crl
                .iter_revoked_certificates()
                .map(|revoked| revoked.raw_serial().to_vec())
                .collect(),
        })
    }
}

/// Summarise a BasicOCSPResponse by its first SingleResponse.
fn basic_response_info(basic: BasicOcspResponse) -> Result<OcspInfo> {
    let data = basic.tbs_response_data;
    let single = data
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| Error::Asn1("OCSP response without SingleResponse".to_string()))?;

    let cert_status = match single.cert_status {
        CertStatus::Good(_) => OcspCertStatus::Good,
        CertStatus::Revoked(info) => OcspCertStatus::Revoked(asn1::from_generalized_time(&info.revocation_time)?),
        CertStatus::Unknown(_) => OcspCertStatus::Unknown,
    };
    let next_update = match &single.next_update {
        Some(time) => Some(asn1::from_generalized_time(time)?),
        None => None,
    };
    let certificates = basic
        .certs
        .unwrap_or_default()
        .iter()
        .map(Encode::to_der)
        .collect::<der::Result<Vec<_>>>()?;

    Ok(OcspInfo {
        hash_algorithm: asn1::digest_algorithm(&single.cert_id.hash_algorithm),
        issuer_name_hash: single.cert_id.issuer_name_hash.as_bytes().to_vec(),
        serial: single.cert_id.serial_number.as_bytes().to_vec(),
        cert_status,
        produced_at: asn1::from_generalized_time(&data.produced_at)?,
        this_update: asn1::from_generalized_time(&single.this_update)?,
        next_update,
        certificates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::ocsp::{CertId, CrlReason, ResponderId, ResponseData, RevokedInfo, SingleResponse};
    use der::asn1::{BitString, Null, OctetString};
    use spki::AlgorithmIdentifierOwned;
    use x509_cert::serial_number::SerialNumber;

    fn produced() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
    }

    fn basic_response(cert_status: CertStatus, with_next_update: bool) -> BasicOcspResponse {
        let t = produced();
        let time = |t: DateTime<Utc>| asn1::to_generalized_time(&t).unwrap();
        BasicOcspResponse {
            tbs_response_data: ResponseData {
                version: 0,
                responder_id: ResponderId::ByKey(OctetString::new(vec![3; 20]).unwrap()),
                produced_at: time(t),
                responses: vec![SingleResponse {
                    cert_id: CertId {
                        hash_algorithm: asn1::digest_algorithm_identifier(DigestAlgorithm::Sha1),
                        issuer_name_hash: OctetString::new(vec![1; 20]).unwrap(),
                        issuer_key_hash: OctetString::new(vec![2; 20]).unwrap(),
                        serial_number: SerialNumber::new(&[77]).unwrap(),
                    },
                    cert_status,
                    this_update: time(t),
                    next_update: with_next_update.then(|| time(t + chrono::Duration::days(1))),
                    single_extensions: None,
                }],
                response_extensions: None,
            },
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: asn1::oid::ECDSA_SHA256,
                parameters: None,
            },
            signature: BitString::from_bytes(&[0, 1, 2]).unwrap(),
            certs: None,
        }
    }

    #[test]
    fn test_digest_lengths() {
        let provider = DefaultCryptoProvider::new();
        assert_eq!(provider.digest(DigestAlgorithm::Sha1, b"abc").len(), 20);
        assert_eq!(provider.digest(DigestAlgorithm::Sha384, b"abc").len(), 48);
        assert_eq!(
            crate::writer::bytes_to_hex(&provider.digest(DigestAlgorithm::Sha1, b"abc")),
            "A9993E364706816ABA3E25717850C26C9CD0D89D"
        );
    }

    #[test]
    fn test_inspect_basic_ocsp() {
        let der = basic_response(CertStatus::Good(Null), true).to_der().unwrap();
        let info = DefaultCryptoProvider.inspect_ocsp(&der).unwrap();
        assert_eq!(info.hash_algorithm, Some(DigestAlgorithm::Sha1));
        assert_eq!(info.issuer_name_hash, vec![1; 20]);
        assert_eq!(info.serial, vec![77]);
        assert_eq!(info.cert_status, OcspCertStatus::Good);
        assert_eq!(info.produced_at, produced());
        assert_eq!(info.next_update, Some(info.this_update + chrono::Duration::days(1)));
    }

    #[test]
    fn test_inspect_wrapped_ocsp() {
        let response = OcspResponse::successful(&basic_response(CertStatus::Unknown(Null), false)).unwrap();
        let info = DefaultCryptoProvider.inspect_ocsp(&response.to_der().unwrap()).unwrap();
        assert!(info.next_update.is_none());
        assert!(info.certificates.is_empty());
        assert_eq!(info.cert_status, OcspCertStatus::Unknown);
    }

    #[test]
    fn test_revoked_status_carries_time() {
        let revoked_at = produced() - chrono::Duration::days(3);
        let status = CertStatus::Revoked(RevokedInfo {
            revocation_time: asn1::to_generalized_time(&revoked_at).unwrap(),
            revocation_reason: Some(CrlReason::KeyCompromise),
        });
        let der = basic_response(status, true).to_der().unwrap();
        let info = DefaultCryptoProvider.inspect_ocsp(&der).unwrap();
        assert_eq!(info.cert_status, OcspCertStatus::Revoked(revoked_at));
    }

    #[test]
    fn test_unsuccessful_ocsp_status() {
        // OCSPResponse { responseStatus unauthorized }
        assert!(matches!(
            DefaultCryptoProvider.inspect_ocsp(&[0x30, 0x03, 0x0A, 0x01, 0x06]),
            Err(Error::TrustService(_))
        ));
        assert!(matches!(
            DefaultCryptoProvider.inspect_ocsp(b"\x30\x02\x05\x00"),
            Err(Error::Asn1(_))
        ));
    }

    #[test]
    fn test_garbage_certificate_rejected() {
        assert!(DefaultCryptoProvider.inspect_certificate(b"not a certificate").is_err());
        assert!(DefaultCryptoProvider.inspect_crl(b"not a crl").is_err());
    }
}
