//! CAdES signatures and RFC 3161 timestamp tokens over CMS `SignedData`.
//!
//! Assembly follows RFC 5652 with a single SignerInfo identified by issuer
//! and serial number. Parsing reads back what the engine needs from
//! signatures and timestamp tokens embedded in a document: certificates,
//! attributes and the TSTInfo of a token.

use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec, Uint};
use der::{Decode, Encode};
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::name::GeneralName;

use crate::asn1::ess::{EssCertIdV2, IssuerSerial, SigningCertificateV2};
use crate::asn1::tsp::{MessageImprint, TimeStampReq, TimeStampResp, TstInfo};
use crate::asn1::{self, oid};
use crate::crypto::{Certificate, CryptoProvider, SignatureAlgorithm};
use crate::error::{Error, Result};
use crate::signatures::DigestAlgorithm;

/// `Attribute` with a single value.
pub fn attribute(attr_type: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid: attr_type,
        values: SetOfVec::try_from(vec![value])?,
    })
}

fn x509(certificate: &Certificate) -> Result<x509_cert::Certificate> {
    Ok(x509_cert::Certificate::from_der(certificate.der())?)
}

/// Signed attributes of a CAdES signature: content type, message digest
/// and the ESS signing-certificate-v2 reference to `signer`.
///
/// `content_type` is `id-data` for detached document signatures and
/// `id-ct-TSTInfo` for timestamp tokens.
pub fn cades_signed_attributes(
    content_type: ObjectIdentifier,
    message_digest: &[u8],
    signer: &Certificate,
    digest: DigestAlgorithm,
    provider: &dyn CryptoProvider,
) -> Result<SetOfVec<Attribute>> {
    let tbs = x509(signer)?.tbs_certificate;
    let ess_cert_id = EssCertIdV2 {
        hash_algorithm: (digest != DigestAlgorithm::Sha256).then(|| asn1::digest_algorithm_identifier(digest)),
        cert_hash: OctetString::new(provider.digest(digest, signer.der()))?,
        issuer_serial: Some(IssuerSerial {
            issuer: vec![GeneralName::DirectoryName(tbs.issuer)],
            serial_number: tbs.serial_number,
        }),
    };
    let signing_certificate = SigningCertificateV2 {
        certs: vec![ess_cert_id],
        policies: None,
    };

    let attributes = vec![
        attribute(oid::CONTENT_TYPE, Any::encode_from(&content_type)?)?,
        attribute(oid::MESSAGE_DIGEST, Any::encode_from(&OctetString::new(message_digest)?)?)?,
        attribute(oid::SIGNING_CERTIFICATE_V2, Any::encode_from(&signing_certificate)?)?,
    ];
    Ok(SetOfVec::try_from(attributes)?)
}

/// `SET OF Attribute`, the encoding that is signed.
pub fn encode_signed_attributes(attributes: &SetOfVec<Attribute>) -> Result<Vec<u8>> {
    Ok(attributes.to_der()?)
}

/// Inputs for the single SignerInfo of a SignedData.
pub struct SignerInfoParts<'a> {
    /// Signing certificate
    pub signer: &'a Certificate,
    /// Message digest algorithm
    pub digest: DigestAlgorithm,
    /// Public-key algorithm of the signature
    pub signature_algorithm: SignatureAlgorithm,
    /// Signed attributes, as passed to [`encode_signed_attributes`]
    pub signed_attributes: SetOfVec<Attribute>,
    /// Signature value over the encoded signed attributes
    pub signature: &'a [u8],
    /// Unsigned attributes
    pub unsigned_attributes: Vec<Attribute>,
}

/// Assemble a `ContentInfo` wrapping `SignedData`.
///
/// `encapsulated` carries the eContentType and eContent; `None` produces a
/// detached signature over `id-data`.
pub fn signed_data(
    parts: SignerInfoParts<'_>,
    certificates: &[&[u8]],
    encapsulated: Option<(ObjectIdentifier, &[u8])>,
) -> Result<Vec<u8>> {
    let digest_alg = asn1::digest_algorithm_identifier(parts.digest);
    let tbs = x509(parts.signer)?.tbs_certificate;
    let unsigned_attrs = if parts.unsigned_attributes.is_empty() {
        None
    } else {
        Some(SetOfVec::try_from(parts.unsigned_attributes)?)
    };

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: tbs.issuer,
            serial_number: tbs.serial_number,
        }),
        digest_alg: digest_alg.clone(),
        signed_attrs: Some(parts.signed_attributes),
        signature_algorithm: parts.signature_algorithm.algorithm_identifier(parts.digest),
        signature: OctetString::new(parts.signature)?,
        unsigned_attrs,
    };

    let certificates = certificates
        .iter()
        .map(|der| Ok(CertificateChoices::Certificate(x509_cert::Certificate::from_der(der)?)))
        .collect::<Result<Vec<_>>>()?;
    let certificates = if certificates.is_empty() {
        None
    } else {
        Some(CertificateSet(SetOfVec::try_from(certificates)?))
    };

    let (version, econtent_type, econtent) = match encapsulated {
        Some((content_type, content)) => (
            CmsVersion::V3,
            content_type,
            Some(Any::encode_from(&OctetString::new(content)?)?),
        ),
        None => (CmsVersion::V1, oid::DATA, None),
    };

    let signed_data = SignedData {
        version,
        digest_algorithms: SetOfVec::try_from(vec![digest_alg])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type,
            econtent,
        },
        certificates,
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };
    let content_info = ContentInfo {
        content_type: oid::SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    Ok(content_info.to_der()?)
}

/// RFC 3161 `TimeStampReq` with `certReq` set.
pub fn timestamp_request(digest: DigestAlgorithm, imprint: &[u8], nonce: u64) -> Result<Vec<u8>> {
    let request = TimeStampReq {
        version: 1,
        message_imprint: MessageImprint::new(digest, imprint)?,
        req_policy: None,
        nonce: Some(Uint::new(&nonce.to_be_bytes())?),
        cert_req: true,
    };
    Ok(request.to_der()?)
}

/// Extract the token from a `TimeStampResp`, failing on a rejected status.
pub fn timestamp_token_from_response(response: &[u8]) -> Result<Vec<u8>> {
    let token = TimeStampResp::from_der(response)?.into_token()?;
    Ok(token.to_der()?)
}

/// The parts of a `SignedData` the engine reads back.
#[derive(Debug, Clone)]
pub struct SignedDataView {
    /// eContentType
    pub content_type: ObjectIdentifier,
    /// eContent, present for timestamp tokens
    pub encapsulated_content: Option<Vec<u8>>,
    /// Embedded certificates (DER)
    pub certificates: Vec<Vec<u8>>,
    /// Digest algorithm of the first SignerInfo
    pub digest_algorithm: Option<DigestAlgorithm>,
    /// Signed attributes of the first SignerInfo
    pub signed_attributes: Vec<Attribute>,
    /// Unsigned attributes of the first SignerInfo
    pub unsigned_attributes: Vec<Attribute>,
    /// Signature value of the first SignerInfo
    pub signature: Vec<u8>,
}

/// Parse a `ContentInfo` holding `SignedData`.
///
/// Trailing bytes (such as the zero padding of a `/Contents` placeholder)
/// are ignored.
pub fn parse_signed_data(der: &[u8]) -> Result<SignedDataView> {
    let content_info: ContentInfo = asn1::decode_prefix(der)?;
    if content_info.content_type != oid::SIGNED_DATA {
        return Err(Error::Asn1(format!(
            "Not a SignedData ContentInfo: {}",
            content_info.content_type
        )));
    }
    let signed_data: SignedData = content_info.content.decode_as()?;

    let encapsulated_content = match &signed_data.encap_content_info.econtent {
        Some(econtent) => Some(econtent.decode_as::<OctetString>()?.into_bytes()),
        None => None,
    };
    let mut certificates = Vec::new();
    if let Some(set) = &signed_data.certificates {
        for choice in set.0.iter() {
            if let CertificateChoices::Certificate(certificate) = choice {
                certificates.push(certificate.to_der()?);
            }
        }
    }

    let mut view = SignedDataView {
        content_type: signed_data.encap_content_info.econtent_type,
        encapsulated_content,
        certificates,
        digest_algorithm: None,
        signed_attributes: Vec::new(),
        unsigned_attributes: Vec::new(),
        signature: Vec::new(),
    };
    if let Some(info) = signed_data.signer_infos.0.iter().next() {
        view.digest_algorithm = asn1::digest_algorithm(&info.digest_alg);
        view.signed_attributes = info.signed_attrs.iter().flat_map(|set| set.iter().cloned()).collect();
        view.unsigned_attributes = info.unsigned_attrs.iter().flat_map(|set| set.iter().cloned()).collect();
        view.signature = info.signature.as_bytes().to_vec();
    }
    Ok(view)
}

impl SignedDataView {
    fn attribute_value(attributes: &[Attribute], attr_type: ObjectIdentifier) -> Option<&Any> {
        attributes
            .iter()
            .find(|a| a.oid == attr_type)
            .and_then(|a| a.values.iter().next())
    }

    /// messageDigest signed attribute.
    pub fn message_digest(&self) -> Option<Vec<u8>> {
        let value = Self::attribute_value(&self.signed_attributes, oid::MESSAGE_DIGEST)?;
        value.decode_as::<OctetString>().ok().map(OctetString::into_bytes)
    }

    /// Signature timestamp token carried as an unsigned attribute.
    pub fn timestamp_token(&self) -> Option<Vec<u8>> {
        Self::attribute_value(&self.unsigned_attributes, oid::TIMESTAMP_TOKEN).and_then(|value| value.to_der().ok())
    }

    /// TSTInfo of a timestamp token.
    pub fn tst_info(&self) -> Result<TstInfo> {
        if self.content_type != oid::TST_INFO {
            return Err(Error::Asn1("Token does not encapsulate TSTInfo".to_string()));
        }
        let content = self
            .encapsulated_content
            .as_deref()
            .ok_or_else(|| Error::Asn1("Token has no eContent".to_string()))?;
        Ok(TstInfo::from_der(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::tsp::PkiStatusInfo;

    #[test]
    fn test_attribute_carries_one_value() {
        let attr = attribute(oid::CONTENT_TYPE, Any::encode_from(&oid::DATA).unwrap()).unwrap();
        let decoded = Attribute::from_der(&attr.to_der().unwrap()).unwrap();
        assert_eq!(decoded.oid, oid::CONTENT_TYPE);
        assert_eq!(decoded.values.len(), 1);
        assert_eq!(decoded.values.iter().next().unwrap().decode_as::<ObjectIdentifier>().unwrap(), oid::DATA);
    }

    #[test]
    fn test_timestamp_request_fields() {
        let imprint = [7u8; 32];
        let der = timestamp_request(DigestAlgorithm::Sha256, &imprint, u64::MAX).unwrap();
        let request = TimeStampReq::from_der(&der).unwrap();
        assert_eq!(asn1::digest_algorithm(&request.message_imprint.hash_algorithm), Some(DigestAlgorithm::Sha256));
        assert_eq!(request.message_imprint.hashed_message.as_bytes(), &imprint);
        assert_eq!(request.nonce.unwrap().as_bytes(), &u64::MAX.to_be_bytes());
        assert!(request.cert_req);
    }

    #[test]
    fn test_rejected_timestamp_response() {
        let response = TimeStampResp {
            status: PkiStatusInfo {
                status: 2,
                status_string: None,
                fail_info: None,
            },
            time_stamp_token: None,
        };
        assert!(matches!(
            timestamp_token_from_response(&response.to_der().unwrap()),
            Err(Error::TrustService(_))
        ));
    }

    #[test]
    fn test_granted_response_without_token() {
        let response = TimeStampResp {
            status: PkiStatusInfo {
                status: 0,
                status_string: None,
                fail_info: None,
            },
            time_stamp_token: None,
        };
        assert!(matches!(
            timestamp_token_from_response(&response.to_der().unwrap()),
            Err(Error::TrustService(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_signed_data() {
        let other = ContentInfo {
            content_type: oid::DATA,
            content: Any::null(),
        };
        assert!(parse_signed_data(&other.to_der().unwrap()).is_err());
        assert!(parse_signed_data(b"\x30\x03garbage").is_err());
    }
}
