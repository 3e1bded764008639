//! ASN.1 structures exchanged with trust services.
//!
//! OCSP (RFC 6960), the time-stamp protocol (RFC 3161) and the ESS
//! signing-certificate attribute (RFC 5035) are declared with `der` derives.
//! CMS itself comes from the `cms` crate and certificates, names and
//! extensions from `x509-cert`.

pub mod ess;
pub mod ocsp;
pub mod tsp;

use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use der::asn1::{Any, GeneralizedTime};
use der::{Decode, Encode, Header, SliceReader, Tag, Tagged};
use spki::AlgorithmIdentifierOwned;

use crate::error::{Error, Result};
use crate::signatures::DigestAlgorithm;

/// Object identifiers used across the crate.
pub mod oid {
    use der::asn1::ObjectIdentifier;

    /// id-data
    pub const DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
    /// id-signedData
    pub const SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
    /// id-contentType attribute
    pub const CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
    /// id-messageDigest attribute
    pub const MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
    /// id-aa-signingCertificateV2 attribute
    pub const SIGNING_CERTIFICATE_V2: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");
    /// id-aa-timeStampToken unsigned attribute
    pub const TIMESTAMP_TOKEN: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.14");
    /// id-ct-TSTInfo
    pub const TST_INFO: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");
    /// id-pkix-ocsp-basic
    pub const OCSP_BASIC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.1");
    /// id-ad-ocsp access method
    pub const AD_OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");
    /// id-pe-authorityInfoAccess
    pub const AUTHORITY_INFO_ACCESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.1");
    /// id-ce-cRLNumber
    pub const CRL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.20");
    /// rsaEncryption
    pub const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
    /// ecdsa-with-SHA1
    pub const ECDSA_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");
    /// ecdsa-with-SHA256
    pub const ECDSA_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
    /// ecdsa-with-SHA384
    pub const ECDSA_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
    /// ecdsa-with-SHA512
    pub const ECDSA_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
    /// Ed25519
    pub const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
}

/// AlgorithmIdentifier for a digest, with NULL parameters.
pub fn digest_algorithm_identifier(digest: DigestAlgorithm) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: digest.oid(),
        parameters: Some(Any::null()),
    }
}

/// Digest named by an AlgorithmIdentifier, if supported.
pub fn digest_algorithm(identifier: &AlgorithmIdentifierOwned) -> Option<DigestAlgorithm> {
    DigestAlgorithm::from_oid(&identifier.oid)
}

/// Decode a `T` from the front of `der`, ignoring whatever follows it.
pub fn decode_prefix<'a, T: Decode<'a>>(der: &'a [u8]) -> Result<T> {
    let mut reader = SliceReader::new(der)?;
    Ok(T::decode(&mut reader)?)
}

/// Total encoded length of the first element in `input`.
pub fn encoded_length(input: &[u8]) -> Result<usize> {
    let header: Header = decode_prefix(input)?;
    let total = (header.encoded_len()? + header.length)?;
    Ok(usize::try_from(total)?)
}

fn from_unix(duration: StdDuration) -> Result<DateTime<Utc>> {
    i64::try_from(duration.as_secs())
        .ok()
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
        .ok_or_else(|| Error::Asn1(format!("Time out of range: {:?}", duration)))
}

/// GeneralizedTime with whole seconds.
pub fn to_generalized_time(time: &DateTime<Utc>) -> Result<GeneralizedTime> {
    let seconds = u64::try_from(time.timestamp())
        .map_err(|_| Error::Asn1(format!("Time before 1970: {}", time)))?;
    Ok(GeneralizedTime::from_unix_duration(StdDuration::from_secs(seconds))?)
}

/// Chrono view of a GeneralizedTime.
pub fn from_generalized_time(time: &GeneralizedTime) -> Result<DateTime<Utc>> {
    from_unix(time.to_unix_duration())
}

/// GeneralizedTime that may carry fractional seconds, which TSTInfo allows.
///
/// The fraction is dropped.
pub fn lenient_generalized_time(value: &Any) -> Result<DateTime<Utc>> {
    if value.tag() != Tag::GeneralizedTime {
        return Err(Error::Asn1(format!("Tag {} is not a GeneralizedTime", value.tag())));
    }
    let text = std::str::from_utf8(value.value())
        .map_err(|_| Error::Asn1("GeneralizedTime is not ASCII".to_string()))?;
    let text = text
        .strip_suffix('Z')
        .ok_or_else(|| Error::Asn1(format!("GeneralizedTime {:?} is not UTC", text)))?;
    let whole = text.split('.').next().unwrap_or(text);
    NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| Error::Asn1(format!("Malformed GeneralizedTime {:?}: {}", text, e)))
}
