//! Time-stamp protocol structures (RFC 3161).

// Field names follow the ASN.1 module.
#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use cms::content_info::ContentInfo;
use der::asn1::{Any, BitString, ObjectIdentifier, OctetString, Uint};
use der::Sequence;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::Extensions;

use crate::error::{Error, Result};
use crate::signatures::DigestAlgorithm;

/// Hash of the timestamped data.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct MessageImprint {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub hashed_message: OctetString,
}

impl MessageImprint {
    /// Imprint of data already hashed with `digest`.
    pub fn new(digest: DigestAlgorithm, hashed_message: &[u8]) -> Result<Self> {
        Ok(Self {
            hash_algorithm: super::digest_algorithm_identifier(digest),
            hashed_message: OctetString::new(hashed_message)?,
        })
    }
}

/// `TimeStampReq`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampReq {
    pub version: u8,
    pub message_imprint: MessageImprint,
    pub req_policy: Option<ObjectIdentifier>,
    pub nonce: Option<Uint>,
    #[asn1(default = "Default::default")]
    pub cert_req: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiStatusInfo {
    pub status: u8,
    pub status_string: Option<Vec<String>>,
    pub fail_info: Option<BitString>,
}

impl PkiStatusInfo {
    /// `granted` or `grantedWithMods`.
    pub fn is_granted(&self) -> bool {
        self.status <= 1
    }
}

/// `TimeStampResp`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampResp {
    pub status: PkiStatusInfo,
    pub time_stamp_token: Option<ContentInfo>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Accuracy {
    pub seconds: Option<u64>,
    #[asn1(context_specific = "0", optional = "true", tag_mode = "IMPLICIT")]
    pub millis: Option<u16>,
    #[asn1(context_specific = "1", optional = "true", tag_mode = "IMPLICIT")]
    pub micros: Option<u16>,
}

/// `TSTInfo`, the content a timestamp token signs.
///
/// `gen_time` stays a raw element because TSAs may add fractional seconds.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TstInfo {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    pub serial_number: Uint,
    pub gen_time: Any,
    pub accuracy: Option<Accuracy>,
    #[asn1(default = "Default::default")]
    pub ordering: bool,
    pub nonce: Option<Uint>,
    #[asn1(context_specific = "0", optional = "true", tag_mode = "EXPLICIT")]
    pub tsa: Option<GeneralName>,
    #[asn1(context_specific = "1", optional = "true", tag_mode = "IMPLICIT", constructed = "true")]
    pub extensions: Option<Extensions>,
}

impl TstInfo {
    /// TSTInfo over `imprint` issued under `policy`.
    pub fn new(
        policy: ObjectIdentifier,
        message_imprint: MessageImprint,
        serial: u64,
        gen_time: &DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            version: 1,
            policy,
            message_imprint,
            serial_number: Uint::new(&serial.to_be_bytes())?,
            gen_time: Any::encode_from(&super::to_generalized_time(gen_time)?)?,
            accuracy: None,
            ordering: false,
            nonce: None,
            tsa: None,
            extensions: None,
        })
    }

    /// Imprint hash algorithm, if supported.
    pub fn digest_algorithm(&self) -> Option<DigestAlgorithm> {
        super::digest_algorithm(&self.message_imprint.hash_algorithm)
    }

    /// The hashed message.
    pub fn imprint(&self) -> &[u8] {
        self.message_imprint.hashed_message.as_bytes()
    }

    /// `genTime`
    pub fn gen_time(&self) -> Result<DateTime<Utc>> {
        super::lenient_generalized_time(&self.gen_time)
    }
}

impl TimeStampResp {
    /// The token, failing with [`Error::TrustService`] on a rejected status.
    pub fn into_token(self) -> Result<ContentInfo> {
        if !self.status.is_granted() {
            let mut message = format!("TSA rejected request with status {}", self.status.status);
            if let Some(text) = self.status.status_string {
                message = format!("{}: {}", message, text.join("; "));
            }
            return Err(Error::TrustService(message));
        }
        self.time_stamp_token
            .ok_or_else(|| Error::TrustService("Timestamp response carries no token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use der::{Decode, Encode};

    #[test]
    fn test_tst_info_fields() {
        let gen_time = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let imprint = MessageImprint::new(DigestAlgorithm::Sha256, &[9; 32]).unwrap();
        let info = TstInfo::new("1.2.3.4".parse().unwrap(), imprint, 5, &gen_time).unwrap();
        let decoded = TstInfo::from_der(&info.to_der().unwrap()).unwrap();
        assert_eq!(decoded.digest_algorithm(), Some(DigestAlgorithm::Sha256));
        assert_eq!(decoded.imprint(), &[9; 32]);
        assert_eq!(decoded.gen_time().unwrap(), gen_time);
        assert_eq!(decoded.serial_number.as_bytes(), &[5]);
    }

    #[test]
    fn test_rejected_response() {
        let response = TimeStampResp {
            status: PkiStatusInfo {
                status: 2,
                status_string: Some(vec!["bad imprint".to_string()]),
                fail_info: None,
            },
            time_stamp_token: None,
        };
        let decoded = TimeStampResp::from_der(&response.to_der().unwrap()).unwrap();
        match decoded.into_token() {
            Err(Error::TrustService(message)) => assert!(message.contains("bad imprint")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_request_defaults_cert_req() {
        let request = TimeStampReq {
            version: 1,
            message_imprint: MessageImprint::new(DigestAlgorithm::Sha256, &[1; 32]).unwrap(),
            req_policy: None,
            nonce: None,
            cert_req: false,
        };
        let der = request.to_der().unwrap();
        assert!(!der.windows(3).any(|w| w == [0x01, 0x01, 0x00]));
        assert!(!TimeStampReq::from_der(&der).unwrap().cert_req);
    }
}
