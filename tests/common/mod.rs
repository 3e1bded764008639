//! Shared fixtures: a test PKI, in-process trust services and a one-page PDF.

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use der::asn1::{BitString, Ia5String, Null, ObjectIdentifier, OctetString, UtcTime};
use der::{Decode, Encode};
use pdf_pades::asn1::ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, ResponderId, ResponseData,
    SingleResponse,
};
use pdf_pades::asn1::tsp::{MessageImprint, TstInfo};
use pdf_pades::asn1::{self, oid};
use pdf_pades::cades::{self, SignerInfoParts};
use pdf_pades::clients::{CrlClient, HttpTransport, OcspClient, TsaClient};
use pdf_pades::crypto::{
    Certificate, CertificateChain, CryptoProvider, DefaultCryptoProvider, ExternalSignature,
    PrivateKeySignature,
};
use pdf_pades::signatures::DigestAlgorithm;
use pdf_pades::{Error, Result};
use rcgen::{
    BasicConstraints, CertificateParams, CrlDistributionPoint, CustomExtension, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use spki::AlgorithmIdentifierOwned;
use x509_cert::crl::{CertificateList, TbsCertList};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AccessDescription, AuthorityInfoAccessSyntax};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::time::Time;

pub const OCSP_URL: &str = "http://ocsp.pades.test/";
pub const CRL_URL: &str = "http://crl.pades.test/root.crl";
pub const TSA_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.55555.1.1");

static RESPONSE_SEQUENCE: AtomicI64 = AtomicI64::new(1);

/// Shared RSA key; generating one per test is slow.
fn rsa_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("RSA key generation"))
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn aia_extension(url: &str) -> CustomExtension {
    let access = AuthorityInfoAccessSyntax(vec![AccessDescription {
        access_method: oid::AD_OCSP,
        access_location: GeneralName::UniformResourceIdentifier(Ia5String::new(url).unwrap()),
    }]);
    let arcs: Vec<u64> = oid::AUTHORITY_INFO_ACCESS.arcs().map(u64::from).collect();
    CustomExtension::from_oid_content(&arcs, access.to_der().unwrap())
}

fn params(common_name: &str, serial: u64) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.serial_number = Some(SerialNumber::from(serial));
    params
}

/// Self-issued root, an RSA signing certificate and a TSA certificate.
pub struct TestPki {
    pub provider: DefaultCryptoProvider,
    pub ca: Certificate,
    pub signer: Certificate,
    pub tsa: Certificate,
}

impl TestPki {
    /// PKI whose certificates carry no AIA or CDP extension.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// PKI whose leaf certificates name [`OCSP_URL`] and [`CRL_URL`].
    pub fn with_revocation_urls() -> Self {
        Self::build(true)
    }

    fn build(revocation_urls: bool) -> Self {
        let provider = DefaultCryptoProvider::new();

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = params("PAdES Test Root CA", 1);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let pem = rsa_key().to_pkcs8_pem(LineEnding::LF).unwrap();
        let leaf_key = KeyPair::from_pkcs8_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256).unwrap();

        let mut signer_params = params("PAdES Test Signer", 2);
        signer_params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::ContentCommitment];
        let mut tsa_params = params("PAdES Test TSA", 3);
        tsa_params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        tsa_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::TimeStamping];
        if revocation_urls {
            for leaf in [&mut signer_params, &mut tsa_params] {
                leaf.custom_extensions.push(aia_extension(OCSP_URL));
                leaf.crl_distribution_points.push(CrlDistributionPoint {
                    uris: vec![CRL_URL.to_string()],
                });
            }
        }
        let signer = signer_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();
        let tsa = tsa_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();

        let parse = |der: &[u8]| Certificate::from_der(der.to_vec(), &provider).unwrap();
        Self {
            ca: parse(ca.der()),
            signer: parse(signer.der()),
            tsa: parse(tsa.der()),
            provider,
        }
    }

    pub fn chain(&self) -> CertificateChain {
        CertificateChain::new(vec![self.signer.clone(), self.ca.clone()]).unwrap()
    }

    pub fn key(&self) -> PrivateKeySignature {
        PrivateKeySignature::new(rsa_key().clone(), DigestAlgorithm::Sha256)
    }

    pub fn tsa_client(&self) -> TestTsa {
        TestTsa {
            certificate: self.tsa.clone(),
            ca: self.ca.clone(),
            key: self.key(),
            provider: self.provider,
            serial: Cell::new(1),
            calls: Rc::new(Cell::new(0)),
        }
    }
}

/// OCSP `CertID` hashed with SHA-1.
pub fn cert_id(certificate: &Certificate, issuer: &Certificate, provider: &dyn CryptoProvider) -> CertId {
    CertId::new(certificate, issuer, DigestAlgorithm::Sha1, provider).unwrap()
}

fn test_signature_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: oid::ECDSA_SHA256,
        parameters: None,
    }
}

/// Successful `OCSPResponse` reporting `good` for `cert_id`.
pub fn ocsp_response(cert_id: &CertId, produced_at: DateTime<Utc>, validity: Duration) -> Vec<u8> {
    let time = |t: DateTime<Utc>| asn1::to_generalized_time(&t).unwrap();
    let basic = BasicOcspResponse {
        tbs_response_data: ResponseData {
            version: 0,
            responder_id: ResponderId::ByKey(OctetString::new(vec![0x42; 20]).unwrap()),
            produced_at: time(produced_at),
            responses: vec![SingleResponse {
                cert_id: cert_id.clone(),
                cert_status: CertStatus::Good(Null),
                this_update: time(produced_at),
                next_update: Some(time(produced_at + validity)),
                single_extensions: None,
            }],
            response_extensions: None,
        },
        signature_algorithm: test_signature_algorithm(),
        signature: BitString::from_bytes(&[0, 1, 2, 3]).unwrap(),
        certs: None,
    };
    OcspResponse::successful(&basic).unwrap().to_der().unwrap()
}

/// `OCSPResponse` with status `tryLater` and no response bytes.
pub const OCSP_TRY_LATER: [u8; 5] = [0x30, 0x03, 0x0A, 0x01, 0x03];

fn utc_time(time: &DateTime<Utc>) -> Time {
    let since_epoch = std::time::Duration::from_secs(time.timestamp() as u64);
    Time::UtcTime(UtcTime::from_unix_duration(since_epoch).unwrap())
}

/// Empty v2 CRL of `issuer_name` carrying a CRL number.
pub fn crl(issuer_name: &[u8], number: u64, this_update: DateTime<Utc>, validity: Duration) -> Vec<u8> {
    let crl_number = Extension {
        extn_id: oid::CRL_NUMBER,
        critical: false,
        extn_value: OctetString::new(number.to_der().unwrap()).unwrap(),
    };
    CertificateList {
        tbs_cert_list: TbsCertList {
            version: x509_cert::Version::V2,
            signature: test_signature_algorithm(),
            issuer: Name::from_der(issuer_name).unwrap(),
            this_update: utc_time(&this_update),
            next_update: Some(utc_time(&(this_update + validity))),
            revoked_certificates: None,
            crl_extensions: Some(vec![crl_number]),
        },
        signature_algorithm: test_signature_algorithm(),
        signature: BitString::from_bytes(&[0, 1, 2, 3]).unwrap(),
    }
    .to_der()
    .unwrap()
}

/// OCSP responder answering `good` for every certificate.
pub struct TestOcsp {
    provider: DefaultCryptoProvider,
    validity: Duration,
    failing: bool,
    produced_at: Option<DateTime<Utc>>,
    pub calls: Rc<Cell<usize>>,
}

impl TestOcsp {
    pub fn new(validity: Duration) -> Self {
        Self {
            provider: DefaultCryptoProvider::new(),
            validity,
            failing: false,
            produced_at: None,
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Responder whose answers for a certificate never change.
    pub fn fixed(validity: Duration, produced_at: DateTime<Utc>) -> Self {
        Self {
            produced_at: Some(produced_at),
            ..Self::new(validity)
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new(Duration::days(30))
        }
    }
}

impl OcspClient for TestOcsp {
    fn fetch(&self, certificate: &Certificate, issuer: &Certificate) -> Result<Vec<u8>> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.failing {
            return Err(Error::TrustService("responder unavailable".to_string()));
        }
        // Distinct producedAt per response, across responders, keeps fresh
        // responses apart from older ones.
        let produced_at = self.produced_at.unwrap_or_else(|| {
            let sequence = RESPONSE_SEQUENCE.fetch_add(1, Ordering::SeqCst);
            Utc::now() + Duration::seconds(sequence)
        });
        Ok(ocsp_response(&cert_id(certificate, issuer, &self.provider), produced_at, self.validity))
    }
}

/// OCSP responder that is reachable but always answers `tryLater`.
pub struct TryLaterOcsp {
    pub calls: Rc<Cell<usize>>,
}

impl TryLaterOcsp {
    pub fn new() -> Self {
        Self {
            calls: Rc::new(Cell::new(0)),
        }
    }
}

impl OcspClient for TryLaterOcsp {
    fn fetch(&self, _certificate: &Certificate, _issuer: &Certificate) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        Ok(OCSP_TRY_LATER.to_vec())
    }
}

/// CRL distribution point serving an empty CRL of the certificate's issuer.
pub struct TestCrl {
    validity: Duration,
    pub calls: Rc<Cell<usize>>,
}

impl TestCrl {
    pub fn new(validity: Duration) -> Self {
        Self {
            validity,
            calls: Rc::new(Cell::new(0)),
        }
    }
}

impl CrlClient for TestCrl {
    fn fetch(&self, certificate: &Certificate) -> Result<Vec<Vec<u8>>> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        Ok(vec![crl(&certificate.info().issuer, call as u64, Utc::now(), self.validity)])
    }
}

/// Timestamp authority signing TSTInfo with the test TSA certificate.
pub struct TestTsa {
    certificate: Certificate,
    ca: Certificate,
    key: PrivateKeySignature,
    provider: DefaultCryptoProvider,
    serial: Cell<u64>,
    pub calls: Rc<Cell<usize>>,
}

impl TestTsa {
    pub fn client(&self) -> Option<&dyn TsaClient> {
        Some(self)
    }
}

impl TsaClient for TestTsa {
    fn digest_algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::Sha256
    }

    fn token_size_estimate(&self) -> usize {
        6144
    }

    fn timestamp(&self, imprint: &[u8]) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        let serial = self.serial.get();
        self.serial.set(serial + 1);

        let message_imprint = MessageImprint::new(DigestAlgorithm::Sha256, imprint)?;
        let tst_info = TstInfo::new(TSA_POLICY, message_imprint, serial, &Utc::now())?.to_der()?;
        let message_digest = self.provider.digest(DigestAlgorithm::Sha256, &tst_info);
        let signed_attributes = cades::cades_signed_attributes(
            oid::TST_INFO,
            &message_digest,
            &self.certificate,
            DigestAlgorithm::Sha256,
            &self.provider,
        )?;
        let signature = self.key.sign(&cades::encode_signed_attributes(&signed_attributes)?)?;
        let parts = SignerInfoParts {
            signer: &self.certificate,
            digest: DigestAlgorithm::Sha256,
            signature_algorithm: self.key.signature_algorithm(),
            signed_attributes,
            signature: &signature,
            unsigned_attributes: Vec::new(),
        };
        cades::signed_data(
            parts,
            &[self.certificate.der(), self.ca.der()],
            Some((oid::TST_INFO, &tst_info)),
        )
    }
}

/// Transport standing in for the services named in the certificates.
///
/// OCSP requests are answered for the CertID they carry; every GET returns
/// an empty CRL of `crl_issuer`.
pub struct FakeTransport {
    pub crl_issuer: Vec<u8>,
    pub requests: std::sync::Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(crl_issuer: &Certificate) -> Self {
        Self {
            crl_issuer: crl_issuer.info().subject.clone(),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl HttpTransport for FakeTransport {
    fn post(&self, url: &str, _content_type: &str, body: &[u8]) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(format!("POST {}", url));
        let request = OcspRequest::from_der(body)?;
        let cert_id = &request.tbs_request.request_list[0].req_cert;
        Ok(ocsp_response(cert_id, Utc::now(), Duration::days(30)))
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(format!("GET {}", url));
        Ok(crl(&self.crl_issuer, 1, Utc::now(), Duration::days(30)))
    }
}

/// A one-page PDF with a classic cross-reference table.
pub fn one_page_pdf() -> Vec<u8> {
    let content = b"BT /F1 12 Tf 72 720 Td (Contract) Tj ET";
    let objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
        b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>".to_vec(),
        [
            format!("<< /Length {} >>\nstream\n", content.len()).into_bytes(),
            content.to_vec(),
            b"\nendstream".to_vec(),
        ]
        .concat(),
    ];

    let mut pdf = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        pdf.extend_from_slice(body);
        pdf.extend_from_slice(b"\nendobj\n");
    }
    let xref_offset = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    pdf
}
