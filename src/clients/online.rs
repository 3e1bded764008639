//! HTTP trust-service clients.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;

use der::Encode;

use super::{CrlClient, OcspClient, TsaClient};
use crate::asn1::ocsp::{CertId, OcspRequest};
use crate::cades;
use crate::crypto::{Certificate, CryptoProvider, DefaultCryptoProvider};
use crate::error::{Error, Result};
use crate::signatures::DigestAlgorithm;

/// Largest response body accepted from a trust service.
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Default token size reserved for a timestamp.
pub const DEFAULT_TOKEN_SIZE_ESTIMATE: usize = 6144;

/// Minimal request/response contract for trust services.
pub trait HttpTransport {
    /// POST `body` and return the response body.
    fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<Vec<u8>>;

    /// GET `url` and return the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking transport backed by `ureq`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl UreqTransport {
    /// Transport with a per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("pdf_pades/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }

    fn read_body(url: &str, result: std::result::Result<ureq::Response, ureq::Error>) -> Result<Vec<u8>> {
        let response = result.map_err(|e| request_error(url, e))?;
        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_SIZE)
            .read_to_end(&mut body)?;
        Ok(body)
    }
}

/// HTTP status failures are the service's answer; anything else never
/// reached it.
fn request_error(url: &str, error: ureq::Error) -> Error {
    match error {
        ureq::Error::Status(code, _) => Error::TrustService(format!("{}: HTTP status {}", url, code)),
        ureq::Error::Transport(transport) => {
            Error::Io(std::io::Error::other(format!("{}: {}", url, transport)))
        },
    }
}

impl HttpTransport for UreqTransport {
    fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<Vec<u8>> {
        log::debug!("POST {} ({} bytes)", url, body.len());
        let result = self
            .agent
            .post(url)
            .set("Content-Type", content_type)
            .send_bytes(body);
        Self::read_body(url, result)
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {}", url);
        Self::read_body(url, self.agent.get(url).call())
    }
}

/// DER `OCSPRequest` for one certificate, CertID hashed with SHA-1.
pub fn ocsp_request(
    certificate: &Certificate,
    issuer: &Certificate,
    provider: &dyn CryptoProvider,
) -> Result<Vec<u8>> {
    let cert_id = CertId::new(certificate, issuer, DigestAlgorithm::Sha1, provider)?;
    Ok(OcspRequest::single(cert_id).to_der()?)
}

/// OCSP over HTTP POST to the responder named in the certificate.
pub struct OnlineOcspClient {
    transport: Arc<dyn HttpTransport>,
    url: Option<String>,
    provider: DefaultCryptoProvider,
}

impl OnlineOcspClient {
    /// Client using the certificate's AIA responder.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            url: None,
            provider: DefaultCryptoProvider::new(),
        }
    }

    /// Always query `url`.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

impl OcspClient for OnlineOcspClient {
    fn fetch(&self, certificate: &Certificate, issuer: &Certificate) -> Result<Vec<u8>> {
        let urls: Vec<&str> = match &self.url {
            Some(url) => vec![url.as_str()],
            None => certificate.info().ocsp_urls.iter().map(String::as_str).collect(),
        };
        if urls.is_empty() {
            return Err(Error::TrustService(format!(
                "No OCSP responder for {}",
                certificate.label()
            )));
        }

        let request = ocsp_request(certificate, issuer, &self.provider)?;
        let mut last_error = None;
        for url in urls {
            let response = self
                .transport
                .post(url, "application/ocsp-request", &request)
                .and_then(|body| self.provider.inspect_ocsp(&body).map(|_| body));
            match response {
                Ok(body) => return Ok(body),
                Err(e) => {
                    log::warn!("OCSP responder {} failed: {}", url, e);
                    last_error = Some(e);
                },
            }
        }
        Err(last_error.unwrap_or_else(|| Error::TrustService("OCSP lookup failed".to_string())))
    }
}

/// CRL download from the certificate's distribution points.
pub struct OnlineCrlClient {
    transport: Arc<dyn HttpTransport>,
}

impl OnlineCrlClient {
    /// Client using the certificate's CDP URLs.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

impl CrlClient for OnlineCrlClient {
    fn fetch(&self, certificate: &Certificate) -> Result<Vec<Vec<u8>>> {
        let mut crls = Vec::new();
        for url in &certificate.info().crl_urls {
            match self.transport.get(url) {
                Ok(body) if !body.is_empty() => crls.push(body),
                Ok(_) => log::warn!("CRL at {} is empty", url),
                Err(e) => log::warn!("CRL download from {} failed: {}", url, e),
            }
        }
        if crls.is_empty() {
            return Err(Error::TrustService(format!(
                "No CRL could be downloaded for {}",
                certificate.label()
            )));
        }
        Ok(crls)
    }
}

/// RFC 3161 timestamping over HTTP POST.
pub struct OnlineTsaClient {
    transport: Arc<dyn HttpTransport>,
    url: String,
    digest: DigestAlgorithm,
    token_size_estimate: usize,
}

impl OnlineTsaClient {
    /// Client for the TSA at `url`, hashing with SHA-256.
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            digest: DigestAlgorithm::Sha256,
            token_size_estimate: DEFAULT_TOKEN_SIZE_ESTIMATE,
        }
    }

    /// Use another imprint hash.
    pub fn with_digest_algorithm(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Reserve `size` bytes per token.
    pub fn with_token_size_estimate(mut self, size: usize) -> Self {
        self.token_size_estimate = size;
        self
    }
}

impl TsaClient for OnlineTsaClient {
    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    fn token_size_estimate(&self) -> usize {
        self.token_size_estimate
    }

    fn timestamp(&self, imprint: &[u8]) -> Result<Vec<u8>> {
        let nonce = rand::thread_rng().next_u64();
        let request = cades::timestamp_request(self.digest, imprint, nonce)?;
        let response = self
            .transport
            .post(&self.url, "application/timestamp-query", &request)?;
        let token = cades::timestamp_token_from_response(&response)?;

        let tst = cades::parse_signed_data(&token)?.tst_info()?;
        if tst.imprint() != imprint {
            return Err(Error::TrustService(format!(
                "Timestamp from {} does not match the requested imprint",
                self.url
            )));
        }
        log::debug!("Timestamp from {} at {}", self.url, tst.gen_time()?);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::tsp::{PkiStatusInfo, TimeStampResp};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingTransport {
        requests: RefCell<Vec<(String, String)>>,
        response: Vec<u8>,
    }

    impl HttpTransport for RecordingTransport {
        fn post(&self, url: &str, content_type: &str, _body: &[u8]) -> Result<Vec<u8>> {
            self.requests
                .borrow_mut()
                .push((url.to_string(), content_type.to_string()));
            Ok(self.response.clone())
        }

        fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.requests.borrow_mut().push((url.to_string(), String::new()));
            Err(Error::TrustService("offline".to_string()))
        }
    }

    #[test]
    fn test_tsa_rejection_surfaces() {
        let rejected = TimeStampResp {
            status: PkiStatusInfo {
                status: 2,
                status_string: None,
                fail_info: None,
            },
            time_stamp_token: None,
        }
        .to_der()
        .unwrap();
        let transport = Arc::new(RecordingTransport {
            response: rejected,
            ..Default::default()
        });
        let client = OnlineTsaClient::new(transport.clone(), "http://tsa.test");
        assert!(matches!(client.timestamp(&[0; 32]), Err(Error::TrustService(_))));
        assert_eq!(
            transport.requests.borrow()[0],
            ("http://tsa.test".to_string(), "application/timestamp-query".to_string())
        );
        assert_eq!(client.token_size_estimate(), DEFAULT_TOKEN_SIZE_ESTIMATE);
    }

    #[test]
    fn test_unreachable_service_is_io_error() {
        let transport = UreqTransport::new(Duration::from_secs(1));
        assert!(matches!(transport.get("not a url"), Err(Error::Io(_))));
        assert!(matches!(
            transport.post("not a url", "application/ocsp-request", &[]),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_http_status_is_trust_service_error() {
        let response = ureq::Response::new(503, "Service Unavailable", "").unwrap();
        match request_error("http://ocsp.test", ureq::Error::Status(503, response)) {
            Error::TrustService(message) => assert!(message.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
