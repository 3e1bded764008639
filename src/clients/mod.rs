//! Trust-service clients.
//!
//! Revocation lookups and timestamping are reached through three small
//! traits so callers can plug in their own transport, caching or test
//! doubles. [`online`] provides HTTP implementations that locate services
//! from the certificates themselves.

pub mod online;

use std::sync::Arc;

use crate::crypto::Certificate;
use crate::error::{Error, Result};
use crate::signatures::DigestAlgorithm;

pub use online::{HttpTransport, OnlineCrlClient, OnlineOcspClient, OnlineTsaClient, UreqTransport};

/// Source of CRLs for a certificate.
pub trait CrlClient {
    /// DER-encoded CRLs covering `certificate`.
    fn fetch(&self, certificate: &Certificate) -> Result<Vec<Vec<u8>>>;
}

/// Source of OCSP responses for a certificate.
pub trait OcspClient {
    /// A DER-encoded OCSPResponse for `certificate`, issued by `issuer`.
    fn fetch(&self, certificate: &Certificate, issuer: &Certificate) -> Result<Vec<u8>>;
}

/// RFC 3161 timestamp authority.
pub trait TsaClient {
    /// Hash algorithm of the message imprint.
    fn digest_algorithm(&self) -> DigestAlgorithm;

    /// Upper bound on the DER size of a returned token.
    fn token_size_estimate(&self) -> usize;

    /// Timestamp token (a CMS `ContentInfo`) over `imprint`, which is already
    /// hashed with [`Self::digest_algorithm`].
    fn timestamp(&self, imprint: &[u8]) -> Result<Vec<u8>>;
}

/// Revocation clients derived from a certificate chain.
pub struct DefaultClients {
    /// OCSP client when some certificate names a responder
    pub ocsp: Option<Box<dyn OcspClient>>,
    /// CRL client when some certificate names a distribution point
    pub crl: Option<Box<dyn CrlClient>>,
}

impl std::fmt::Debug for DefaultClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultClients")
            .field("ocsp", &self.ocsp.is_some())
            .field("crl", &self.crl.is_some())
            .finish()
    }
}

impl DefaultClients {
    /// Build online clients from the AIA and CDP extensions of
    /// `certificates`.
    ///
    /// Fails with [`Error::DefaultClientsCannotBeCreated`] when no
    /// certificate carries either extension.
    pub fn derive_from(certificates: &[Certificate], transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let has_ocsp = certificates.iter().any(|c| !c.info().ocsp_urls.is_empty());
        let has_crl = certificates.iter().any(|c| !c.info().crl_urls.is_empty());
        if !has_ocsp && !has_crl {
            return Err(Error::DefaultClientsCannotBeCreated);
        }

        log::info!(
            "Deriving default revocation clients (OCSP: {}, CRL: {})",
            has_ocsp,
            has_crl
        );
        Ok(Self {
            ocsp: has_ocsp
                .then(|| Box::new(OnlineOcspClient::new(transport.clone())) as Box<dyn OcspClient>),
            crl: has_crl.then(|| Box::new(OnlineCrlClient::new(transport)) as Box<dyn CrlClient>),
        })
    }
}
