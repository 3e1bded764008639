//! PAdES baseline signing and signature prolongation.
//!
//! [`PadesSigner`] reads a document from its input, appends the revisions a
//! profile requires and writes the result to its output:
//!
//! - **B-B**: one approval signature with a detached CAdES container
//! - **B-T**: B-B plus a signature timestamp token
//! - **B-LT**: B-T plus a document security store with revocation evidence
//! - **B-LTA**: B-LT plus a document timestamp over the whole file
//!
//! Every stage appends an incremental revision to the bytes of the previous
//! one. The output receives bytes only after the last stage succeeded.
//!
//! ## Example
//!
//! ```ignore
//! use pdf_pades::clients::{OnlineTsaClient, UreqTransport};
//! use pdf_pades::signatures::SignerProperties;
//! use pdf_pades::signer::PadesSigner;
//! use std::sync::Arc;
//!
//! let input = std::fs::File::open("contract.pdf")?;
//! let output = std::fs::File::create("contract-signed.pdf")?;
//! let tsa = OnlineTsaClient::new(Arc::new(UreqTransport::default()), "http://tsa.example/tsr");
//!
//! PadesSigner::new(input, output).sign_baseline_lta(
//!     &SignerProperties::new().with_reason("Approved"),
//!     &chain,
//!     &key,
//!     Some(&tsa),
//! )?;
//! ```

mod workspace;

pub use workspace::Workspace;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use der::asn1::Any;
use der::Decode;

use crate::asn1::oid;
use crate::clients::{CrlClient, DefaultClients, HttpTransport, OcspClient, TsaClient, UreqTransport};
use crate::cades::{self, SignerInfoParts};
use crate::config::PadesConfig;
use crate::container::{DocumentContainer, IncrementalDocument, SignatureField, SignatureRequest};
use crate::crypto::{
    Certificate, CertificateChain, CryptoProvider, DefaultCryptoProvider, ExternalSignature,
};
use crate::error::{Error, Result};
use crate::ltv::{DocumentSecurityStore, ProlongationEngine, RevocationEvidenceCollector};
use crate::signatures::{BaselineLevel, SignerProperties};

/// OCSP and CRL clients used for one operation.
#[derive(Default)]
struct RevocationClients {
    ocsp: Option<Box<dyn OcspClient>>,
    crl: Option<Box<dyn CrlClient>>,
}

impl RevocationClients {
    fn is_empty(&self) -> bool {
        self.ocsp.is_none() && self.crl.is_none()
    }

    /// Derive online clients from `certificates` unless the caller set one.
    fn derive_if_missing(
        &mut self,
        certificates: &[Certificate],
        transport: Arc<dyn HttpTransport>,
    ) -> Result<()> {
        if !self.is_empty() {
            return Ok(());
        }
        let DefaultClients { ocsp, crl } = DefaultClients::derive_from(certificates, transport)?;
        self.ocsp = ocsp;
        self.crl = crl;
        Ok(())
    }

    fn collector<'a>(&'a self, provider: &'a dyn CryptoProvider) -> RevocationEvidenceCollector<'a> {
        RevocationEvidenceCollector::new(provider, self.ocsp.as_deref(), self.crl.as_deref())
    }
}

/// Produces PAdES baseline signatures and prolongs LTV-enabled documents.
///
/// A signer performs one operation: every operation consumes it and returns
/// the output on success.
pub struct PadesSigner<R: Read, W: Write> {
    input: R,
    output: W,
    config: PadesConfig,
    provider: Box<dyn CryptoProvider>,
    transport: Arc<dyn HttpTransport>,
    clients: RevocationClients,
}

impl<R: Read, W: Write> PadesSigner<R, W> {
    /// Signer reading from `input` and writing to `output`, with default
    /// configuration, the default crypto provider and HTTP transport.
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            config: PadesConfig::default(),
            provider: Box::new(DefaultCryptoProvider::new()),
            transport: Arc::new(UreqTransport::default()),
            clients: RevocationClients::default(),
        }
    }

    /// Use `config`.
    pub fn with_config(mut self, config: PadesConfig) -> Self {
        self.config = config;
        self
    }

    /// Fetch CRLs with `client`.
    pub fn with_crl_client(mut self, client: impl CrlClient + 'static) -> Self {
        self.clients.crl = Some(Box::new(client));
        self
    }

    /// Fetch OCSP responses with `client`.
    pub fn with_ocsp_client(mut self, client: impl OcspClient + 'static) -> Self {
        self.clients.ocsp = Some(Box::new(client));
        self
    }

    /// Transport for clients derived from certificate extensions.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the crypto provider.
    pub fn with_crypto_provider(mut self, provider: impl CryptoProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    /// PAdES-B-B: a bare CAdES-detached signature.
    pub fn sign_baseline_b(
        self,
        properties: &SignerProperties,
        chain: &CertificateChain,
        key: &dyn ExternalSignature,
    ) -> Result<W> {
        self.sign(BaselineLevel::B, properties, chain, key, None)
    }

    /// PAdES-B-T: B-B with a signature timestamp from `tsa`.
    ///
    /// Fails with [`Error::TsaClientRequired`] before reading the input when
    /// `tsa` is `None`.
    pub fn sign_baseline_t(
        self,
        properties: &SignerProperties,
        chain: &CertificateChain,
        key: &dyn ExternalSignature,
        tsa: Option<&dyn TsaClient>,
    ) -> Result<W> {
        self.sign(BaselineLevel::T, properties, chain, key, tsa)
    }

    /// PAdES-B-LT: B-T followed by a DSS revision with evidence for the
    /// signing and timestamping chains.
    ///
    /// Without configured clients, OCSP and CRL clients are derived from the
    /// chain; a chain without AIA or CDP information fails with
    /// [`Error::DefaultClientsCannotBeCreated`].
    pub fn sign_baseline_lt(
        self,
        properties: &SignerProperties,
        chain: &CertificateChain,
        key: &dyn ExternalSignature,
        tsa: Option<&dyn TsaClient>,
    ) -> Result<W> {
        self.sign(BaselineLevel::Lt, properties, chain, key, tsa)
    }

    /// PAdES-B-LTA: B-LT followed by a document timestamp.
    pub fn sign_baseline_lta(
        self,
        properties: &SignerProperties,
        chain: &CertificateChain,
        key: &dyn ExternalSignature,
        tsa: Option<&dyn TsaClient>,
    ) -> Result<W> {
        self.sign(BaselineLevel::Lta, properties, chain, key, tsa)
    }

    /// Extend the validity of the LTV-enabled signatures of the input.
    ///
    /// Evidence that is missing or lapses within the configured refresh
    /// margin is fetched again, the DSS is updated and a document timestamp
    /// seals the result. Fails with [`Error::NoSignaturesToProlong`] when no
    /// signature is indexed in the DSS.
    pub fn prolong_signatures(mut self, tsa: Option<&dyn TsaClient>) -> Result<W> {
        let staging = self.staging_directory()?;
        let tsa = tsa.ok_or(Error::TsaClientRequired("signature prolongation"))?;
        let document = IncrementalDocument::open(self.read_input()?)?;
        let mut workspace = Workspace::new(staging.as_deref());

        let provider = self.provider.as_ref();
        let engine = ProlongationEngine::new(provider, self.config.refresh_margin);
        let assessment = engine.assess(&document)?;

        let mut bytes = document.into_bytes();
        if assessment.needs_revocation() {
            if !assessment.stale.is_empty() {
                self.clients
                    .derive_if_missing(&assessment.pending_certificates(), self.transport.clone())?;
            } else if let Err(e) = self
                .clients
                .derive_if_missing(&assessment.pending_certificates(), self.transport.clone())
            {
                log::warn!("Indexing document timestamps without fresh evidence: {}", e);
            }

            let store = engine.refresh(assessment, &self.clients.collector(provider));
            let document = IncrementalDocument::open(bytes)?;
            bytes = workspace.stage("dss", document.append_dss(&store.to_write())?)?;
        } else {
            log::info!("All evidence is current, adding a document timestamp only");
        }

        let bytes = document_timestamp(&IncrementalDocument::open(bytes)?, provider, tsa)?;
        self.output.write_all(&bytes)?;
        self.output.flush()?;
        log::info!("Prolonged signatures, {} bytes written", bytes.len());
        Ok(self.output)
    }

    fn sign(
        mut self,
        level: BaselineLevel,
        properties: &SignerProperties,
        chain: &CertificateChain,
        key: &dyn ExternalSignature,
        tsa: Option<&dyn TsaClient>,
    ) -> Result<W> {
        let staging = self.staging_directory()?;
        let tsa = match tsa {
            None if level.needs_timestamp() => return Err(Error::TsaClientRequired(level.profile())),
            tsa => tsa.filter(|_| level.needs_timestamp()),
        };
        if level.needs_revocation() {
            self.clients
                .derive_if_missing(chain.certificates(), self.transport.clone())?;
        }

        log::info!("Producing {} signature", level.profile());
        let input = self.read_input()?;
        let mut workspace = Workspace::new(staging.as_deref());
        let provider = self.provider.as_ref();

        let document = IncrementalDocument::open(input)?;
        let mut estimated_size = self.config.estimated_signature_size;
        if let Some(tsa) = tsa {
            estimated_size += tsa.token_size_estimate();
        }
        let signed = approval_signature(&document, provider, properties, estimated_size, chain, key, tsa)?;
        let mut bytes = workspace.stage(if tsa.is_some() { "t" } else { "b" }, signed)?;

        if level.needs_revocation() {
            let collector = self.clients.collector(provider);
            let document = IncrementalDocument::open(bytes)?;
            bytes = workspace.stage("lt", validation_data(&document, provider, chain, &collector)?)?;
        }

        if level == BaselineLevel::Lta {
            if let Some(tsa) = tsa {
                bytes = document_timestamp(&IncrementalDocument::open(bytes)?, provider, tsa)?;
            }
        }

        self.output.write_all(&bytes)?;
        self.output.flush()?;
        log::info!("{} signature written ({} bytes)", level.profile(), bytes.len());
        Ok(self.output)
    }

    fn staging_directory(&self) -> Result<Option<PathBuf>> {
        Ok(self.config.validate()?.map(Path::to_path_buf))
    }

    fn read_input(&mut self) -> Result<Vec<u8>> {
        let mut input = Vec::new();
        self.input.read_to_end(&mut input)?;
        Ok(input)
    }
}

/// Append an approval signature, with a signature timestamp when `tsa` is set.
fn approval_signature(
    document: &dyn DocumentContainer,
    provider: &dyn CryptoProvider,
    properties: &SignerProperties,
    estimated_size: usize,
    chain: &CertificateChain,
    key: &dyn ExternalSignature,
    tsa: Option<&dyn TsaClient>,
) -> Result<Vec<u8>> {
    let prepared = document.prepare_signature(&SignatureRequest::approval(properties.clone(), estimated_size))?;
    let digest = key.digest_algorithm();
    let message_digest = provider.digest(digest, &prepared.signed_bytes()?);

    let signed_attributes = cades::cades_signed_attributes(oid::DATA, &message_digest, chain.leaf(), digest, provider)?;
    let signature = key.sign(&cades::encode_signed_attributes(&signed_attributes)?)?;

    let mut unsigned_attributes = Vec::new();
    if let Some(tsa) = tsa {
        let imprint = provider.digest(tsa.digest_algorithm(), &signature);
        let token = tsa.timestamp(&imprint)?;
        log::debug!("Signature timestamp token: {} bytes", token.len());
        unsigned_attributes.push(cades::attribute(oid::TIMESTAMP_TOKEN, Any::from_der(&token)?)?);
    }

    let parts = SignerInfoParts {
        signer: chain.leaf(),
        digest,
        signature_algorithm: key.signature_algorithm(),
        signed_attributes,
        signature: &signature,
        unsigned_attributes,
    };
    let certificates: Vec<&[u8]> = chain.iter().map(Certificate::der).collect();
    let der = cades::signed_data(parts, &certificates, None)?;
    log::debug!(
        "Signed {} as {} ({} bytes)",
        prepared.field_name,
        chain.leaf().label(),
        der.len()
    );
    prepared.embed(&der)
}

/// Append a DSS revision indexing the latest signature of `document`, and
/// every earlier signature the store does not index yet.
fn validation_data(
    document: &dyn DocumentContainer,
    provider: &dyn CryptoProvider,
    chain: &CertificateChain,
    collector: &RevocationEvidenceCollector<'_>,
) -> Result<Vec<u8>> {
    let mut signatures = document.signatures()?;
    let signature = signatures
        .pop()
        .ok_or_else(|| Error::InvalidPdf("Signature layer not found".to_string()))?;

    let mut certificates: Vec<Certificate> = chain.certificates().to_vec();
    for certificate in timestamp_certificates(&signature, provider)? {
        if !certificates.contains(&certificate) {
            certificates.push(certificate);
        }
    }

    let mut store = match document.read_dss()? {
        Some(contents) => DocumentSecurityStore::from_contents(&contents, provider),
        None => DocumentSecurityStore::new(),
    };
    let pool = store.parsed_certificates(provider);
    let evidence = collector.collect_mandatory(&certificates, &pool)?;
    let ders: Vec<&[u8]> = certificates.iter().map(Certificate::der).collect();
    store.record_vri(&signature.vri_key(provider), &ders, &evidence, Utc::now(), provider);

    for prior in &signatures {
        let key = prior.vri_key(provider);
        if store.vri(&key).is_some() {
            continue;
        }
        let certificates = match signature_certificates(prior, provider) {
            Ok(certificates) => certificates,
            Err(e) => {
                log::warn!("Cannot read signature {}: {}", prior.name, e);
                continue;
            },
        };
        log::debug!("Indexing earlier signature {}", prior.name);
        let evidence = collector.collect(&certificates, &pool);
        let ders: Vec<&[u8]> = certificates.iter().map(Certificate::der).collect();
        store.record_vri(&key, &ders, &evidence, Utc::now(), provider);
    }

    log::info!(
        "DSS holds {} certificates, {} OCSP responses, {} CRLs",
        store.certificate_count(),
        store.ocsp_count(),
        store.crl_count()
    );
    document.append_dss(&store.to_write())
}

/// Certificates embedded in the signature timestamp of `signature`, if any.
fn timestamp_certificates(signature: &SignatureField, provider: &dyn CryptoProvider) -> Result<Vec<Certificate>> {
    match cades::parse_signed_data(&signature.contents)?.timestamp_token() {
        Some(token) => cades::parse_signed_data(&token)?
            .certificates
            .into_iter()
            .map(|der| Certificate::from_der(der, provider))
            .collect(),
        None => Ok(Vec::new()),
    }
}

/// Certificates embedded in `signature` followed by those of its timestamp.
fn signature_certificates(signature: &SignatureField, provider: &dyn CryptoProvider) -> Result<Vec<Certificate>> {
    let mut certificates = Vec::new();
    let embedded = cades::parse_signed_data(&signature.contents)?.certificates;
    for der in embedded {
        certificates.push(Certificate::from_der(der, provider)?);
    }
    for certificate in timestamp_certificates(signature, provider)? {
        if !certificates.contains(&certificate) {
            certificates.push(certificate);
        }
    }
    Ok(certificates)
}

/// Append a document timestamp covering all of `document`.
fn document_timestamp(
    document: &dyn DocumentContainer,
    provider: &dyn CryptoProvider,
    tsa: &dyn TsaClient,
) -> Result<Vec<u8>> {
    let prepared = document.prepare_signature(&SignatureRequest::document_timestamp(tsa.token_size_estimate()))?;
    let imprint = provider.digest(tsa.digest_algorithm(), &prepared.signed_bytes()?);
    let token = tsa.timestamp(&imprint)?;
    log::debug!("Document timestamp {}: {} bytes", prepared.field_name, token.len());
    prepared.embed(&token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct NoTsa;

    impl TsaClient for NoTsa {
        fn digest_algorithm(&self) -> crate::signatures::DigestAlgorithm {
            crate::signatures::DigestAlgorithm::Sha256
        }

        fn token_size_estimate(&self) -> usize {
            0
        }

        fn timestamp(&self, _imprint: &[u8]) -> Result<Vec<u8>> {
            Err(Error::TrustService("unreachable".to_string()))
        }
    }

    /// Input that fails the test if anything reads it.
    struct Untouchable;

    impl Read for Untouchable {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            panic!("input must not be read");
        }
    }

    #[test]
    fn test_staging_path_checked_before_input() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = PadesConfig::new().with_temporary_directory(file.path());
        let signer = PadesSigner::new(Untouchable, Vec::new()).with_config(config);
        match signer.prolong_signatures(Some(&NoTsa)) {
            Err(Error::PathIsNotDirectory(path)) => assert_eq!(path, file.path()),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_prolongation_requires_tsa() {
        let signer = PadesSigner::new(Untouchable, Vec::new());
        assert!(matches!(
            signer.prolong_signatures(None),
            Err(Error::TsaClientRequired(_))
        ));
    }

    #[test]
    fn test_prolonging_unsigned_document_fails() {
        let pdf = b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
trailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";
        let signer = PadesSigner::new(Cursor::new(pdf.to_vec()), Vec::new());
        assert!(matches!(
            signer.prolong_signatures(Some(&NoTsa)),
            Err(Error::NoSignaturesToProlong)
        ));
    }
}
