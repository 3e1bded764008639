//! Signing keys.

use der::asn1::Any;
use pkcs8::DecodePrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::RsaPrivateKey;
use signature::{SignatureEncoding, Signer};
use spki::AlgorithmIdentifierOwned;

use crate::asn1::oid;
use crate::error::{Error, Result};
use crate::signatures::DigestAlgorithm;

/// Public-key algorithm of a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5
    Rsa,
    /// ECDSA
    Ecdsa,
    /// Ed25519
    Ed25519,
}

impl SignatureAlgorithm {
    /// AlgorithmIdentifier for a SignerInfo `signatureAlgorithm`.
    pub fn algorithm_identifier(&self, digest: DigestAlgorithm) -> AlgorithmIdentifierOwned {
        let (oid, parameters) = match self {
            SignatureAlgorithm::Rsa => (oid::RSA_ENCRYPTION, Some(Any::null())),
            SignatureAlgorithm::Ecdsa => {
                let oid = match digest {
                    DigestAlgorithm::Sha1 => oid::ECDSA_SHA1,
                    DigestAlgorithm::Sha256 => oid::ECDSA_SHA256,
                    DigestAlgorithm::Sha384 => oid::ECDSA_SHA384,
                    DigestAlgorithm::Sha512 => oid::ECDSA_SHA512,
                };
                (oid, None)
            },
            SignatureAlgorithm::Ed25519 => (oid::ED25519, None),
        };
        AlgorithmIdentifierOwned { oid, parameters }
    }
}

/// A key that signs the DER-encoded signed attributes of a CMS SignerInfo.
///
/// Implement this for HSMs or remote signing services.
pub trait ExternalSignature {
    /// Digest used for the message digest and the signature.
    fn digest_algorithm(&self) -> DigestAlgorithm;

    /// Public-key algorithm.
    fn signature_algorithm(&self) -> SignatureAlgorithm;

    /// Sign `message`; hashing is the signer's job.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// RSA PKCS#1 v1.5 signing with an in-memory private key.
#[derive(Clone)]
pub struct PrivateKeySignature {
    key: RsaPrivateKey,
    digest: DigestAlgorithm,
}

impl std::fmt::Debug for PrivateKeySignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeySignature")
            .field("key", &"[REDACTED]")
            .field("digest", &self.digest)
            .finish()
    }
}

impl PrivateKeySignature {
    /// Wrap an RSA key.
    pub fn new(key: RsaPrivateKey, digest: DigestAlgorithm) -> Self {
        Self { key, digest }
    }

    /// Load a DER-encoded PKCS#8 RSA key.
    pub fn from_pkcs8_der(der: &[u8], digest: DigestAlgorithm) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| Error::Signing(format!("Invalid PKCS#8 key: {}", e)))?;
        Ok(Self::new(key, digest))
    }

    /// Load a PEM-encoded PKCS#8 RSA key.
    pub fn from_pkcs8_pem(pem: &str, digest: DigestAlgorithm) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::Signing(format!("Invalid PKCS#8 key: {}", e)))?;
        Ok(Self::new(key, digest))
    }

    fn sign_with<D>(&self, message: &[u8]) -> Result<Vec<u8>>
    where
        D: sha2::Digest + pkcs8::AssociatedOid,
    {
        let signing_key = SigningKey::<D>::new(self.key.clone());
        let signature = signing_key
            .try_sign(message)
            .map_err(|e| Error::Signing(format!("RSA signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

impl ExternalSignature for PrivateKeySignature {
    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Rsa
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self.digest {
            DigestAlgorithm::Sha1 => self.sign_with::<sha1::Sha1>(message),
            DigestAlgorithm::Sha256 => self.sign_with::<sha2::Sha256>(message),
            DigestAlgorithm::Sha384 => self.sign_with::<sha2::Sha384>(message),
            DigestAlgorithm::Sha512 => self.sign_with::<sha2::Sha512>(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::VerifyingKey;
    use signature::Verifier;

    #[test]
    fn test_rsa_signature_verifies() {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let verifying = VerifyingKey::<sha2::Sha256>::new(key.to_public_key());
        let signer = PrivateKeySignature::new(key, DigestAlgorithm::Sha256);

        let signature = signer.sign(b"signed attributes").unwrap();
        let parsed = rsa::pkcs1v15::Signature::try_from(signature.as_slice()).unwrap();
        assert!(verifying.verify(b"signed attributes", &parsed).is_ok());
        assert_eq!(signer.signature_algorithm(), SignatureAlgorithm::Rsa);
    }

    #[test]
    fn test_debug_redacts_key() {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let signer = PrivateKeySignature::new(key, DigestAlgorithm::Sha256);
        assert!(format!("{:?}", signer).contains("[REDACTED]"));
    }

    #[test]
    fn test_algorithm_identifiers() {
        let rsa = SignatureAlgorithm::Rsa.algorithm_identifier(DigestAlgorithm::Sha256);
        assert_eq!(rsa.oid, oid::RSA_ENCRYPTION);
        assert!(rsa.parameters.map_or(false, |p| p.is_null()));
        let ec = SignatureAlgorithm::Ecdsa.algorithm_identifier(DigestAlgorithm::Sha384);
        assert_eq!(ec.oid.to_string(), "1.2.840.10045.4.3.3");
        assert!(ec.parameters.is_none());
    }

    #[test]
    fn test_rejects_invalid_pkcs8() {
        assert!(PrivateKeySignature::from_pkcs8_der(b"junk", DigestAlgorithm::Sha256).is_err());
    }
}
