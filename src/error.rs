//! Error types for PAdES signing and LTV maintenance.
//!
//! Structural preconditions (staging path, missing clients, nothing to
//! prolong) have dedicated variants so callers can match on them; container,
//! network and file-system failures travel through [`Error::Io`] unchanged.

use std::path::PathBuf;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while signing or prolonging a document.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// The configured temporary directory path does not resolve to a directory
    #[error(
        "Provided path: {} is not a directory. Please provide a directory path to store \
         temporary pdf files which are required for signing.",
        .0.display()
    )]
    PathIsNotDirectory(PathBuf),

    /// Revocation evidence is required, no client was supplied and none could be derived
    #[error(
        "Default OCSP and CRL clients cannot be created, because the signing certificate \
         chain doesn't contain revocation data access information. Please provide OCSP or \
         CRL client."
    )]
    DefaultClientsCannotBeCreated,

    /// Prolongation was requested on a document without LTV-enabled signatures
    #[error("There are no signatures in the document which can be prolonged.")]
    NoSignaturesToProlong,

    /// No revocation evidence could be obtained for the whole chain
    #[error("No revocation evidence could be obtained for the certificate chain")]
    RevocationUnavailable,

    /// The requested profile needs a timestamp authority client
    #[error("A TSA client is required for {0}")]
    TsaClientRequired(&'static str),

    /// IO error (container, staging files or network)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid PDF structure
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Referenced object not found in the document
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Certificate could not be inspected
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Malformed DER structure
    #[error("ASN.1 error: {0}")]
    Asn1(String),

    /// A trust service (OCSP, CRL, TSA) answered with an error or not at all
    #[error("Trust service error: {0}")]
    TrustService(String),

    /// Signing key failure
    #[error("Signing error: {0}")]
    Signing(String),

    /// The encoded signature does not fit into the reserved placeholder
    #[error("Signature ({needed} bytes) exceeds placeholder size ({available} bytes)")]
    PlaceholderTooSmall {
        /// Hex-encoded size that was needed, brackets included
        needed: usize,
        /// Placeholder size that was reserved
        available: usize,
    },
}

impl From<der::Error> for Error {
    fn from(e: der::Error) -> Self {
        Error::Asn1(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_not_directory_message() {
        let err = Error::PathIsNotDirectory(PathBuf::from("/tmp/out/newPdf.pdf"));
        let msg = format!("{}", err);
        assert!(msg.contains("/tmp/out/newPdf.pdf"));
        assert!(msg.contains("is not a directory"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_der_error_is_asn1() {
        let err: Error = der::Error::from(der::ErrorKind::Overflow).into();
        assert!(matches!(err, Error::Asn1(_)));
    }

    #[test]
    fn test_placeholder_error() {
        let err = Error::PlaceholderTooSmall {
            needed: 20,
            available: 10,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("20"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
