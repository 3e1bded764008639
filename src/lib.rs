// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::match_like_matches_macro)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]

//! # PDF PAdES
//!
//! PAdES baseline signatures and long-term validation maintenance for PDF.
//!
//! ## Core Features
//!
//! - **Baseline Profiles**: B-B, B-T, B-LT and B-LTA signatures, each stage
//!   appended as an incremental revision
//! - **Revocation Evidence**: OCSP first with CRL fallback, per-certificate
//!   gaps recorded instead of aborting
//! - **Document Security Store**: cumulative `/DSS` with per-signature VRI
//!   dictionaries, merged idempotently
//! - **Prolongation**: refresh lapsing evidence and seal the file with a new
//!   document timestamp
//! - **Pluggable Trust Services**: `OcspClient`, `CrlClient` and `TsaClient`
//!   traits with HTTP implementations
//!
//! ## Architecture
//!
//! - [`container`]: reads signature fields and the DSS, appends revisions
//! - [`cades`] / [`asn1`]: CAdES `SignedData`, OCSP and RFC 3161 structures
//! - [`crypto`]: certificate inspection, hashing and signing keys
//! - [`clients`]: trust-service clients
//! - [`ltv`]: evidence collection, DSS merging, prolongation
//! - [`signer`]: the [`signer::PadesSigner`] orchestrating the profiles
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_pades::crypto::{CertificateChain, DefaultCryptoProvider, PrivateKeySignature};
//! use pdf_pades::signatures::{DigestAlgorithm, SignerProperties};
//! use pdf_pades::signer::PadesSigner;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = DefaultCryptoProvider::new();
//! let chain = CertificateChain::from_der(vec![signer_der, ca_der], &provider)?;
//! let key = PrivateKeySignature::from_pkcs8_pem(&key_pem, DigestAlgorithm::Sha256)?;
//!
//! let input = std::fs::File::open("document.pdf")?;
//! let output = std::fs::File::create("document-signed.pdf")?;
//! PadesSigner::new(input, output).sign_baseline_b(&SignerProperties::new(), &chain, &key)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// PDF syntax
pub mod lexer;
pub mod object;
pub mod parser;
pub mod writer;

// Document model and incremental revisions
pub mod container;

// Cryptographic syntax and primitives
pub mod asn1;
pub mod cades;
pub mod crypto;

// Signatures, trust services and long-term validation
pub mod clients;
pub mod ltv;
pub mod signatures;
pub mod signer;

pub use config::PadesConfig;
pub use error::{Error, Result};
pub use signer::PadesSigner;

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
