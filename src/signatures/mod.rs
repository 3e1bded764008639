//! PDF signature building blocks.
//!
//! This module holds the vocabulary shared by the signer and the LTV
//! machinery: digest algorithms, `/SubFilter` values, baseline levels and
//! the properties of an approval signature. It also provides the byte range
//! arithmetic for placeholders and a read-only inspector that reports the
//! signature layers and DSS of a document.
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-2:2020 Section 12.8 - Digital Signatures
//! - ETSI EN 319 142-1 - PAdES baseline signatures

mod byterange;
mod inspect;
mod types;

pub use byterange::{ByteRangeCalculator, BYTE_RANGE_PLACEHOLDER_WIDTH};
pub use inspect::{DssReport, LayerReport, LtvReport, SignatureInspector};
pub use types::{BaselineLevel, DigestAlgorithm, Rect, SignatureSubFilter, SignerProperties};
