//! Long-term validation: revocation evidence, the document security store
//! and prolongation of existing signatures.

pub mod collector;
pub mod dss;
pub mod evidence;
pub mod prolong;

pub use collector::RevocationEvidenceCollector;
pub use dss::{DocumentSecurityStore, VriRecord};
pub use evidence::{EvidenceGap, EvidenceItem, EvidenceKey, EvidenceKind, RevocationEvidence};
pub use prolong::{Assessment, PendingSignature, ProlongationEngine};
