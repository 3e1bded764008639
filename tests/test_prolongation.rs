//! Prolongation of LTV-enabled documents.

mod common;

use std::io::Cursor;

use chrono::{Duration, Utc};
use common::{one_page_pdf, TestCrl, TestOcsp, TestPki, TestTsa, TryLaterOcsp};
use pdf_pades::container::{DocumentContainer, IncrementalDocument};
use pdf_pades::crypto::DefaultCryptoProvider;
use pdf_pades::ltv::ProlongationEngine;
use pdf_pades::signatures::{SignatureInspector, SignerProperties};
use pdf_pades::{Error, PadesConfig, PadesSigner};

fn signer(input: &[u8]) -> PadesSigner<Cursor<Vec<u8>>, Vec<u8>> {
    common::init_logging();
    PadesSigner::new(Cursor::new(input.to_vec()), Vec::new())
}

fn lta_document(pki: &TestPki, tsa: &TestTsa, ocsp_validity: Duration) -> Vec<u8> {
    signer(&one_page_pdf())
        .with_ocsp_client(TestOcsp::new(ocsp_validity))
        .sign_baseline_lta(&SignerProperties::new(), &pki.chain(), &pki.key(), tsa.client())
        .unwrap()
}

#[test]
fn test_prolonging_document_without_signatures_fails() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let input = one_page_pdf();

    let result = signer(&input).prolong_signatures(tsa.client());
    assert!(matches!(result, Err(Error::NoSignaturesToProlong)));
    assert_eq!(tsa.calls.get(), 0);
}

#[test]
fn test_baseline_b_signature_is_not_prolongable() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let signed = signer(&one_page_pdf())
        .sign_baseline_b(&SignerProperties::new(), &pki.chain(), &pki.key())
        .unwrap();

    let result = signer(&signed).prolong_signatures(tsa.client());
    assert!(matches!(result, Err(Error::NoSignaturesToProlong)));
}

#[test]
fn test_prolongation_only_appends() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let original = lta_document(&pki, &tsa, Duration::days(30));
    let ocsp = TestOcsp::new(Duration::days(30));
    let ocsp_calls = ocsp.calls.clone();

    let prolonged = signer(&original)
        .with_ocsp_client(ocsp)
        .prolong_signatures(tsa.client())
        .unwrap();

    assert!(prolonged.len() > original.len());
    assert_eq!(&prolonged[..original.len()], original.as_slice());

    // Fresh evidence is only fetched for the archive timestamp's TSA certificate.
    assert_eq!(ocsp_calls.get(), 1);

    let document = IncrementalDocument::open(prolonged.clone()).unwrap();
    let signatures = document.signatures().unwrap();
    assert_eq!(signatures.len(), 3);
    assert!(signatures[2].is_document_timestamp());
    assert!(signatures[2].covers(prolonged.len()));

    let report = SignatureInspector::new().inspect(&document).unwrap();
    assert!(report.layers[0].has_vri);
    assert!(report.layers[1].has_vri);
    assert!(!report.layers[2].has_vri);
    assert!(report.layers.iter().all(|layer| layer.digest_matches == Some(true)));
}

#[test]
fn test_stale_evidence_is_refreshed() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    // Evidence lapsing within the default seven day margin.
    let original = lta_document(&pki, &tsa, Duration::days(1));
    let before = IncrementalDocument::open(original.clone()).unwrap().read_dss().unwrap().unwrap();

    let ocsp = TestOcsp::new(Duration::days(30));
    let ocsp_calls = ocsp.calls.clone();
    let prolonged = signer(&original)
        .with_ocsp_client(ocsp)
        .prolong_signatures(tsa.client())
        .unwrap();

    // Signer and TSA of the stale signature, then the archive timestamp's TSA.
    assert_eq!(ocsp_calls.get(), 3);

    let document = IncrementalDocument::open(prolonged).unwrap();
    let after = document.read_dss().unwrap().unwrap();
    assert_eq!(after.certs.len(), before.certs.len());
    assert!(after.ocsps.len() > before.ocsps.len());
    for blob in &before.ocsps {
        assert!(after.ocsps.contains(blob), "earlier evidence must be kept");
    }

    let provider = DefaultCryptoProvider::new();
    let key = document.signatures().unwrap()[0].vri_key(&provider);
    assert!(after.vri[&key].ocsps.len() > before.vri[&key].ocsps.len());
}

#[test]
fn test_current_evidence_is_not_refetched() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let original = lta_document(&pki, &tsa, Duration::days(30));
    let once = signer(&original)
        .with_ocsp_client(TestOcsp::new(Duration::days(30)))
        .prolong_signatures(tsa.client())
        .unwrap();

    let ocsp = TestOcsp::new(Duration::days(30));
    let ocsp_calls = ocsp.calls.clone();
    let twice = signer(&once)
        .with_ocsp_client(ocsp)
        .prolong_signatures(tsa.client())
        .unwrap();

    // Only the newest archive timestamp lacks a VRI.
    assert_eq!(ocsp_calls.get(), 1);
    assert!(twice.starts_with(&once));
}

#[test]
fn test_assessment_honours_refresh_margin() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let document = IncrementalDocument::open(lta_document(&pki, &tsa, Duration::days(10))).unwrap();
    let provider = DefaultCryptoProvider::new();

    let lenient = ProlongationEngine::new(&provider, Duration::days(1))
        .assess(&document)
        .unwrap();
    assert_eq!(lenient.eligible, 1);
    assert!(lenient.stale.is_empty());
    assert_eq!(lenient.unindexed_timestamps.len(), 1);

    let strict = ProlongationEngine::new(&provider, Duration::days(30))
        .assess(&document)
        .unwrap();
    assert_eq!(strict.stale.len(), 1);
    assert!(strict.needs_revocation());
}

#[test]
fn test_assessment_uses_engine_clock() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let document = IncrementalDocument::open(lta_document(&pki, &tsa, Duration::days(10))).unwrap();
    let provider = DefaultCryptoProvider::new();
    let today = ProlongationEngine::new(&provider, Duration::days(1))
        .with_now(Utc::now())
        .assess(&document)
        .unwrap();
    assert!(today.stale.is_empty());

    // Ten day evidence is inside the one day margin after nine and a half days.
    let later = ProlongationEngine::new(&provider, Duration::days(1))
        .with_now(Utc::now() + Duration::hours(9 * 24 + 12))
        .assess(&document)
        .unwrap();
    assert_eq!(later.stale.len(), 1);
    assert_eq!(later.stale[0].vri_key, document.signatures().unwrap()[0].vri_key(&provider));
}

#[test]
fn test_repeated_prolongation_with_identical_responses() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let produced_at = Utc::now();
    let original = signer(&one_page_pdf())
        .with_ocsp_client(TestOcsp::fixed(Duration::days(30), produced_at))
        .sign_baseline_lta(&SignerProperties::new(), &pki.chain(), &pki.key(), tsa.client())
        .unwrap();

    // A margin beyond the response validity makes every VRI stale each time.
    let prolong = |input: &[u8]| {
        signer(input)
            .with_config(PadesConfig::new().with_refresh_margin(Duration::days(60)))
            .with_ocsp_client(TestOcsp::fixed(Duration::days(30), produced_at))
            .prolong_signatures(tsa.client())
            .unwrap()
    };
    let once = prolong(&original);
    let twice = prolong(&once);

    let dss = |bytes: &[u8]| IncrementalDocument::open(bytes.to_vec()).unwrap().read_dss().unwrap().unwrap();
    let (before, first, second) = (dss(&original), dss(&once), dss(&twice));
    assert_eq!(before.ocsps.len(), 2);
    for dss in [&first, &second] {
        assert_eq!(dss.ocsps.len(), before.ocsps.len());
        assert!(before.ocsps.iter().all(|blob| dss.ocsps.contains(blob)));
    }
    assert_eq!(second.certs.len(), before.certs.len());

    let document = IncrementalDocument::open(twice).unwrap();
    assert_eq!(document.signatures().unwrap().len(), 4);
    assert_eq!(second.vri.len(), 3);
}

#[test]
fn test_unusable_ocsp_answer_falls_back_to_crl() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let original = lta_document(&pki, &tsa, Duration::days(1));
    let before = IncrementalDocument::open(original.clone()).unwrap().read_dss().unwrap().unwrap();

    let ocsp = TryLaterOcsp::new();
    let ocsp_calls = ocsp.calls.clone();
    let crl = TestCrl::new(Duration::days(30));
    let crl_calls = crl.calls.clone();
    let prolonged = signer(&original)
        .with_ocsp_client(ocsp)
        .with_crl_client(crl)
        .prolong_signatures(tsa.client())
        .unwrap();

    assert!(ocsp_calls.get() > 0);
    assert_eq!(crl_calls.get(), ocsp_calls.get());
    let after = IncrementalDocument::open(prolonged).unwrap().read_dss().unwrap().unwrap();
    assert_eq!(after.ocsps.len(), before.ocsps.len());
    assert!(before.crls.is_empty());
    assert!(!after.crls.is_empty());
}

#[test]
fn test_prolongation_failure_leaves_output_empty() {
    let pki = TestPki::new();
    let tsa = pki.tsa_client();
    let original = lta_document(&pki, &tsa, Duration::days(1));

    let staging = tempfile::tempdir().unwrap();
    let mut output = Vec::new();
    // Stale evidence, no configured client and no AIA/CDP to derive one from.
    let result = PadesSigner::new(Cursor::new(original), &mut output)
        .with_config(PadesConfig::new().with_temporary_directory(staging.path()))
        .prolong_signatures(tsa.client());
    assert!(matches!(result, Err(Error::DefaultClientsCannotBeCreated)));
    assert!(output.is_empty());
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}
