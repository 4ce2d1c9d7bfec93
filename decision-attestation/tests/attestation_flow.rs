//! End-to-end attest/verify behaviour against the reference collaborators.

use std::sync::Arc;

use decision_attestation::{
    AttestationRegistrar, CommitmentStore, Ed25519KeySigner, FileCommitmentStore, HashAlgorithm,
    KeySigner, MemoryCommitmentStore, SignatureBytes, SignerId, SigningKey, Value,
    VerificationCode,
};

fn registrar_with(store: Arc<MemoryCommitmentStore>) -> AttestationRegistrar {
    AttestationRegistrar::builder()
        .signer(Arc::new(Ed25519KeySigner::generate()))
        .store(store)
        .build()
        .unwrap()
}

fn registrar() -> AttestationRegistrar {
    registrar_with(Arc::new(MemoryCommitmentStore::new()))
}

#[tokio::test]
async fn test_round_trip() {
    let registrar = registrar();
    let vectors = [
        Value::map([("user", Value::from("alice")), ("amount", Value::from(10))]),
        Value::Null,
        Value::from(vec![Value::from(1), Value::from("two"), Value::from(3.5)]),
        Value::map([
            ("nested", Value::map([("deep", Value::from(vec![Value::bytes(vec![0u8, 1, 2])]))])),
            ("flag", Value::from(false)),
        ]),
    ];

    for v in &vectors {
        let attestation = registrar.attest_inputs(v).await.unwrap();
        let result = registrar.verify_attestation(&attestation.digest, v).await.unwrap();
        assert!(result.valid, "{v:?}");
        assert_eq!(result.code, None);
    }
}

#[tokio::test]
async fn test_concrete_proposal_scenario() {
    let registrar = registrar();
    let approve = Value::map([("proposalId", "P-42"), ("decision", "approve")]);
    let reject = Value::map([("proposalId", "P-42"), ("decision", "reject")]);

    let h = registrar.attest_inputs(&approve).await.unwrap().digest;

    let ok = registrar.verify_attestation(&h, &approve).await.unwrap();
    assert!(ok.valid);
    assert_eq!(ok.signer_id, Some(registrar.signer_id()));
    assert_eq!(ok.protocol_version.as_deref(), Some("dac/1"));
    assert!(ok.timestamp.is_some());

    let tampered = registrar.verify_attestation(&h, &reject).await.unwrap();
    assert!(!tampered.valid);
    assert_eq!(tampered.code, Some(VerificationCode::HashMismatch));
}

#[tokio::test]
async fn test_tamper_detection() {
    let registrar = registrar();
    let v1 = Value::map([("user", Value::from("alice")), ("amount", Value::from(10))]);
    let v2 = Value::map([("user", Value::from("alice")), ("amount", Value::from(11))]);

    let digest = registrar.attest_inputs(&v1).await.unwrap().digest;
    let result = registrar.verify_attestation(&digest, &v2).await.unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"valid": false, "code": "E_HASH_MISMATCH"})
    );
}

#[tokio::test]
async fn test_content_matching_another_commitment_is_mismatch() {
    let registrar = registrar();
    let v1 = Value::map([("decision", "approve")]);
    let v2 = Value::map([("decision", "reject")]);

    let d1 = registrar.attest_inputs(&v1).await.unwrap().digest;
    registrar.attest_inputs(&v2).await.unwrap();

    // v2 has its own valid commitment, but not under d1
    let result = registrar.verify_attestation(&d1, &v2).await.unwrap();
    assert_eq!(result.code, Some(VerificationCode::HashMismatch));
}

#[tokio::test]
async fn test_unknown_digest() {
    let registrar = registrar();
    let any = Value::map([("x", 1)]);

    let result = registrar.verify_attestation_str(&"0".repeat(64), &any).await.unwrap();
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({"valid": false, "code": "E_NOT_FOUND"})
    );

    let malformed = registrar.verify_attestation_str("not-a-digest", &any).await.unwrap();
    assert_eq!(malformed.code, Some(VerificationCode::NotFound));
}

#[tokio::test]
async fn test_forged_signature() {
    let store = Arc::new(MemoryCommitmentStore::new());
    let registrar = registrar_with(store.clone());
    let v = Value::map([("proposalId", "P-7"), ("decision", "approve")]);

    let digest = registrar.attest_inputs(&v).await.unwrap().digest;
    let mut record = store.get_attestation(&digest).await.unwrap().unwrap();
    let mut forged = record.signature.as_bytes().to_vec();
    forged[0] ^= 0x01;
    record.signature = SignatureBytes(forged);
    store.store_attestation(&record).await.unwrap();

    let result = registrar.verify_attestation(&digest, &v).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.code, Some(VerificationCode::SignatureInvalid));
}

#[tokio::test]
async fn test_record_attributed_to_unknown_signer() {
    let store = Arc::new(MemoryCommitmentStore::new());
    let registrar = registrar_with(store.clone());
    let v = Value::map([("decision", "approve")]);

    let digest = registrar.attest_inputs(&v).await.unwrap().digest;
    let mut record = store.get_attestation(&digest).await.unwrap().unwrap();
    record.signer_id = SignerId::from("mallory");
    store.store_attestation(&record).await.unwrap();

    let result = registrar.verify_attestation(&digest, &v).await.unwrap();
    assert_eq!(result.code, Some(VerificationCode::SignatureInvalid));
}

#[tokio::test]
async fn test_verifier_trusting_original_signer() {
    let store = Arc::new(MemoryCommitmentStore::new());
    let author = Arc::new(Ed25519KeySigner::generate());
    let attesting = AttestationRegistrar::builder()
        .signer(author.clone())
        .store(store.clone())
        .build()
        .unwrap();
    let v = Value::map([("decision", "approve")]);
    let digest = attesting.attest_inputs(&v).await.unwrap().digest;

    let stranger = AttestationRegistrar::builder()
        .signer(Arc::new(Ed25519KeySigner::generate()))
        .store(store.clone())
        .build()
        .unwrap();
    let result = stranger.verify_attestation(&digest, &v).await.unwrap();
    assert_eq!(result.code, Some(VerificationCode::SignatureInvalid));

    let mut auditor_signer = Ed25519KeySigner::generate();
    auditor_signer.trust(author.verifying_key());
    let auditor = AttestationRegistrar::builder()
        .signer(Arc::new(auditor_signer))
        .store(store)
        .build()
        .unwrap();
    let result = auditor.verify_attestation(&digest, &v).await.unwrap();
    assert!(result.valid);
    assert_eq!(result.signer_id, Some(author.identity_id()));
}

#[tokio::test]
async fn test_idempotent_reattestation() {
    let store = Arc::new(MemoryCommitmentStore::new());
    let registrar = registrar_with(store.clone());
    let v = Value::map([("user", Value::from("alice")), ("amount", Value::from(10))]);

    let first = registrar.attest_inputs(&v).await.unwrap();
    let first_record = registrar.commitment(&first.digest).await.unwrap().unwrap();
    let second = registrar.attest_inputs(&v).await.unwrap();
    let second_record = registrar.commitment(&second.digest).await.unwrap().unwrap();

    assert_eq!(first.digest, second.digest);
    assert_eq!(first_record.signer_id, second_record.signer_id);
    assert_eq!(store.len(), 1);

    for attestation in [&first, &second] {
        let result = registrar.verify_attestation(&attestation.digest, &v).await.unwrap();
        assert!(result.valid);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_attestations() {
    let store = Arc::new(MemoryCommitmentStore::new());
    let registrar = Arc::new(registrar_with(store.clone()));
    let v = Value::map([("proposalId", "P-42"), ("decision", "approve")]);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registrar = registrar.clone();
        let v = v.clone();
        handles.push(tokio::spawn(async move { registrar.attest_inputs(&v).await }));
    }

    let mut digests = Vec::new();
    for handle in handles {
        digests.push(handle.await.unwrap().unwrap().digest);
    }

    assert!(digests.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.len(), 1);
    let result = registrar.verify_attestation(&digests[0], &v).await.unwrap();
    assert!(result.valid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_attestations() {
    let store = Arc::new(MemoryCommitmentStore::new());
    let registrar = Arc::new(registrar_with(store.clone()));

    let mut handles = Vec::new();
    for i in 0..32i64 {
        let registrar = registrar.clone();
        handles.push(tokio::spawn(async move {
            let v = Value::map([("ticket", i)]);
            let attestation = registrar.attest_inputs(&v).await.unwrap();
            registrar.verify_attestation(&attestation.digest, &v).await.unwrap()
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().valid);
    }
    assert_eq!(store.len(), 32);
}

#[tokio::test]
async fn test_commitment_algorithm_survives_config_change() {
    let store = Arc::new(MemoryCommitmentStore::new());
    let key = SigningKey::from_bytes(&[7u8; 32]);
    let v = Value::map([("decision", "approve")]);

    let sha512 = AttestationRegistrar::builder()
        .signer(Arc::new(Ed25519KeySigner::new(key.clone())))
        .store(store.clone())
        .hash_algorithm(HashAlgorithm::Sha512)
        .build()
        .unwrap();
    let digest = sha512.attest_inputs(&v).await.unwrap().digest;
    assert_eq!(digest.as_str().len(), 128);

    let sha256 = AttestationRegistrar::builder()
        .signer(Arc::new(Ed25519KeySigner::new(key)))
        .store(store)
        .build()
        .unwrap();
    let result = sha256.verify_attestation(&digest, &v).await.unwrap();
    assert!(result.valid);
}

#[tokio::test]
async fn test_blake3_round_trip() {
    let registrar = AttestationRegistrar::builder()
        .signer(Arc::new(Ed25519KeySigner::generate()))
        .store(Arc::new(MemoryCommitmentStore::new()))
        .hash_algorithm(HashAlgorithm::Blake3)
        .build()
        .unwrap();
    let v = Value::map([("decision", "approve")]);

    let digest = registrar.attest_inputs(&v).await.unwrap().digest;
    assert!(registrar.verify_attestation(&digest, &v).await.unwrap().valid);
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key = SigningKey::from_bytes(&[42u8; 32]);
    let v = Value::map([("proposalId", "P-42"), ("decision", "approve")]);

    let digest = {
        let registrar = AttestationRegistrar::builder()
            .signer(Arc::new(Ed25519KeySigner::new(key.clone())))
            .store(Arc::new(FileCommitmentStore::open(dir.path()).await.unwrap()))
            .build()
            .unwrap();
        registrar.attest_inputs(&v).await.unwrap().digest
    };

    let restarted = AttestationRegistrar::builder()
        .signer(Arc::new(Ed25519KeySigner::new(key)))
        .store(Arc::new(FileCommitmentStore::open(dir.path()).await.unwrap()))
        .build()
        .unwrap();

    assert!(restarted.verify_attestation(&digest, &v).await.unwrap().valid);
    let other = Value::map([("proposalId", "P-42"), ("decision", "reject")]);
    assert_eq!(
        restarted.verify_attestation(&digest, &other).await.unwrap().code,
        Some(VerificationCode::HashMismatch)
    );
}

#[tokio::test]
async fn test_attest_serializable_matches_value() {
    #[derive(serde::Serialize)]
    struct Decision<'a> {
        #[serde(rename = "proposalId")]
        proposal_id: &'a str,
        decision: &'a str,
    }

    let registrar = registrar();
    let attestation = registrar
        .attest_serializable(&Decision { proposal_id: "P-42", decision: "approve" })
        .await
        .unwrap();

    let v = Value::map([("decision", "approve"), ("proposalId", "P-42")]);
    assert!(registrar.verify_attestation(&attestation.digest, &v).await.unwrap().valid);
}

#[tokio::test]
async fn test_failed_file_write_leaves_no_commitment() {
    let dir = tempfile::tempdir().unwrap();
    let registrar = AttestationRegistrar::builder()
        .signer(Arc::new(Ed25519KeySigner::generate()))
        .store(Arc::new(FileCommitmentStore::open(dir.path()).await.unwrap()))
        .build()
        .unwrap();
    let v = Value::map([("proposalId", "P-9"), ("decision", "approve")]);

    let digest = registrar.canonicalizer().digest_of(&v, HashAlgorithm::Sha256).unwrap();
    let blocker = dir.path().join(format!("{digest}.cbor"));
    std::fs::create_dir(&blocker).unwrap();

    let err = registrar.attest_inputs(&v).await.unwrap_err();
    assert_eq!(err.code(), "E_STORE_FAILURE");

    std::fs::remove_dir(&blocker).unwrap();
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
    assert!(registrar.commitment(&digest).await.unwrap().is_none());
    assert_eq!(
        registrar.verify_attestation(&digest, &v).await.unwrap().code,
        Some(VerificationCode::NotFound)
    );
}
