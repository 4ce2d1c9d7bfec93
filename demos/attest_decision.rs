//! Example: Attesting a governance decision and verifying candidates against it
//!
//! Run with: cargo run --example attest_decision
//! Set RUST_LOG=decision_attestation=debug to see the registrar's spans.

use std::sync::Arc;

use decision_attestation::{
    AttestationRegistrar, Ed25519KeySigner, FileCommitmentStore, HashAlgorithm, KeySigner,
    RegistrarConfig, Value,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Decision Attestation - Example Usage\n");
    println!("==============================================\n");

    // Step 1: Signing identity (in production this key lives in a KMS or HSM)
    println!("1. Generating signing identity...");
    let signer = Arc::new(Ed25519KeySigner::generate());
    println!("   Signer ID: {}...\n", &signer.identity_id().as_str()[..16]);

    // Step 2: Durable commitment store
    println!("2. Opening commitment store...");
    let dir = std::env::temp_dir().join("decision-attestation-demo");
    let store = Arc::new(FileCommitmentStore::open(dir.clone()).await?);
    println!("   Store root: {}\n", store.root().display());

    // Step 3: Registrar
    let config = RegistrarConfig::default().with_hash_algorithm(HashAlgorithm::Sha256);
    let registrar = AttestationRegistrar::builder()
        .signer(signer)
        .store(store)
        .config(config)
        .build()?;

    // Step 4: Attest a decision
    println!("3. Attesting decision...");
    let decision = Value::map([("proposalId", "P-42"), ("decision", "approve")]);
    let attestation = registrar.attest_inputs(&decision).await?;
    println!("   Digest: {}", attestation.digest);
    println!("   Signature: {}...\n", &attestation.signature.to_hex()[..32]);

    // Step 5: Verify the same content, built in a different field order
    println!("4. Verifying original decision (fields reordered)...");
    let reordered = Value::map([("decision", "approve"), ("proposalId", "P-42")]);
    let result = registrar.verify_attestation(&attestation.digest, &reordered).await?;
    println!("   {}\n", serde_json::to_string(&result)?);

    // Step 6: Verify tampered content
    println!("5. Verifying tampered decision...");
    let tampered = Value::map([("proposalId", "P-42"), ("decision", "reject")]);
    let result = registrar.verify_attestation(&attestation.digest, &tampered).await?;
    println!("   {}\n", serde_json::to_string(&result)?);

    // Step 7: Unknown digest
    println!("6. Verifying against an unknown digest...");
    let result = registrar
        .verify_attestation_str(&"0".repeat(64), &decision)
        .await?;
    println!("   {}\n", serde_json::to_string(&result)?);

    println!("==============================================");
    println!("Attestation workflow complete!");
    Ok(())
}
