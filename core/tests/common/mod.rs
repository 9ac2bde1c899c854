//! Shared test utilities and fixtures

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use vetted_config::ProofConfig;
use vetted_core::{ManualClock, NodeSpec, ProofService};

pub const AUTHOR: &str = "author";
pub const PROVER: &str = "prover";
pub const VERIFIER: &str = "verifier";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 9, 0, 0).unwrap()
}

/// In-memory proof of "P" with a controllable clock.
pub fn proof() -> (ProofService<ManualClock>, ManualClock) {
    proof_with(ProofConfig::default())
}

pub fn proof_with(config: ProofConfig) -> (ProofService<ManualClock>, ManualClock) {
    let clock = ManualClock::new(start());
    let service = ProofService::in_memory("P", AUTHOR, config, clock.clone()).expect("init proof");
    (service, clock)
}

/// On-disk proof of "P" in a fresh temp directory. Keep the `TempDir` alive for the test.
pub fn disk_proof() -> (TempDir, ProofService<ManualClock>, ManualClock) {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(start());
    let service = ProofService::init_with(
        dir.path().join("proof"),
        "P",
        AUTHOR,
        ProofConfig::default(),
        clock.clone(),
    )
    .expect("init proof");
    (dir, service, clock)
}

/// Claim the root as [`PROVER`] and refine it into `statements.len()` children.
pub fn refined(statements: &[&str]) -> (ProofService<ManualClock>, ManualClock) {
    let (mut proof, clock) = proof();
    proof.claim_node("1", PROVER, None).expect("claim root");
    let specs: Vec<NodeSpec> = statements.iter().map(|s| NodeSpec::claim(*s)).collect();
    proof
        .refine_node_bulk("1", PROVER, &specs)
        .expect("refine root");
    (proof, clock)
}
