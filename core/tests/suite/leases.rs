use std::time::Duration;

use chrono::TimeDelta;
use vetted_core::{NodeSpec, ProofError};
use vetted_types::NodeId;

use crate::common::{PROVER, proof, refined, start};

const HOUR: Duration = Duration::from_secs(3600);

#[test]
fn only_the_lease_holder_may_refine() {
    let (mut proof, _clock) = proof();
    proof.claim_node("1", "A", Some(HOUR)).unwrap();

    let err = proof
        .refine_node("1", "B", &NodeSpec::claim("Q"))
        .unwrap_err();
    assert!(matches!(err, ProofError::OwnerMismatch { .. }), "{err:?}");

    proof.refine_node("1", "A", &NodeSpec::claim("Q")).unwrap();
}

#[test]
fn second_claim_fails_while_lease_is_active() {
    let (mut proof, clock) = proof();
    proof.claim_node("1", "A", Some(HOUR)).unwrap();

    clock.advance(TimeDelta::minutes(59));
    let err = proof.claim_node("1", "B", Some(HOUR)).unwrap_err();
    assert!(matches!(err, ProofError::LeaseHeld { ref holder, .. } if holder.as_str() == "A"));
}

#[test]
fn expired_lease_stops_refinement_and_frees_the_node() {
    let (mut proof, clock) = proof();
    proof.claim_node("1", "A", Some(HOUR)).unwrap();

    clock.advance(TimeDelta::hours(1));
    let err = proof
        .refine_node("1", "A", &NodeSpec::claim("Q"))
        .unwrap_err();
    assert!(matches!(err, ProofError::NotClaimed(_)));

    let state = proof.load_state().unwrap();
    assert_eq!(state.pending_nodes(proof.now()).len(), 1);

    let lease = proof.claim_node("1", "B", Some(HOUR)).unwrap();
    assert_eq!(lease.expires_at, start() + TimeDelta::hours(2));
}

#[test]
fn reclaim_by_holder_extends_the_lease() {
    let (mut proof, clock) = proof();
    proof.claim_node("1", "A", Some(HOUR)).unwrap();
    clock.advance(TimeDelta::minutes(30));
    let lease = proof.claim_node("1", "A", Some(HOUR)).unwrap();
    assert_eq!(lease.expires_at, start() + TimeDelta::minutes(90));
}

#[test]
fn release_returns_the_node_to_the_pool() {
    let (mut proof, _clock) = refined(&["A"]);
    proof.claim_node("1.1", PROVER, Some(HOUR)).unwrap();
    let now = proof.now();
    assert!(
        proof
            .load_state()
            .unwrap()
            .pending_nodes(now)
            .iter()
            .all(|node| node.id != NodeId::parse("1.1").unwrap())
    );

    assert!(matches!(
        proof.release_node("1.1", "someone-else").unwrap_err(),
        ProofError::OwnerMismatch { .. }
    ));
    proof.release_node("1.1", PROVER).unwrap();

    let state = proof.load_state().unwrap();
    assert!(state.get_node(&NodeId::parse("1.1").unwrap()).unwrap().lease.is_none());
    assert!(matches!(
        proof.release_node("1.1", PROVER).unwrap_err(),
        ProofError::NotClaimed(_)
    ));
}

#[test]
fn zero_duration_claims_are_rejected() {
    let (mut proof, _clock) = proof();
    assert!(matches!(
        proof.claim_node("1", "A", Some(Duration::ZERO)).unwrap_err(),
        ProofError::InvalidLeaseDuration
    ));
}

#[test]
fn claims_require_an_existing_pending_node() {
    let (mut proof, _clock) = proof();
    assert!(matches!(
        proof.claim_node("1.7", "A", None).unwrap_err(),
        ProofError::NodeNotFound(_)
    ));
    proof.accept_node("1").unwrap();
    assert!(matches!(
        proof.claim_node("1", "A", None).unwrap_err(),
        ProofError::NotPending { .. }
    ));
}
